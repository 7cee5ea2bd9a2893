use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
use config::NotifierConfig;

mod notifier;
use notifier::{
    mail::{LogTransport, MailTransport, SendmailTransport},
    settings::FileSettingsStore,
    template::Templates,
    MailIdentity, Notifier,
};

mod webhooks;
use webhooks::github::origin::{fetch_hook_ranges, OriginPolicy};

#[derive(Parser)]
#[command(version, about = "Mails GitHub Discussions activity to project mailing lists")]
struct Opts {
    /// Configuration file for ghd-notifier
    #[arg(short, long)]
    config: PathBuf,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    let config_file = File::open(&opts.config)
        .with_context(|| format!("couldn't open {}:", opts.config.display()))?;
    let config: NotifierConfig = serde_yaml::from_reader(BufReader::new(config_file))
        .context("couldn't parse config file")?;

    let trusted_ranges = match &config.trusted_ranges {
        Some(ranges) => ranges.clone(),
        None => {
            info!("fetching webhook ranges from {}", config.github_meta_url);
            fetch_hook_ranges(&config.github_meta_url)
                .await
                .context("couldn't fetch GitHub webhook ranges")?
        }
    };
    if trusted_ranges.is_empty() {
        bail!("no trusted webhook ranges, every request would be rejected");
    }
    info!("trusting {} webhook ranges", trusted_ranges.len());

    let templates =
        Templates::load(config.templates_dir.as_deref()).context("couldn't load templates")?;

    let transport: Box<dyn MailTransport> = if config.mail.dry_run {
        info!("dry run, mails will only be logged");
        Box::new(LogTransport)
    } else {
        Box::new(SendmailTransport::new(config.mail.sendmail.clone()))
    };

    let notifier = Notifier::new(
        templates,
        Box::new(FileSettingsStore::new(
            config.repos_root.clone(),
            config.settings_root.clone(),
        )),
        transport,
        MailIdentity {
            sender_address: config.sender_address.clone(),
            message_id_domain: config.message_id_domain.clone(),
        },
    );

    let origin_policy = OriginPolicy {
        trusted_ranges,
        forwarded_header: config.forwarded_header.clone(),
        trusted_proxies: config.trusted_proxies.clone(),
    };

    let figment = rocket::Config::figment()
        .merge(("address", config.address))
        .merge(("port", config.port));

    let rocket = rocket::custom(figment)
        .mount("/", webhooks::routes())
        .manage(notifier)
        .manage(origin_policy);
    rocket
        .launch()
        .await
        .map(|_| ())
        .map_err(|err| anyhow!("{}", err))
}
