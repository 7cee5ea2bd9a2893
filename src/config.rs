use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

use ipnet::IpNet;
use serde::Deserialize;
use url::Url;

use crate::webhooks::github::origin::X_FORWARDED_FOR;

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    /// Address the webhook listener binds to
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `{repository}.git/notifications.yaml` files
    #[serde(default = "default_repos_root")]
    pub repos_root: PathBuf,
    /// Directory holding `ghsettings.{repository}.yml` files
    #[serde(default = "default_settings_root")]
    pub settings_root: PathBuf,
    /// Directory with `thread-action.txt` and `comment-action.txt`. The builtin templates are
    /// used if unset.
    pub templates_dir: Option<PathBuf>,

    #[serde(default = "default_sender_address")]
    pub sender_address: String,
    #[serde(default = "default_message_id_domain")]
    pub message_id_domain: String,

    /// Where to fetch GitHub's webhook ranges from at startup.
    #[serde(default = "default_github_meta_url")]
    pub github_meta_url: Url,
    /// Static list of trusted ranges, replacing the ones from `github_meta_url`.
    pub trusted_ranges: Option<Vec<IpNet>>,
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,
    /// Proxies allowed to set `forwarded_header`. Anyone may if empty.
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,

    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_sendmail")]
    pub sendmail: PathBuf,
    /// Log messages instead of sending them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sendmail: default_sendmail(),
            dry_run: false,
        }
    }
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8084
}

fn default_repos_root() -> PathBuf {
    PathBuf::from("/x1/repos/asf")
}

fn default_settings_root() -> PathBuf {
    PathBuf::from("/x1/asfyaml")
}

fn default_sender_address() -> String {
    "git@apache.org".to_owned()
}

fn default_message_id_domain() -> String {
    "gitbox.apache.org".to_owned()
}

fn default_github_meta_url() -> Url {
    Url::parse("https://api.github.com/meta").expect("valid URL literal")
}

fn default_forwarded_header() -> String {
    X_FORWARDED_FOR.to_owned()
}

fn default_sendmail() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}
