use std::{
    fmt::Write as _,
    path::PathBuf,
    process::Stdio,
};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{info, trace};

use crate::notifier::{message_builder::MessageBuilder, RenderedMessage};

/// A notification ready to be handed to a [`MailTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender_name: String,
    pub sender_address: String,
    pub recipient: String,
    pub message: RenderedMessage,
}

impl Envelope {
    /// Sender as it appears in the `From` header.
    pub fn sender(&self) -> String {
        format!("\"{}\" <{}>", self.sender_name, self.sender_address)
    }

    pub fn to_rfc5322(&self, date: DateTime<Utc>) -> String {
        let mut msgbld = MessageBuilder::new();

        msgbld.mailbox("From", &self.sender_name, &self.sender_address);
        msgbld.header("To", &self.recipient);
        msgbld.header("Subject", &self.message.subject);
        msgbld.header("Date", &date.to_rfc2822());
        msgbld.header("Message-ID", &self.message.message_id);
        for (name, value) in &self.message.extra_headers {
            msgbld.header(name, value);
        }
        msgbld.header("MIME-Version", "1.0");
        msgbld.header("Content-Type", "text/plain; charset=utf-8");
        msgbld.header("Content-Transfer-Encoding", "8bit");

        write!(msgbld, "{}", self.message.body).unwrap();
        msgbld.build()
    }
}

/// Outbound mail. Delivery is fire-and-forget: errors are reported, never retried.
#[rocket::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

/// Submits messages through the local MTA's `sendmail` interface.
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[rocket::async_trait]
impl MailTransport for SendmailTransport {
    async fn send(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let message = envelope.to_rfc5322(Utc::now());
        trace!("piping message to {}:\n{}", self.program.display(), message);

        let mut child = Command::new(&self.program)
            .args(["-t", "-oi", "-f"])
            .arg(&envelope.sender_address)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("couldn't run {}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .context("sendmail's stdin wasn't captured")?;
        stdin
            .write_all(message.as_bytes())
            .await
            .context("couldn't write message to sendmail")?;
        // closing stdin tells sendmail the message is complete
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("couldn't wait for sendmail")?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

/// Dry-run transport: logs what would have been sent.
pub struct LogTransport;

#[rocket::async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, envelope: &Envelope) -> anyhow::Result<()> {
        info!(
            "dry run, not sending {} to {}: {}",
            envelope.message.message_id, envelope.recipient, envelope.message.subject
        );
        trace!("message:\n{}", envelope.to_rfc5322(Utc::now()));
        Ok(())
    }
}
