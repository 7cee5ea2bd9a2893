use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use tracing::{debug, error, trace};

use crate::webhooks::github::DiscussionPayload;

pub mod classify;
use classify::{classify, EventSummary};

pub mod mail;
use mail::{Envelope, MailTransport};

mod message_builder;

pub mod settings;
use settings::SettingsStore;

pub mod template;
use template::{render, TemplateError, Templates};

pub mod thread;
use thread::ThreadIdentity;

/// Subject, body and threading headers of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
    pub message_id: String,
    pub parent_message_id: String,
    pub extra_headers: BTreeMap<String, String>,
}

/// What happened to an event, printed as a one-line log entry.
#[derive(Debug)]
pub enum Outcome {
    Send(EventSummary),
    Skip(EventSummary),
    Error(EventSummary, TemplateError),
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(summary) => write!(f, "[send] {}", summary),
            Self::Skip(summary) => write!(f, "[skip] {}", summary),
            Self::Error(summary, e) => write!(f, "[error] {} ({})", summary, e),
        }
    }
}

/// Where notifications appear to come from.
#[derive(Debug, Clone)]
pub struct MailIdentity {
    /// Address in the `From` header, shown as `"{user} (via GitHub)"`.
    pub sender_address: String,
    /// Domain part of generated Message-IDs.
    pub message_id_domain: String,
}

/// Turns discussion events into mails.
///
/// Everything it holds is immutable once built; repository settings are looked up again for
/// every event.
pub struct Notifier {
    templates: Templates,
    settings: Box<dyn SettingsStore>,
    transport: Box<dyn MailTransport>,
    identity: MailIdentity,
}

impl Notifier {
    pub fn new(
        templates: Templates,
        settings: Box<dyn SettingsStore>,
        transport: Box<dyn MailTransport>,
        identity: MailIdentity,
    ) -> Self {
        Self {
            templates,
            settings,
            transport,
            identity,
        }
    }

    pub async fn handle(&self, payload: &DiscussionPayload) -> Outcome {
        let event = match classify(payload) {
            Ok(event) => event,
            Err(unclassified) => {
                debug!("not notifying: {}", unclassified.reason);
                return Outcome::Skip(unclassified.summary);
            }
        };

        let recipient = match self.settings.recipient(&event.repository) {
            Some(recipient) => recipient,
            None => {
                debug!("no discussions recipient for {}", event.repository);
                return Outcome::Skip(event.summary);
            }
        };

        let variant = event.variant;
        let custom_subject = self
            .settings
            .custom_subject(&event.repository, variant.as_str());
        let artifact = self.templates.for_family(variant.family());
        let rendered = match render(
            artifact,
            variant,
            &recipient,
            custom_subject.as_deref(),
            &event.fields,
        ) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(
                    "couldn't render {} notification for {}: {}",
                    variant, event.repository, e
                );
                return Outcome::Error(event.summary, e);
            }
        };

        let ThreadIdentity {
            message_id,
            parent_message_id,
            extra_headers,
        } = ThreadIdentity::assign(&self.identity.message_id_domain, &event.node_id, variant);

        let user = event.fields.get("user").unwrap_or_default();
        let envelope = Envelope {
            sender_name: format!("{} (via GitHub)", user),
            sender_address: self.identity.sender_address.clone(),
            recipient,
            message: RenderedMessage {
                subject: rendered.subject,
                body: rendered.body,
                message_id,
                parent_message_id,
                extra_headers,
            },
        };

        trace!(
            "sending {} as {} from {}",
            variant,
            envelope.message.message_id,
            envelope.sender()
        );
        if let Err(e) = self.transport.send(&envelope).await {
            error!(
                "couldn't hand {} to the mail transport: {:#}",
                envelope.message.message_id, e
            );
        }

        Outcome::Send(event.summary)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Default)]
    pub(crate) struct MemorySettings {
        pub(crate) recipients: HashMap<String, String>,
        pub(crate) subjects: HashMap<(String, String), String>,
    }

    impl MemorySettings {
        pub(crate) fn with_recipient(repository: &str, recipient: &str) -> Self {
            let mut settings = Self::default();
            settings
                .recipients
                .insert(repository.to_owned(), recipient.to_owned());
            settings
        }

        pub(crate) fn subject(mut self, repository: &str, action: &str, subject: &str) -> Self {
            self.subjects.insert(
                (repository.to_owned(), action.to_owned()),
                subject.to_owned(),
            );
            self
        }
    }

    impl SettingsStore for MemorySettings {
        fn recipient(&self, repository: &str) -> Option<String> {
            self.recipients.get(repository).cloned()
        }

        fn custom_subject(&self, repository: &str, action: &str) -> Option<String> {
            self.subjects
                .get(&(repository.to_owned(), action.to_owned()))
                .cloned()
        }
    }

    /// Keeps every envelope it is given.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport(pub(crate) Arc<Mutex<Vec<Envelope>>>);

    impl RecordingTransport {
        pub(crate) fn sent(&self) -> Vec<Envelope> {
            self.0.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, envelope: &Envelope) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    pub(crate) fn notifier(settings: MemorySettings, transport: RecordingTransport) -> Notifier {
        Notifier::new(
            Templates::load(None).unwrap(),
            Box::new(settings),
            Box::new(transport),
            MailIdentity {
                sender_address: "git@apache.org".to_owned(),
                message_id_domain: "gitbox.apache.org".to_owned(),
            },
        )
    }

    pub(crate) fn thread_event(action: &str) -> String {
        format!(
            r#"{{
                "action": "{}",
                "repository": {{ "name": "whimsy" }},
                "discussion": {{
                    "user": {{ "login": "alice" }},
                    "title": "My Title",
                    "category": {{ "slug": "ideas" }},
                    "html_url": "https://github.com/apache/whimsy/discussions/1",
                    "body": "What do you think?",
                    "node_id": "D_abc",
                    "state": "open"
                }}
            }}"#,
            action
        )
    }

    pub(crate) fn comment_event(action: &str, state: &str) -> String {
        format!(
            r#"{{
                "action": "{}",
                "repository": {{ "name": "whimsy" }},
                "discussion": {{
                    "user": {{ "login": "alice" }},
                    "title": "My Title",
                    "category": {{ "slug": "ideas" }},
                    "html_url": "https://github.com/apache/whimsy/discussions/1",
                    "body": "What do you think?",
                    "node_id": "D_abc",
                    "state": "{}"
                }},
                "comment": {{
                    "user": {{ "login": "bob" }},
                    "html_url": "https://github.com/apache/whimsy/discussions/1#discussioncomment-7",
                    "body": "Sounds good."
                }}
            }}"#,
            action, state
        )
    }
}
