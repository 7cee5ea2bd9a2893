use std::collections::BTreeMap;

use uuid::Uuid;

use crate::notifier::classify::ActionVariant;

pub const IN_REPLY_TO: &str = "In-Reply-To";

/// Message identifiers of one notification, and the headers threading it under its discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadIdentity {
    pub message_id: String,
    pub parent_message_id: String,
    pub extra_headers: BTreeMap<String, String>,
}

/// Message-ID of the first notification of a discussion. Only depends on the discussion, so every
/// later notification can refer to it.
pub fn parent_message_id(domain: &str, node_id: &str) -> String {
    format!("<ghd-{}@{}>", node_id, domain)
}

impl ThreadIdentity {
    pub fn assign(domain: &str, node_id: &str, variant: ActionVariant) -> Self {
        let parent_message_id = parent_message_id(domain, node_id);

        if variant.starts_thread() {
            return Self {
                message_id: parent_message_id.clone(),
                parent_message_id,
                extra_headers: BTreeMap::new(),
            };
        }

        let message_id = format!("<ghd-{}-{}@{}>", node_id, Uuid::new_v4(), domain);
        let mut extra_headers = BTreeMap::new();
        extra_headers.insert(IN_REPLY_TO.to_owned(), parent_message_id.clone());

        Self {
            message_id,
            parent_message_id,
            extra_headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "gitbox.apache.org";

    #[test]
    fn new_discussion_seeds_thread() {
        let identity = ThreadIdentity::assign(DOMAIN, "D_abc", ActionVariant::NewDiscussion);

        assert_eq!(identity.message_id, "<ghd-D_abc@gitbox.apache.org>");
        assert_eq!(identity.parent_message_id, identity.message_id);
        assert!(identity.extra_headers.is_empty());
    }

    #[test]
    fn everything_else_replies_to_parent() {
        for variant in [
            ActionVariant::EditDiscussion,
            ActionVariant::CloseDiscussion,
            ActionVariant::ReopenDiscussion,
            ActionVariant::NewCommentDiscussion,
            ActionVariant::EditCommentDiscussion,
            ActionVariant::DeleteCommentDiscussion,
            ActionVariant::CloseDiscussionWithComment,
        ] {
            let identity = ThreadIdentity::assign(DOMAIN, "D_abc", variant);

            assert_eq!(identity.parent_message_id, "<ghd-D_abc@gitbox.apache.org>");
            assert_ne!(identity.message_id, identity.parent_message_id);
            assert!(identity.message_id.starts_with("<ghd-D_abc-"));
            assert!(identity.message_id.ends_with("@gitbox.apache.org>"));
            assert_eq!(
                identity.extra_headers.get(IN_REPLY_TO).map(String::as_str),
                Some("<ghd-D_abc@gitbox.apache.org>")
            );
        }
    }

    #[test]
    fn reply_ids_are_fresh() {
        let first = ThreadIdentity::assign(DOMAIN, "D_abc", ActionVariant::EditDiscussion);
        let second = ThreadIdentity::assign(DOMAIN, "D_abc", ActionVariant::EditDiscussion);
        assert_ne!(first.message_id, second.message_id);
    }
}
