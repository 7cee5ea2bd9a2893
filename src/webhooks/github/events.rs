use serde::Deserialize;

// Every field is optional: GitHub payloads are only trusted for their origin, not their shape.
// Which fields are actually needed is decided by the classifier.

/// Payload of the `discussion` and `discussion_comment` webhooks.
///
/// Both events carry a `discussion` object; only the latter carries a `comment`.
#[derive(Debug, Default, Deserialize)]
pub struct DiscussionPayload {
    pub action: Option<String>,
    pub repository: Option<Repository>,
    pub discussion: Option<Discussion>,
    pub comment: Option<DiscussionComment>,
}

impl DiscussionPayload {
    /// A `"comment": null` counts as no comment, the event is then handled as a thread event.
    pub fn is_comment(&self) -> bool {
        self.comment.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GitHubUser {
    pub login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Repository {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Discussion {
    pub user: Option<GitHubUser>,
    pub title: Option<String>,
    pub category: Option<Category>,
    pub html_url: Option<String>,
    pub body: Option<String>,
    pub node_id: Option<String>,
    pub state: Option<String>,
}

impl Discussion {
    pub fn login(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.login.as_deref())
    }

    pub fn category_slug(&self) -> Option<&str> {
        self.category.as_ref().and_then(|c| c.slug.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Category {
    pub slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscussionComment {
    pub user: Option<GitHubUser>,
    pub html_url: Option<String>,
    pub body: Option<String>,
}

impl DiscussionComment {
    pub fn login(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.login.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_comment_payload() {
        let payload: DiscussionPayload = serde_json::from_str(
            r#"{
                "action": "created",
                "repository": { "name": "infrastructure-p6", "full_name": "apache/infrastructure-p6" },
                "discussion": {
                    "user": { "login": "alice", "id": 1 },
                    "title": "My Title",
                    "category": { "slug": "q-a" },
                    "html_url": "https://github.com/apache/infrastructure-p6/discussions/1",
                    "body": "hello",
                    "node_id": "D_abc",
                    "state": "open"
                },
                "comment": {
                    "user": { "login": "bob" },
                    "html_url": "https://github.com/apache/infrastructure-p6/discussions/1#discussioncomment-2",
                    "body": "hi alice"
                }
            }"#,
        )
        .unwrap();

        assert!(payload.is_comment());
        let discussion = payload.discussion.as_ref().unwrap();
        assert_eq!(discussion.login(), Some("alice"));
        assert_eq!(discussion.category_slug(), Some("q-a"));
        assert_eq!(payload.comment.as_ref().unwrap().login(), Some("bob"));
    }

    #[test]
    fn tolerates_missing_fields() {
        let payload: DiscussionPayload =
            serde_json::from_str(r#"{ "action": "created", "discussion": { "body": null } }"#)
                .unwrap();

        assert!(!payload.is_comment());
        assert!(payload.repository.is_none());
        let discussion = payload.discussion.unwrap();
        assert_eq!(discussion.login(), None);
        assert_eq!(discussion.body, None);
    }

    #[test]
    fn null_comment_is_a_thread_event() {
        let payload: DiscussionPayload = serde_json::from_str(
            r#"{ "action": "edited", "discussion": { "title": "t" }, "comment": null }"#,
        )
        .unwrap();

        assert!(!payload.is_comment());
    }
}
