use std::fmt::{self, Display};

use crate::{
    notifier::template::FieldSet,
    webhooks::github::{Discussion, DiscussionComment, DiscussionPayload},
};

/// Which of the two templates an event is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFamily {
    Thread,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVariant {
    NewDiscussion,
    EditDiscussion,
    CloseDiscussion,
    ReopenDiscussion,
    NewCommentDiscussion,
    EditCommentDiscussion,
    DeleteCommentDiscussion,
    CloseDiscussionWithComment,
}

impl ActionVariant {
    /// Name of the variant, as used for the keys of `custom_subjects` in repository settings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewDiscussion => "new_discussion",
            Self::EditDiscussion => "edit_discussion",
            Self::CloseDiscussion => "close_discussion",
            Self::ReopenDiscussion => "reopen_discussion",
            Self::NewCommentDiscussion => "new_comment_discussion",
            Self::EditCommentDiscussion => "edit_comment_discussion",
            Self::DeleteCommentDiscussion => "delete_comment_discussion",
            Self::CloseDiscussionWithComment => "close_discussion_with_comment",
        }
    }

    pub fn family(self) -> ActionFamily {
        match self {
            Self::NewDiscussion
            | Self::EditDiscussion
            | Self::CloseDiscussion
            | Self::ReopenDiscussion => ActionFamily::Thread,
            Self::NewCommentDiscussion
            | Self::EditCommentDiscussion
            | Self::DeleteCommentDiscussion
            | Self::CloseDiscussionWithComment => ActionFamily::Comment,
        }
    }

    /// Whether this event opens a new mail thread.
    pub fn starts_thread(self) -> bool {
        self == Self::NewDiscussion
    }

    fn from_thread_action(action: &str) -> Option<Self> {
        match action {
            "created" => Some(Self::NewDiscussion),
            "edited" => Some(Self::EditDiscussion),
            "closed" => Some(Self::CloseDiscussion),
            "reopened" => Some(Self::ReopenDiscussion),
            _ => None,
        }
    }

    fn from_comment_action(action: &str, discussion_state: Option<&str>) -> Option<Self> {
        match action {
            // GitHub doesn't tell "closed with a comment" apart from "commented on a closed
            // discussion", we assume the former.
            "created" if discussion_state == Some("closed") => Some(Self::CloseDiscussionWithComment),
            "created" => Some(Self::NewCommentDiscussion),
            "edited" => Some(Self::EditCommentDiscussion),
            "deleted" => Some(Self::DeleteCommentDiscussion),
            _ => None,
        }
    }

    /// Phrase following the user name in comment notifications.
    pub fn action_human(self) -> Option<&'static str> {
        match self {
            Self::CloseDiscussionWithComment => Some("closed the discussion with a comment:"),
            Self::NewCommentDiscussion => Some("added a comment to the discussion:"),
            Self::EditCommentDiscussion => Some("edited a comment on the discussion:"),
            Self::DeleteCommentDiscussion => Some("deleted a comment on the discussion:"),
            _ => None,
        }
    }
}

impl Display for ActionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifying bits of an event, used for outcome lines. Any of them may be missing when the
/// event couldn't be classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub comment: bool,
    pub user: Option<String>,
    pub action: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_unknown(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("?")
        }

        if self.comment {
            write!(f, "[comment] ")?;
        }
        write!(
            f,
            "{} {} {}: {}",
            or_unknown(&self.user),
            or_unknown(&self.action),
            or_unknown(&self.url),
            or_unknown(&self.title)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("payload has no discussion object")]
    NoDiscussion,
    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("unsupported {family} action `{action}`")]
    UnsupportedAction {
        family: &'static str,
        action: String,
    },
}

/// An event that can be turned into a notification.
#[derive(Debug)]
pub struct ClassifiedEvent {
    pub variant: ActionVariant,
    pub repository: String,
    pub node_id: String,
    pub fields: FieldSet,
    pub summary: EventSummary,
}

/// An event that can't, with whatever could be salvaged to log it.
#[derive(Debug)]
pub struct Unclassified {
    pub summary: EventSummary,
    pub reason: ClassifyError,
}

pub fn classify(payload: &DiscussionPayload) -> Result<ClassifiedEvent, Unclassified> {
    let summary = summarize(payload);
    let reject = |reason| Unclassified {
        summary: summary.clone(),
        reason,
    };

    let discussion = payload
        .discussion
        .as_ref()
        .ok_or_else(|| reject(ClassifyError::NoDiscussion))?;
    let action = payload
        .action
        .as_deref()
        .ok_or_else(|| reject(ClassifyError::MissingField("action")))?;

    let variant = match &payload.comment {
        None => ActionVariant::from_thread_action(action).ok_or_else(|| {
            reject(ClassifyError::UnsupportedAction {
                family: "discussion",
                action: action.to_owned(),
            })
        })?,
        Some(_) => ActionVariant::from_comment_action(action, discussion.state.as_deref())
            .ok_or_else(|| {
                reject(ClassifyError::UnsupportedAction {
                    family: "comment",
                    action: action.to_owned(),
                })
            })?,
    };

    let repository = payload
        .repository
        .as_ref()
        .and_then(|repo| repo.name.clone())
        .ok_or_else(|| reject(ClassifyError::MissingField("repository.name")))?;
    let node_id = discussion
        .node_id
        .clone()
        .ok_or_else(|| reject(ClassifyError::MissingField("discussion.node_id")))?;
    let user = summary
        .user
        .clone()
        .ok_or_else(|| reject(ClassifyError::MissingField("user.login")))?;
    let url = summary
        .url
        .clone()
        .ok_or_else(|| reject(ClassifyError::MissingField("html_url")))?;
    let title = summary
        .title
        .clone()
        .ok_or_else(|| reject(ClassifyError::MissingField("discussion.title")))?;

    let body = match &payload.comment {
        Some(comment) => comment.body.clone(),
        None => discussion.body.clone(),
    };

    let mut fields = FieldSet::new();
    fields.insert("user", user);
    fields.insert("title", title);
    fields.insert("category", discussion.category_slug().unwrap_or_default());
    fields.insert("url", url);
    fields.insert("body", body.unwrap_or_default());
    fields.insert("repository", repository.as_str());
    fields.insert("action", action);
    fields.insert("node_id", node_id.as_str());
    fields.insert("state", discussion.state.as_deref().unwrap_or_default());
    if let Some(action_human) = variant.action_human() {
        fields.insert("action_human", action_human);
    }

    Ok(ClassifiedEvent {
        variant,
        repository,
        node_id,
        fields,
        summary,
    })
}

/// Comment events are attributed to the commenter and point to the comment, not the discussion.
fn summarize(payload: &DiscussionPayload) -> EventSummary {
    let discussion = payload.discussion.as_ref();
    let (user, url) = match &payload.comment {
        Some(comment) => comment_identity(comment),
        None => discussion.map_or((None, None), discussion_identity),
    };

    EventSummary {
        comment: payload.is_comment(),
        user,
        action: payload.action.clone(),
        url,
        title: discussion.and_then(|d| d.title.clone()),
    }
}

fn discussion_identity(discussion: &Discussion) -> (Option<String>, Option<String>) {
    (
        discussion.login().map(str::to_owned),
        discussion.html_url.clone(),
    )
}

fn comment_identity(comment: &DiscussionComment) -> (Option<String>, Option<String>) {
    (comment.login().map(str::to_owned), comment.html_url.clone())
}
