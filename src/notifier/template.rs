use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use anyhow::Context;
use tracing::info;

use crate::notifier::classify::{ActionFamily, ActionVariant};

pub const THREAD_TEMPLATE: &str = "thread-action.txt";
pub const COMMENT_TEMPLATE: &str = "comment-action.txt";

const BUILTIN_THREAD: &str = include_str!("../../templates/thread-action.txt");
const BUILTIN_COMMENT: &str = include_str!("../../templates/comment-action.txt");

/// Line separating the subject template from the body template.
const SEPARATOR: &str = "--";

const REPLY_PREFIX: &str = "Re: ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template has no `--` line between subject and body")]
    MissingSeparator,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("empty field name at offset {0}")]
    EmptyField(usize),
    #[error("unsupported format directive `{{{0}}}`")]
    UnsupportedDirective(String),
    #[error("unmatched `{0}` at offset {1}")]
    UnmatchedBrace(char, usize),
}

/// Named values a template may refer to as `{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeMap<&'static str, String>);

impl FieldSet {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, name: &'static str, value: impl Into<String>) {
        self.0.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Substitutes `{name}` with the matching field. `{{` and `}}` are literal braces.
///
/// Anything fancier than a bare name (`{name!r}`, `{name:>10}`, `{user.login}`) is rejected rather
/// than silently rendered.
pub fn format_fields(template: &str, fields: &FieldSet) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let start = i + c.len_utf8();
                let end = loop {
                    match chars.next() {
                        Some((j, '}')) => break j,
                        Some((_, '{')) | None => return Err(TemplateError::UnmatchedBrace('{', i)),
                        Some(_) => {}
                    }
                };

                let name = &template[start..end];
                if name.is_empty() {
                    return Err(TemplateError::EmptyField(i));
                }
                if name.contains(['!', ':', '.', '[']) {
                    return Err(TemplateError::UnsupportedDirective(name.to_owned()));
                }
                let value = fields
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownField(name.to_owned()))?;
                out.push_str(value);
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(TemplateError::UnmatchedBrace('}', i)),
            c => out.push(c),
        }
    }

    Ok(out)
}

/// A subject template and a body template, stored in one text file split by a `--` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateArtifact {
    pub subject: String,
    pub body: String,
}

impl TemplateArtifact {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut subject = String::new();
        let mut lines = text.split_inclusive('\n');

        for line in lines.by_ref() {
            if line.trim() == SEPARATOR {
                return Ok(Self {
                    subject,
                    body: lines.collect(),
                });
            }
            subject.push_str(line);
        }

        Err(TemplateError::MissingSeparator)
    }
}

/// Both templates, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Templates {
    pub thread: TemplateArtifact,
    pub comment: TemplateArtifact,
}

impl Templates {
    /// Loads templates from `dir`, or uses the ones shipped with the binary.
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let (thread, comment) = match dir {
            Some(dir) => {
                info!("loading templates from {}", dir.display());
                (
                    read_template(&dir.join(THREAD_TEMPLATE))?,
                    read_template(&dir.join(COMMENT_TEMPLATE))?,
                )
            }
            None => (
                TemplateArtifact::parse(BUILTIN_THREAD).context("invalid builtin thread template")?,
                TemplateArtifact::parse(BUILTIN_COMMENT)
                    .context("invalid builtin comment template")?,
            ),
        };

        Ok(Self { thread, comment })
    }

    pub fn for_family(&self, family: ActionFamily) -> &TemplateArtifact {
        match family {
            ActionFamily::Thread => &self.thread,
            ActionFamily::Comment => &self.comment,
        }
    }
}

fn read_template(path: &Path) -> anyhow::Result<TemplateArtifact> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("couldn't read template {}", path.display()))?;
    TemplateArtifact::parse(&text).with_context(|| format!("invalid template {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

/// Mailing list address to unsubscribe from `recipient`: `dev@x.apache.org` becomes
/// `dev-unsubscribe@x.apache.org`.
pub fn unsubscribe_address(recipient: &str) -> String {
    recipient.replace('@', "-unsubscribe@")
}

pub fn render(
    artifact: &TemplateArtifact,
    variant: ActionVariant,
    recipient: &str,
    custom_subject: Option<&str>,
    fields: &FieldSet,
) -> Result<Rendered, TemplateError> {
    let mut fields = fields.clone();
    fields.insert("recipient", recipient);
    fields.insert("unsub", unsubscribe_address(recipient));

    let subject = match custom_subject.filter(|s| !s.is_empty()) {
        Some(custom) => format_fields(custom, &fields)?,
        None => {
            let subject = format_fields(&artifact.subject, &fields)?;
            let subject = subject.trim();
            if variant.family() == ActionFamily::Thread && !variant.starts_thread() {
                format!("{}{}", REPLY_PREFIX, subject)
            } else {
                subject.to_owned()
            }
        }
    };
    let body = format_fields(&artifact.body, &fields)?.trim().to_owned();

    Ok(Rendered { subject, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert("user", "alice");
        fields.insert("title", "My Title");
        fields.insert("category", "ideas");
        fields.insert("url", "https://github.com/apache/whimsy/discussions/1");
        fields.insert("body", "first post");
        fields.insert("repository", "whimsy");
        fields.insert("action", "created");
        fields
    }

    fn artifact() -> TemplateArtifact {
        TemplateArtifact::parse("[{repository}] {title}\n--\n{user} {action}: {body}\n\nUnsubscribe: {unsub}\n")
            .unwrap()
    }

    #[test]
    fn format_substitutes_fields() {
        assert_eq!(
            format_fields("{user} opened {title} {{literal}}", &fields()).unwrap(),
            "alice opened My Title {literal}"
        );
    }

    #[test]
    fn format_errors() {
        let fields = fields();
        assert_eq!(
            format_fields("{nope}", &fields),
            Err(TemplateError::UnknownField("nope".into()))
        );
        assert_eq!(format_fields("a {} b", &fields), Err(TemplateError::EmptyField(2)));
        assert_eq!(
            format_fields("{title!r}", &fields),
            Err(TemplateError::UnsupportedDirective("title!r".into()))
        );
        assert_eq!(
            format_fields("{title", &fields),
            Err(TemplateError::UnmatchedBrace('{', 0))
        );
        assert_eq!(
            format_fields("title}", &fields),
            Err(TemplateError::UnmatchedBrace('}', 5))
        );
    }

    #[test]
    fn format_keeps_unicode() {
        let mut fields = FieldSet::new();
        fields.insert("title", "Ünïcødé");
        assert_eq!(format_fields("« {title} »", &fields).unwrap(), "« Ünïcødé »");
    }

    #[test]
    fn parse_splits_on_separator_line() {
        let artifact = TemplateArtifact::parse("subject\n--\nbody\n----\nfooter\n").unwrap();
        assert_eq!(artifact.subject, "subject\n");
        assert_eq!(artifact.body, "body\n----\nfooter\n");

        assert_eq!(
            TemplateArtifact::parse("subject -- with dashes\nbody"),
            Err(TemplateError::MissingSeparator)
        );
    }

    #[test]
    fn builtin_templates_render_every_variant() {
        let templates = Templates::load(None).unwrap();
        let mut fields = fields();
        fields.insert("action_human", "added a comment to the discussion:");

        for variant in [
            ActionVariant::NewDiscussion,
            ActionVariant::EditDiscussion,
            ActionVariant::NewCommentDiscussion,
            ActionVariant::CloseDiscussionWithComment,
        ] {
            let artifact = templates.for_family(variant.family());
            render(artifact, variant, "dev@whimsical.apache.org", None, &fields).unwrap();
        }
    }

    #[test]
    fn unsubscribe() {
        assert_eq!(
            unsubscribe_address("list@project.apache.org"),
            "list-unsubscribe@project.apache.org"
        );
    }

    #[test]
    fn new_discussion_has_no_reply_prefix() {
        let rendered = render(
            &artifact(),
            ActionVariant::NewDiscussion,
            "dev@whimsical.apache.org",
            None,
            &fields(),
        )
        .unwrap();

        assert_eq!(rendered.subject, "[whimsy] My Title");
        assert_eq!(
            rendered.body,
            "alice created: first post\n\nUnsubscribe: dev-unsubscribe@whimsical.apache.org"
        );
    }

    #[test]
    fn thread_replies_get_prefix() {
        for variant in [
            ActionVariant::EditDiscussion,
            ActionVariant::CloseDiscussion,
            ActionVariant::ReopenDiscussion,
        ] {
            let rendered = render(&artifact(), variant, "dev@a.org", None, &fields()).unwrap();
            assert_eq!(rendered.subject, "Re: [whimsy] My Title");
        }
    }

    #[test]
    fn comments_never_get_prefix() {
        let rendered = render(
            &artifact(),
            ActionVariant::NewCommentDiscussion,
            "dev@a.org",
            None,
            &fields(),
        )
        .unwrap();
        assert_eq!(rendered.subject, "[whimsy] My Title");
    }

    #[test]
    fn custom_subject_is_used_verbatim() {
        let rendered = render(
            &artifact(),
            ActionVariant::EditDiscussion,
            "dev@a.org",
            Some(" {user} touched {title} "),
            &fields(),
        )
        .unwrap();

        assert_eq!(rendered.subject, " alice touched My Title ");
        // body is unaffected by custom subjects
        assert!(rendered.body.starts_with("alice created: first post"));
    }

    #[test]
    fn empty_custom_subject_falls_back() {
        let rendered = render(
            &artifact(),
            ActionVariant::EditDiscussion,
            "dev@a.org",
            Some(""),
            &fields(),
        )
        .unwrap();
        assert_eq!(rendered.subject, "Re: [whimsy] My Title");
    }

    #[test]
    fn broken_custom_subject_fails() {
        let result = render(
            &artifact(),
            ActionVariant::NewDiscussion,
            "dev@a.org",
            Some("{node}"),
            &fields(),
        );
        assert_eq!(result, Err(TemplateError::UnknownField("node".into())));
    }

    #[test]
    fn rendering_is_idempotent() {
        let first = render(&artifact(), ActionVariant::EditDiscussion, "dev@a.org", None, &fields());
        let second = render(&artifact(), ActionVariant::EditDiscussion, "dev@a.org", None, &fields());
        assert_eq!(first, second);
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(THREAD_TEMPLATE), "T {title}\n--\nthread body\n").unwrap();
        fs::write(dir.path().join(COMMENT_TEMPLATE), "C {title}\n--\ncomment body\n").unwrap();

        let templates = Templates::load(Some(dir.path())).unwrap();
        assert_eq!(templates.thread.subject, "T {title}\n");
        assert_eq!(templates.comment.body, "comment body\n");

        fs::write(dir.path().join(COMMENT_TEMPLATE), "no separator").unwrap();
        assert!(Templates::load(Some(dir.path())).is_err());
    }
}
