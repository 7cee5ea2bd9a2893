use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, trace};

/// Key of `custom_subjects` used when there is no subject for the specific action.
const CATCHALL_SUBJECT: &str = "catchall_discussions";

/// Per-repository notification settings. Lookups never fail: anything missing or unreadable is
/// "not configured".
pub trait SettingsStore: Send + Sync {
    /// Address discussion notifications for `repository` should be sent to.
    fn recipient(&self, repository: &str) -> Option<String>;

    /// Subject template overriding the default one for `action`.
    fn custom_subject(&self, repository: &str, action: &str) -> Option<String>;
}

/// Reads settings from the files gitbox maintains:
///
/// - `{repos_root}/{repository}.git/notifications.yaml`, for the `discussions` recipient
/// - `{settings_root}/ghsettings.{repository}.yml`, for `custom_subjects`
pub struct FileSettingsStore {
    repos_root: PathBuf,
    settings_root: PathBuf,
}

#[derive(Deserialize)]
struct NotificationsFile {
    discussions: Option<String>,
}

impl FileSettingsStore {
    pub fn new(repos_root: PathBuf, settings_root: PathBuf) -> Self {
        Self {
            repos_root,
            settings_root,
        }
    }

    fn notifications_path(&self, repository: &str) -> PathBuf {
        self.repos_root
            .join(format!("{}.git", repository))
            .join("notifications.yaml")
    }

    fn settings_path(&self, repository: &str) -> PathBuf {
        self.settings_root
            .join(format!("ghsettings.{}.yml", repository))
    }
}

impl SettingsStore for FileSettingsStore {
    fn recipient(&self, repository: &str) -> Option<String> {
        if !is_plain_name(repository) {
            debug!("refusing to look up settings for repository `{}`", repository);
            return None;
        }

        let path = self.notifications_path(repository);
        let file: NotificationsFile = read_yaml(&path)?;
        file.discussions
    }

    fn custom_subject(&self, repository: &str, action: &str) -> Option<String> {
        if !is_plain_name(repository) {
            return None;
        }

        let path = self.settings_path(repository);
        let settings: Value = read_yaml(&path)?;
        let subjects = settings.get("custom_subjects")?.as_mapping()?;

        // an entry for the action shadows the catch-all, even when it isn't usable
        let subject = match subjects.get(action) {
            Some(subject) => subject,
            None => subjects.get(CATCHALL_SUBJECT)?,
        };
        subject.as_str().map(str::to_owned)
    }
}

/// Repository names end up in paths: anything that could escape the settings directories is
/// treated as unknown.
fn is_plain_name(repository: &str) -> bool {
    !repository.is_empty()
        && !repository.starts_with('.')
        && !repository.contains(['/', '\\', '\0'])
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            trace!("no settings at {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_yaml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("ignoring unparseable settings {}: {}", path.display(), e);
            None
        }
    }
}
