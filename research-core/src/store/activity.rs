//! Size-bounded activity feed (`.activities.json`)

use crate::config::ActivityConfig;
use crate::store::json::{self, Loaded};
use crate::types::{Activity, Project};
use serde_json::Value;
use std::path::PathBuf;

/// Append-only, size-bounded activity log for one project.
///
/// The feed is best-effort: nothing here ever returns an error. Read
/// problems reset the feed, write problems are logged and dropped.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    path: PathBuf,
    max_entries: usize,
}

impl ActivityStore {
    pub fn new(project: &Project, config: &ActivityConfig) -> Self {
        Self {
            path: project.activities_path(),
            max_entries: config.max_entries.max(1),
        }
    }

    /// Append an activity, assigning an id when it has none.
    ///
    /// Returns the activity as stored.
    pub fn append(&self, mut activity: Activity) -> Activity {
        if activity.id.is_none() {
            activity.id = Some(activity.generate_id());
        }

        let mut entries = self.load_raw();

        match serde_json::to_value(&activity) {
            Ok(value) => entries.push(value),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize activity");
                return activity;
            }
        }

        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        if let Err(e) = json::write_atomic(&self.path, &entries) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to save activity"
            );
        }

        activity
    }

    /// The stored activities, oldest first.
    ///
    /// Entries that do not parse as activities are skipped; a missing or
    /// corrupt file yields an empty list.
    pub fn load(&self) -> Vec<Activity> {
        self.load_raw()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.load_raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw entries, so records written by other producers survive rewrites
    fn load_raw(&self) -> Vec<Value> {
        match json::load::<Vec<Value>>(&self.path) {
            Loaded::Parsed(entries) => entries,
            Loaded::Missing => Vec::new(),
            Loaded::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "Activity feed unreadable, starting fresh"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityKind;
    use std::fs;
    use tempfile::TempDir;

    fn thought(n: usize) -> Activity {
        Activity::new(ActivityKind::Thought {
            content: format!("step {}", n),
        })
    }

    fn store(dir: &TempDir, max_entries: usize) -> ActivityStore {
        ActivityStore::new(&Project::new(dir.path()), &ActivityConfig { max_entries })
    }

    #[test]
    fn test_append_assigns_id() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000);

        let stored = store.append(thought(1));
        let id = stored.id.unwrap();
        assert!(id.starts_with("activity_"));
        assert!(id.ends_with("_thought"));

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);

        for n in 0..5 {
            store.append(thought(n));
        }

        let contents: Vec<String> = store
            .load()
            .into_iter()
            .map(|a| match a.kind {
                ActivityKind::Thought { content } => content,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(contents, vec!["step 2", "step 3", "step 4"]);
    }

    #[test]
    fn test_corrupt_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000);
        fs::write(dir.path().join(".activities.json"), "not json").unwrap();

        assert!(store.is_empty());
        store.append(thought(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_foreign_entries_are_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1000);
        fs::write(
            dir.path().join(".activities.json"),
            r#"[{"type": "custom", "note": "from portal"}]"#,
        )
        .unwrap();

        store.append(thought(1));

        let raw: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(dir.path().join(".activities.json")).unwrap())
                .unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["note"], "from portal");
        // The foreign entry is skipped by the typed view
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_write_failure_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path().join("removed"));
        let store = ActivityStore::new(&project, &ActivityConfig::default());

        let stored = store.append(thought(1));
        assert!(stored.id.is_some());
        assert!(store.is_empty());
    }
}
