//! Gated progress record (`.research-progress.json`)
//!
//! Every write passes through the completion gate: a request at or above
//! the configured threshold is only honoured when no generated HTML document
//! references a local file that does not exist. Otherwise the record is
//! capped and marked blocked.

use crate::config::ProgressConfig;
use crate::links::{self, MissingLinks};
use crate::store::json::{self, Loaded};
use crate::types::{clamp_percentage, Project, ProgressRecord};
use chrono::{Duration, Utc};
use std::path::PathBuf;

/// Task label written when the gate blocks completion
pub const BLOCKED_TASK: &str = "BLOCKED: Missing files";

/// A requested progress write.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Requested percentage, clamped on write
    pub percentage: i64,
    pub task: String,
    pub description: String,
    /// Tasks to merge into `completedTasks`
    pub completed_tasks: Vec<String>,
    pub estimated_minutes_remaining: Option<i64>,
}

impl ProgressUpdate {
    pub fn new(percentage: i64, task: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            percentage,
            task: task.into(),
            description: description.into(),
            completed_tasks: Vec::new(),
            estimated_minutes_remaining: None,
        }
    }

    pub fn with_completed_tasks(mut self, tasks: Vec<String>) -> Self {
        self.completed_tasks = tasks;
        self
    }

    pub fn with_eta(mut self, minutes: Option<i64>) -> Self {
        self.estimated_minutes_remaining = minutes;
        self
    }
}

/// Result of a gated progress write.
#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    /// The record as written (possibly capped)
    pub record: ProgressRecord,
    /// The percentage the caller asked for, before clamping
    pub requested_percentage: i64,
    /// Missing local references found during this write
    pub missing: MissingLinks,
    /// Whether the gate overrode the request
    pub blocked: bool,
    /// Whether the record reached disk
    pub saved: bool,
}

impl ProgressOutcome {
    /// Tool-style reply describing the write.
    pub fn summary(&self) -> String {
        if self.blocked {
            return links::format_missing_files_error(&self.missing, self.requested_percentage);
        }

        let eta = match self.record.estimated_minutes_remaining {
            Some(minutes) if minutes > 0 => format!(" (~{} min remaining)", minutes),
            _ => String::new(),
        };
        let mut out = format!(
            "Progress updated: {}% - {}{}",
            self.record.percentage, self.record.current_task, eta
        );

        if !self.missing.is_empty() {
            out.push_str(&links::format_missing_files_warning(&self.missing));
        }
        out
    }
}

/// Reads and writes the single progress record of a project.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    project: Project,
    path: PathBuf,
    config: ProgressConfig,
}

impl ProgressStore {
    pub fn new(project: &Project, config: &ProgressConfig) -> Self {
        Self {
            project: project.clone(),
            path: project.progress_path(),
            config: config.clone(),
        }
    }

    /// The current record.
    pub fn read(&self) -> Loaded<ProgressRecord> {
        json::load(&self.path)
    }

    /// Apply a progress write through the completion gate.
    ///
    /// Never fails: an unreadable prior record is treated as absent and a
    /// failed write is logged and reported through [`ProgressOutcome::saved`].
    pub fn update(&self, update: &ProgressUpdate) -> ProgressOutcome {
        let now = Utc::now();

        let prior = match self.read() {
            Loaded::Parsed(record) => Some(record),
            Loaded::Missing => None,
            Loaded::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "Progress record unreadable, starting fresh"
                );
                None
            }
        };

        let started_at = prior.as_ref().map(|r| r.started_at).unwrap_or(now);
        let mut completed_tasks = prior.map(|r| r.completed_tasks).unwrap_or_default();
        for task in &update.completed_tasks {
            push_unique(&mut completed_tasks, task);
        }

        let missing = links::check_missing_files(self.project.root());
        let blocked = update.percentage >= i64::from(self.config.completion_threshold)
            && !missing.is_empty();

        let (percentage, current_task, current_task_description) = if blocked {
            tracing::info!(
                requested = update.percentage,
                capped = self.config.blocked_percentage,
                missing = missing.total(),
                "Completion blocked by missing files"
            );
            (
                self.config.blocked_percentage.min(100),
                BLOCKED_TASK.to_string(),
                format!(
                    "Cannot complete: {} referenced file(s) do not exist",
                    missing.total()
                ),
            )
        } else {
            let percentage = clamp_percentage(update.percentage);
            if !update.task.is_empty() && percentage > 0 && percentage < 100 {
                push_unique(&mut completed_tasks, &update.task);
            }
            (percentage, update.task.clone(), update.description.clone())
        };

        let estimated_completion = update
            .estimated_minutes_remaining
            .filter(|minutes| *minutes > 0)
            .and_then(Duration::try_minutes)
            .and_then(|eta| now.checked_add_signed(eta));

        let record = ProgressRecord {
            percentage,
            current_task,
            current_task_description,
            completed_tasks,
            started_at,
            updated_at: now,
            estimated_minutes_remaining: update.estimated_minutes_remaining,
            estimated_completion,
        };

        let saved = match json::write_atomic(&self.path, &record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to save progress"
                );
                false
            }
        };

        ProgressOutcome {
            record,
            requested_percentage: update.percentage,
            missing,
            blocked,
            saved,
        }
    }
}

fn push_unique(tasks: &mut Vec<String>, task: &str) {
    if !tasks.iter().any(|t| t == task) {
        tasks.push(task.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ProgressStore {
        ProgressStore::new(&Project::new(dir.path()), &ProgressConfig::default())
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let update = ProgressUpdate::new(25, "Web research", "Searching").with_eta(Some(15));
        let outcome = store.update(&update);
        assert!(outcome.saved);
        assert!(!outcome.blocked);
        assert_eq!(outcome.record.percentage, 25);
        assert!(outcome.record.estimated_completion.is_some());
        assert_eq!(outcome.summary(), "Progress updated: 25% - Web research (~15 min remaining)");

        let read = store.read().parsed().unwrap();
        assert_eq!(read, outcome.record);

        let raw = fs::read_to_string(dir.path().join(".research-progress.json")).unwrap();
        assert!(raw.contains("\"currentTask\""));
        assert!(raw.contains("\"startedAt\""));
    }

    #[test]
    fn test_out_of_range_eta_omits_estimated_completion() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let update = ProgressUpdate::new(50, "Writing", "Drafting").with_eta(Some(i64::MAX / 2));
        let outcome = store.update(&update);
        assert!(outcome.saved);
        assert_eq!(outcome.record.estimated_minutes_remaining, Some(i64::MAX / 2));
        assert_eq!(outcome.record.estimated_completion, None);

        let update = ProgressUpdate::new(60, "Writing", "Drafting").with_eta(Some(-5));
        let outcome = store.update(&update);
        assert_eq!(outcome.record.estimated_completion, None);
    }

    #[test]
    fn test_started_at_preserved_across_writes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.update(&ProgressUpdate::new(10, "Start", "Starting"));
        let second = store.update(&ProgressUpdate::new(50, "Middle", "Halfway"));

        assert_eq!(first.record.started_at, second.record.started_at);
        assert!(second.record.updated_at >= first.record.updated_at);
        assert_eq!(second.record.completed_tasks, vec!["Start", "Middle"]);
    }

    #[test]
    fn test_percentage_is_clamped() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.update(&ProgressUpdate::new(-10, "t", "d")).record.percentage, 0);
        assert_eq!(store.update(&ProgressUpdate::new(150, "t", "d")).record.percentage, 100);
    }

    #[test]
    fn test_completed_tasks_rules() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.update(&ProgressUpdate::new(0, "Setup", "d"));
        store.update(&ProgressUpdate::new(40, "Search", "d"));
        store.update(&ProgressUpdate::new(60, "Search", "d"));
        store.update(&ProgressUpdate::new(70, "", "d"));
        let outcome = store.update(
            &ProgressUpdate::new(100, "Complete", "d")
                .with_completed_tasks(vec!["Search".to_string(), "Review".to_string()]),
        );

        assert_eq!(outcome.record.completed_tasks, vec!["Search", "Review"]);
    }

    #[test]
    fn test_corrupt_prior_record_starts_fresh() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".research-progress.json"), "garbage").unwrap();
        let store = store(&dir);

        assert!(store.read().is_corrupt());
        let outcome = store.update(&ProgressUpdate::new(30, "Task", "d"));
        assert!(outcome.saved);
        assert_eq!(store.read().parsed().unwrap().percentage, 30);
    }

    #[test]
    fn test_gate_blocks_at_threshold_with_missing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), r#"<a href="missing.html">m</a>"#).unwrap();
        let store = store(&dir);

        let outcome = store.update(&ProgressUpdate::new(90, "Complete", "All done"));
        assert!(outcome.blocked);
        assert_eq!(outcome.record.percentage, 85);
        assert_eq!(outcome.record.current_task, BLOCKED_TASK);
        assert!(outcome.record.current_task_description.contains('1'));
        assert!(!outcome.record.completed_tasks.contains(&"Complete".to_string()));
        assert!(outcome.summary().contains("missing.html - FILE DOES NOT EXIST"));
    }

    #[test]
    fn test_gate_does_not_trigger_below_threshold() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), r#"<a href="missing.html">m</a>"#).unwrap();
        let store = store(&dir);

        let outcome = store.update(&ProgressUpdate::new(89, "Nearly", "d"));
        assert!(!outcome.blocked);
        assert_eq!(outcome.record.percentage, 89);
        let summary = outcome.summary();
        assert!(summary.starts_with("Progress updated: 89% - Nearly"));
        assert!(summary.contains("WARNING"));
    }

    #[test]
    fn test_gate_passes_when_all_links_resolve() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("index.html"),
            r#"<a href="page.html">p</a><a href="https://example.com">e</a>"#,
        )
        .unwrap();
        fs::write(dir.path().join("page.html"), "<p>page</p>").unwrap();
        let store = store(&dir);

        let outcome = store.update(&ProgressUpdate::new(100, "Complete", "Done"));
        assert!(!outcome.blocked);
        assert_eq!(outcome.record.percentage, 100);
        assert_eq!(outcome.summary(), "Progress updated: 100% - Complete");
    }

    #[test]
    fn test_custom_threshold_and_cap() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), r#"<img src="chart.png">"#).unwrap();
        let config = ProgressConfig {
            completion_threshold: 95,
            blocked_percentage: 70,
        };
        let store = ProgressStore::new(&Project::new(dir.path()), &config);

        assert_eq!(store.update(&ProgressUpdate::new(94, "t", "d")).record.percentage, 94);
        assert_eq!(store.update(&ProgressUpdate::new(95, "t", "d")).record.percentage, 70);
    }

    #[test]
    fn test_missing_project_dir_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(
            &Project::new(dir.path().join("gone")),
            &ProgressConfig::default(),
        );

        let outcome = store.update(&ProgressUpdate::new(50, "t", "d"));
        assert!(!outcome.saved);
        assert_eq!(store.read(), Loaded::Missing);
    }
}
