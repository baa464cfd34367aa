//! Core domain types for research-core
//!
//! These types describe everything a research project persists in its
//! directory, plus the activity records produced from the agent runtime's
//! diagnostic stream.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Project** | A directory owning one research session's state and generated documents |
//! | **Activity** | One classified unit of the diagnostic stream (tool call, result, thought) |
//! | **Progress** | The single progress record shown by the portal for a project |
//! | **Message** | A follow-up user turn queued for the message loop |
//! | **Sentinel** | A file whose presence alone signals a control condition |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Progress file name inside a project directory
pub const PROGRESS_FILE: &str = ".research-progress.json";
/// Activity feed file name inside a project directory
pub const ACTIVITIES_FILE: &str = ".activities.json";
/// Follow-up message queue file name inside a project directory
pub const MESSAGES_FILE: &str = ".messages.json";
/// Cancellation sentinel file name inside a project directory
pub const KILL_FILE: &str = ".kill";
/// Project metadata file name inside a project directory
pub const METADATA_FILE: &str = "metadata.json";

// ============================================
// Project
// ============================================

/// A research project directory.
///
/// The directory is the sole source of truth for a session: every store
/// reads and writes its own file beneath [`Project::root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonical path to the project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the project directory still exists
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Whether the cancellation sentinel is present
    pub fn kill_requested(&self) -> bool {
        self.kill_path().exists()
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    pub fn activities_path(&self) -> PathBuf {
        self.root.join(ACTIVITIES_FILE)
    }

    pub fn messages_path(&self) -> PathBuf {
        self.root.join(MESSAGES_FILE)
    }

    pub fn kill_path(&self) -> PathBuf {
        self.root.join(KILL_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }
}

// ============================================
// Activities
// ============================================

/// The classified payload of an activity.
///
/// Serialized with an internal `type` tag so the stored record and the live
/// event share one flat JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A tool invocation detected in the stream
    ToolCall {
        tool: String,
        /// Parsed JSON arguments, or free text when they could not be parsed
        args: serde_json::Value,
    },
    /// The textual result of a tool invocation
    ToolResult { tool: String, output: String },
    /// Agent reasoning, planning or action narration
    Thought { content: String },
    /// An error surfaced by the runtime
    Error { content: String },
    /// Any other noteworthy line
    Log { content: String },
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ToolCall { .. } => "tool_call",
            ActivityKind::ToolResult { .. } => "tool_result",
            ActivityKind::Thought { .. } => "thought",
            ActivityKind::Error { .. } => "error",
            ActivityKind::Log { .. } => "log",
        }
    }

    /// Tool name for tool calls and results
    pub fn tool(&self) -> Option<&str> {
        match self {
            ActivityKind::ToolCall { tool, .. } | ActivityKind::ToolResult { tool, .. } => {
                Some(tool)
            }
            _ => None,
        }
    }
}

/// One classified activity.
///
/// Activities are created by the classifier, appended to the activity store
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Assigned by the activity store on append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    /// Create an activity stamped with the current time
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Generate the `activity_<epoch-ms>_<type>` identifier
    pub fn generate_id(&self) -> String {
        format!(
            "activity_{}_{}",
            Utc::now().timestamp_millis(),
            self.kind.as_str()
        )
    }
}

// ============================================
// Progress
// ============================================

/// The persisted progress record of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Completion percentage, always within 0-100
    pub percentage: u8,
    /// Short label of the current task
    pub current_task: String,
    /// Longer description of the current task
    pub current_task_description: String,
    /// Ordered, de-duplicated list of tasks seen so far
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    /// Fixed at the first write
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Clamp a requested percentage into `[0, 100]`.
pub fn clamp_percentage(percentage: i64) -> u8 {
    percentage.clamp(0, 100) as u8
}

// ============================================
// Messages
// ============================================

/// Identifier of a queued message.
///
/// Producers write either numeric or string ids; both round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{}", n),
            MessageId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId::Text(s.to_string())
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        MessageId::Number(n)
    }
}

/// A follow-up user message in `.messages.json`.
///
/// Fields this crate does not know about are kept in `extra` so a rewrite
/// of the queue never drops data written by other producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// RFC 3339 time the message was answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    /// Epoch milliseconds, as written by the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Number>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_role() -> String {
    "user".to_string()
}

impl Message {
    /// Create an unprocessed user message stamped with the current time
    pub fn new(id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: default_role(),
            content: content.into(),
            processed: false,
            response: None,
            processed_at: None,
            timestamp: Some(Utc::now().timestamp_millis().into()),
            extra: serde_json::Map::new(),
        }
    }

    /// Producer timestamp as a UTC time, if present and representable
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.timestamp.as_ref()?.as_f64()? as i64;
        DateTime::from_timestamp_millis(millis)
    }
}

// ============================================
// Metadata
// ============================================

/// Portal-facing description of a project (`metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_percentage() {
        assert_eq!(clamp_percentage(-10), 0);
        assert_eq!(clamp_percentage(150), 100);
        assert_eq!(clamp_percentage(50), 50);
        assert_eq!(clamp_percentage(0), 0);
        assert_eq!(clamp_percentage(100), 100);
    }

    #[test]
    fn test_activity_json_shape_is_flat() {
        let activity = Activity::new(ActivityKind::ToolCall {
            tool: "web_search".to_string(),
            args: serde_json::json!({"query": "rust"}),
        });
        let value = serde_json::to_value(&activity).unwrap();

        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["tool"], "web_search");
        assert_eq!(value["args"]["query"], "rust");
        assert!(value.get("id").is_none());
        assert!(value.get("timestamp").is_some());

        let back: Activity = serde_json::from_value(value).unwrap();
        assert_eq!(back, activity);
    }

    #[test]
    fn test_activity_generate_id() {
        let activity = Activity::new(ActivityKind::Thought {
            content: "plan".to_string(),
        });
        let id = activity.generate_id();
        assert!(id.starts_with("activity_"));
        assert!(id.ends_with("_thought"));
    }

    #[test]
    fn test_message_preserves_unknown_fields() {
        let raw = r#"{"id":"m1","content":"hi","timestamp":1700000000000,"attachments":["a.png"]}"#;
        let message: Message = serde_json::from_str(raw).unwrap();

        assert_eq!(message.id, Some(MessageId::from("m1")));
        assert_eq!(message.role, "user");
        assert!(!message.processed);
        assert!(message.sent_at().is_some());

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["attachments"][0], "a.png");
        assert_eq!(value["timestamp"], 1700000000000i64);
    }

    #[test]
    fn test_message_id_numeric_and_text() {
        let numeric: MessageId = serde_json::from_str("42").unwrap();
        let text: MessageId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(numeric, MessageId::Number(42));
        assert_eq!(text.to_string(), "abc");
    }

    #[test]
    fn test_project_paths() {
        let project = Project::new("/tmp/research/p1");
        assert!(project.progress_path().ends_with(".research-progress.json"));
        assert!(project.activities_path().ends_with(".activities.json"));
        assert!(project.messages_path().ends_with(".messages.json"));
        assert!(project.kill_path().ends_with(".kill"));
        assert!(project.metadata_path().ends_with("metadata.json"));
    }
}
