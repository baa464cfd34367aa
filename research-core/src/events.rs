//! Live event protocol
//!
//! Every state transition of a session is mirrored as one JSON object per
//! line on a dedicated output channel (stdout in the binary). Activities
//! share the channel with lifecycle events and use the same flat shape they
//! have in `.activities.json`.

use crate::types::{Activity, MessageId};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

/// Outcome marker carried by completion events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Lifecycle {
    Init {
        project_dir: String,
        topic: String,
        provider: String,
        model: String,
    },
    AppStarted {
        project_dir: String,
    },
    ToolsLoaded {
        count: usize,
        tools: Vec<String>,
    },
    ResearchStarted {
        cwd: String,
    },
    LlmStarting {
        topic: String,
    },
    Progress {
        message: String,
        percentage: u8,
    },
    LlmCompleted {
        status: Status,
    },
    ResearchCompleted {
        status: Status,
    },
    AssistantResponse {
        /// `None` for the initial research turn
        message_id: Option<MessageId>,
        response: String,
    },
    ResearchFullyCompleted {
        status: Status,
    },
    WaitingForMessages {
        message: String,
    },
    MessageLoopStarted {
        message: String,
    },
    UserMessageReceived {
        message: String,
        message_id: Option<MessageId>,
    },
    MessageProcessed {
        message_id: Option<MessageId>,
    },
    MessageLoopError {
        error: String,
        consecutive_errors: u32,
    },
    Log {
        message: String,
    },
    Error {
        error: String,
        error_type: String,
    },
    ResumeMode {
        message: String,
    },
    HistoryLoaded {
        message: String,
    },
}

impl Lifecycle {
    pub fn log(message: impl Into<String>) -> Self {
        Lifecycle::Log {
            message: message.into(),
        }
    }

    pub fn progress(message: impl Into<String>, percentage: u8) -> Self {
        Lifecycle::Progress {
            message: message.into(),
            percentage,
        }
    }
}

/// One object on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveEvent {
    Activity(Activity),
    Lifecycle(Lifecycle),
}

impl LiveEvent {
    /// The `type` field of the serialized event
    pub fn event_type(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default()
    }
}

impl From<Activity> for LiveEvent {
    fn from(activity: Activity) -> Self {
        LiveEvent::Activity(activity)
    }
}

impl From<Lifecycle> for LiveEvent {
    fn from(event: Lifecycle) -> Self {
        LiveEvent::Lifecycle(event)
    }
}

// ============================================
// Sinks
// ============================================

/// Destination for live events.
///
/// Emitting never fails from the caller's point of view; sinks report their
/// own write problems through tracing.
pub trait EventSink {
    fn emit(&self, event: &LiveEvent);

    fn lifecycle(&self, event: Lifecycle) {
        self.emit(&LiveEvent::Lifecycle(event));
    }
}

/// Newline-delimited JSON writer, flushed after every event.
pub struct JsonLinesSink<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &LiveEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize live event");
                return;
            }
        };

        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!(error = %e, "Failed to write live event");
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<LiveEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<LiveEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `type` of every emitted event, in order
    pub fn types(&self) -> Vec<String> {
        self.events().iter().map(LiveEvent::event_type).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &LiveEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityKind;

    #[test]
    fn test_lifecycle_json_shape() {
        let event = LiveEvent::from(Lifecycle::AssistantResponse {
            message_id: None,
            response: "hello".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "assistant_response");
        assert!(value["message_id"].is_null());
        assert_eq!(value["response"], "hello");

        let value = serde_json::to_value(LiveEvent::from(Lifecycle::LlmCompleted {
            status: Status::Success,
        }))
        .unwrap();
        assert_eq!(value, serde_json::json!({"type": "llm_completed", "status": "success"}));
    }

    #[test]
    fn test_activity_shares_flat_shape() {
        let event = LiveEvent::from(Activity::new(ActivityKind::ToolResult {
            tool: "web_search".to_string(),
            output: "results".to_string(),
        }));
        assert_eq!(event.event_type(), "tool_result");
    }

    #[test]
    fn test_untagged_round_trip_prefers_lifecycle_without_timestamp() {
        let line = r#"{"type":"error","error":"boom","error_type":"Llm"}"#;
        let event: LiveEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(event, LiveEvent::Lifecycle(Lifecycle::Error { .. })));
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.lifecycle(Lifecycle::log("one"));
        sink.lifecycle(Lifecycle::progress("two", 30));

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"type":"log","message":"one"}"#);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["percentage"], 30);
    }

    #[test]
    fn test_collecting_sink_records_order() {
        let sink = CollectingSink::new();
        sink.lifecycle(Lifecycle::log("a"));
        sink.lifecycle(Lifecycle::ResumeMode {
            message: "Resuming research session".to_string(),
        });
        assert_eq!(sink.types(), vec!["log", "resume_mode"]);
    }
}
