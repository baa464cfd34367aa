//! Diagnostic stream classification
//!
//! The agent runtime narrates its work as unstructured log lines. This
//! module turns those lines into typed [`Activity`] records:
//!
//! - [`LogClassifier`] applies the ordered [`rules::RULES`] table to one line
//!   at a time, keeping the little state the multi-line formats need in a
//!   [`ClassifierSession`].
//! - [`ActivityPipeline`] feeds every recognized activity to the activity
//!   store and the live event channel, in line order.

mod literal;
pub mod rules;

pub use literal::parse_payload;
pub use rules::{infer_tool_from_output, Rule, RuleOutcome, RULES};

use crate::events::{EventSink, LiveEvent};
use crate::store::ActivityStore;
use crate::types::{Activity, ActivityKind};
use std::io::BufRead;

/// Per-session classifier state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierSession {
    /// Most recently detected tool invocation, used to label results
    pub last_tool_called: Option<String>,
    /// A call was announced and its tool name has not been seen yet
    pub pending_tool_call: bool,
}

/// Line-by-line classifier over an ordered rule table.
#[derive(Debug)]
pub struct LogClassifier {
    session: ClassifierSession,
    rules: &'static [Rule],
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LogClassifier {
    pub fn new() -> Self {
        Self {
            session: ClassifierSession::default(),
            rules: RULES,
        }
    }

    pub fn session(&self) -> &ClassifierSession {
        &self.session
    }

    /// Classify one line into at most one activity payload.
    pub fn classify(&mut self, line: &str) -> Option<ActivityKind> {
        self.classify_with_rule(line).map(|(_, kind)| kind)
    }

    /// Classify one line, also reporting which rule produced the activity.
    pub fn classify_with_rule(&mut self, line: &str) -> Option<(&'static str, ActivityKind)> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        for rule in self.rules {
            match (rule.apply)(&mut self.session, line) {
                RuleOutcome::NoMatch => continue,
                RuleOutcome::Drop | RuleOutcome::Consumed => {
                    tracing::trace!(rule = rule.name, "Line settled without activity");
                    return None;
                }
                RuleOutcome::Emit(kind) => {
                    tracing::debug!(rule = rule.name, kind = kind.as_str(), "Line classified");
                    return Some((rule.name, kind));
                }
            }
        }

        None
    }
}

/// Classifier bound to an activity store and a live event sink.
pub struct ActivityPipeline<'a> {
    classifier: LogClassifier,
    store: Option<ActivityStore>,
    sink: &'a dyn EventSink,
}

impl<'a> ActivityPipeline<'a> {
    pub fn new(store: Option<ActivityStore>, sink: &'a dyn EventSink) -> Self {
        Self {
            classifier: LogClassifier::new(),
            store,
            sink,
        }
    }

    pub fn classifier(&self) -> &LogClassifier {
        &self.classifier
    }

    /// Classify one line; a recognized activity is stored and emitted.
    pub fn ingest_line(&mut self, line: &str) -> Option<Activity> {
        let kind = self.classifier.classify(line)?;
        let activity = Activity::new(kind);

        let activity = match &self.store {
            Some(store) => store.append(activity),
            None => Activity {
                id: Some(activity.generate_id()),
                ..activity
            },
        };

        self.sink.emit(&LiveEvent::Activity(activity.clone()));
        Some(activity)
    }

    /// Feed every line of `reader` through the pipeline.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Returns the number of
    /// activities produced.
    pub fn ingest_reader<R: BufRead>(&mut self, mut reader: R) -> std::io::Result<usize> {
        let mut produced = 0;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if self.ingest_line(&line).is_some() {
                produced += 1;
            }
        }

        tracing::info!(activities = produced, "Diagnostic stream ended");
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityConfig;
    use crate::events::CollectingSink;
    use crate::types::Project;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_sensitive_line_wins_over_everything() {
        let mut classifier = LogClassifier::new();
        assert_eq!(
            classifier.classify(r#"Calling tool: web_search with args: {"api_key": "sk"}"#),
            None
        );
        assert!(classifier.session().last_tool_called.is_none());
    }

    #[test]
    fn test_streamed_call_across_lines() {
        let mut classifier = LogClassifier::new();

        assert_eq!(classifier.classify("Requesting tool call"), None);
        assert!(classifier.session().pending_tool_call);

        let (rule, kind) = classifier
            .classify_with_rule(r#"{"name": "web_search", "arguments": {"query": "grills"}}"#)
            .unwrap();
        assert_eq!(rule, "pending_name_field");
        assert_eq!(
            kind,
            ActivityKind::ToolCall {
                tool: "web_search".to_string(),
                args: json!({"query": "grills"}),
            }
        );
        assert!(!classifier.session().pending_tool_call);
    }

    #[test]
    fn test_result_is_labelled_with_last_tool() {
        let mut classifier = LogClassifier::new();
        classifier.classify("Action: fetch_url");
        let kind = classifier
            .classify("Tool call results: [{'content': [{'type': 'text', 'text': 'page body'}]}]")
            .unwrap();
        assert_eq!(kind.tool(), Some("fetch_url"));
    }

    #[test]
    fn test_unrecognized_lines_are_discarded() {
        let mut classifier = LogClassifier::new();
        assert_eq!(classifier.classify("[INFO] mcp_agent.context: loading settings"), None);
        assert_eq!(classifier.classify(""), None);
        assert_eq!(classifier.classify("   \n"), None);
    }

    #[test]
    fn test_pipeline_stores_and_emits_in_order() {
        let dir = TempDir::new().unwrap();
        let store = ActivityStore::new(&Project::new(dir.path()), &ActivityConfig::default());
        let sink = CollectingSink::new();
        let mut pipeline = ActivityPipeline::new(Some(store.clone()), &sink);

        let input = "Thought: start with a search\n\
                     noise line\n\
                     Calling tool: web_search with args: {\"query\": \"grills\"}\n\
                     Tool call results: Found https://example.com/grills\n";
        let produced = pipeline.ingest_reader(input.as_bytes()).unwrap();

        assert_eq!(produced, 3);
        assert_eq!(sink.types(), vec!["thought", "tool_call", "tool_result"]);

        let stored = store.load();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[2].kind.tool(), Some("web_search"));
        assert!(stored.iter().all(|a| a.id.is_some()));
    }

    #[test]
    fn test_pipeline_without_store_still_emits() {
        let sink = CollectingSink::new();
        let mut pipeline = ActivityPipeline::new(None, &sink);

        let activity = pipeline.ingest_line("Plan: outline the report").unwrap();
        assert!(activity.id.is_some());
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_pipeline_tolerates_invalid_utf8() {
        let sink = CollectingSink::new();
        let mut pipeline = ActivityPipeline::new(None, &sink);

        let mut input = b"Thought: caf\xe9 review\n".to_vec();
        input.extend_from_slice(b"Action: web_search\n");
        assert_eq!(pipeline.ingest_reader(input.as_slice()).unwrap(), 2);
    }
}
