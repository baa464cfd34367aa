//! Ordered classification rules
//!
//! Each rule inspects one line and either declines it ([`RuleOutcome::NoMatch`])
//! or settles it. The first rule that settles a line wins.

use super::literal::parse_payload;
use super::ClassifierSession;
use crate::types::ActivityKind;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// What a rule decided about a line
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The rule does not apply; try the next one
    NoMatch,
    /// The line must be discarded without further rules
    Drop,
    /// The line updated session state but produces no activity
    Consumed,
    /// The line produces an activity
    Emit(ActivityKind),
}

/// A named classification rule
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&mut ClassifierSession, &str) -> RuleOutcome,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Rules in priority order
pub static RULES: &[Rule] = &[
    Rule { name: "sensitive", apply: sensitive },
    Rule { name: "call_announcement", apply: call_announcement },
    Rule { name: "tool_name_field", apply: tool_name_field },
    Rule { name: "pending_name_field", apply: pending_name_field },
    Rule { name: "action_marker", apply: action_marker },
    Rule { name: "verb_with_args", apply: verb_with_args },
    Rule { name: "verb_loose", apply: verb_loose },
    Rule { name: "thought", apply: thought },
    Rule { name: "tool_results", apply: tool_results },
];

const SENSITIVE_MARKERS: [&str; 5] = [
    "api_key",
    "apikey",
    "x-api-key",
    "idempotency_key",
    "authorization",
];

/// Method names that show up in a `name` field but are not tools
const METHOD_ARTIFACTS: [&str; 6] = [
    "tools/call",
    "tools/list",
    "call_tool",
    "list_tools",
    "initialize",
    "notifications/initialized",
];

const LOOSE_STOP_LIST: [&str; 10] = [
    "to", "call", "be", "the", "a", "an", "with", "for", "jsonrpc", "mcp_agent",
];

const CALL_METHOD_MARKERS: [&str; 2] = ["tools/call", "call_tool"];

const THOUGHT_PREFIXES: [&str; 3] = ["Thought:", "Reasoning:", "Plan:"];

const RESULTS_MARKER: &str = "Tool call results:";

pub const ACTION_ARGS_PLACEHOLDER: &str = "Action format (args not extracted)";
pub const NO_ARGS_PLACEHOLDER: &str = "No arguments provided";
pub const UNKNOWN_TOOL: &str = "Unknown Tool";

// ============================================
// Patterns
// ============================================

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static CACHED: OnceLock<Regex> = OnceLock::new();
            CACHED.get_or_init(|| Regex::new($pattern).expect("valid classifier regex"))
        }
    };
}

cached_regex!(announcement_re, r"(?i)\b(?:requesting|preparing|sending) tool call\b");
cached_regex!(tool_name_re, r#"["']tool_name["']\s*:\s*["']([^"']+)["']"#);
cached_regex!(name_re, r#"["']name["']\s*:\s*["']([^"']+)["']"#);
cached_regex!(action_line_re, r"(?m)^Action:\s+([a-zA-Z0-9_]+)");
cached_regex!(action_anywhere_re, r"Action:\s+([a-zA-Z0-9_]+)");
cached_regex!(
    verb_with_args_re,
    r#"(?is)(?:Calling|Executing|Invoking|Requesting)\s+(?:tool|function)[:\s]+['"]?([a-zA-Z0-9_.-]+)['"]?\s+with\s+(?:args|arguments|parameters)[:\s]*(\{.+\})"#
);
cached_regex!(
    verb_loose_re,
    r#"(?i)(?:Calling|Executing|Invoking|Requesting)\s+(?:tool|function)[:\s]+['"]?([a-zA-Z0-9_.-]+)['"]?"#
);

// ============================================
// Rules
// ============================================

/// Credential-bearing lines never reach the feed.
fn sensitive(_: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let lower = line.to_lowercase();
    if SENSITIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        RuleOutcome::Drop
    } else {
        RuleOutcome::NoMatch
    }
}

/// A call is announced; its name arrives on a later line.
fn call_announcement(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let announced = line.contains("tools/call") || announcement_re().is_match(line);
    if announced && !tool_name_re().is_match(line) && !name_re().is_match(line) {
        session.pending_tool_call = true;
        RuleOutcome::Consumed
    } else {
        RuleOutcome::NoMatch
    }
}

fn tool_name_field(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let Some(captures) = tool_name_re().captures(line) else {
        return RuleOutcome::NoMatch;
    };
    let tool = captures[1].to_string();
    session.pending_tool_call = false;
    session.last_tool_called = Some(tool.clone());
    RuleOutcome::Emit(ActivityKind::ToolCall {
        tool,
        args: embedded_arguments(line),
    })
}

fn pending_name_field(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let has_marker = CALL_METHOD_MARKERS.iter().any(|m| line.contains(m));
    if !session.pending_tool_call && !has_marker {
        return RuleOutcome::NoMatch;
    }

    let Some(tool) = name_re()
        .captures_iter(line)
        .map(|c| c[1].to_string())
        .find(|name| !METHOD_ARTIFACTS.contains(&name.as_str()))
    else {
        return RuleOutcome::NoMatch;
    };

    session.pending_tool_call = false;
    session.last_tool_called = Some(tool.clone());
    RuleOutcome::Emit(ActivityKind::ToolCall {
        tool,
        args: embedded_arguments(line),
    })
}

fn action_marker(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let Some(captures) = action_line_re().captures(line) else {
        return RuleOutcome::NoMatch;
    };
    let tool = captures[1].to_string();
    session.last_tool_called = Some(tool.clone());
    RuleOutcome::Emit(ActivityKind::ToolCall {
        tool,
        args: Value::String(ACTION_ARGS_PLACEHOLDER.to_string()),
    })
}

fn verb_with_args(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let Some(captures) = verb_with_args_re().captures(line) else {
        return RuleOutcome::NoMatch;
    };
    let tool = captures[1].to_string();
    let raw_args = captures[2].trim();
    let args = serde_json::from_str(raw_args)
        .unwrap_or_else(|_| Value::String(raw_args.to_string()));

    session.last_tool_called = Some(tool.clone());
    RuleOutcome::Emit(ActivityKind::ToolCall { tool, args })
}

fn verb_loose(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let Some(captures) = verb_loose_re().captures(line) else {
        return RuleOutcome::NoMatch;
    };
    let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
        return RuleOutcome::NoMatch;
    };

    let tool = name.as_str().to_string();
    if LOOSE_STOP_LIST.contains(&tool.to_lowercase().as_str()) {
        return RuleOutcome::NoMatch;
    }

    let remaining = line[whole.end()..].trim();
    let args = if remaining.is_empty() {
        NO_ARGS_PLACEHOLDER
    } else {
        remaining
    };

    session.last_tool_called = Some(tool.clone());
    RuleOutcome::Emit(ActivityKind::ToolCall {
        tool,
        args: Value::String(args.to_string()),
    })
}

fn thought(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let has_marker =
        THOUGHT_PREFIXES.iter().any(|p| line.contains(p)) || line.contains("Action:");
    if !has_marker {
        return RuleOutcome::NoMatch;
    }

    let content = THOUGHT_PREFIXES
        .iter()
        .find_map(|prefix| line.split_once(prefix).map(|(_, rest)| rest.trim()))
        .unwrap_or(line)
        .to_string();

    if let Some(captures) = action_anywhere_re().captures(line) {
        session.last_tool_called = Some(captures[1].to_string());
    }

    RuleOutcome::Emit(ActivityKind::Thought { content })
}

fn tool_results(session: &mut ClassifierSession, line: &str) -> RuleOutcome {
    let Some((_, payload)) = line.split_once(RESULTS_MARKER) else {
        return RuleOutcome::NoMatch;
    };
    let payload = payload.trim_start();

    // Scalars and unparseable payloads are reported verbatim
    let output = match parse_payload(payload) {
        Some(value) if value.is_array() || value.is_object() => {
            result_texts(&value).join("\n\n")
        }
        _ => payload.to_string(),
    };

    if output.is_empty() {
        return RuleOutcome::Consumed;
    }

    let tool = session
        .last_tool_called
        .clone()
        .unwrap_or_else(|| infer_tool_from_output(&output).to_string());

    RuleOutcome::Emit(ActivityKind::ToolResult { tool, output })
}

// ============================================
// Helpers
// ============================================

/// Text items of a result list: `[{"content": [{"type": "text", "text": ...}]}]`
fn result_texts(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => std::slice::from_ref(value),
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| item.get("content")?.as_array())
        .flatten()
        .filter(|content| content.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|content| content.get("text")?.as_str().map(str::to_string))
        .collect()
}

/// Arguments carried in a JSON fragment of the line, if any
fn embedded_arguments(line: &str) -> Value {
    let parsed = match (line.find('{'), line.rfind('}')) {
        (Some(start), Some(end)) if start < end => parse_payload(&line[start..=end]),
        _ => None,
    };

    parsed
        .as_ref()
        .and_then(find_arguments)
        .cloned()
        .unwrap_or_else(|| Value::String(NO_ARGS_PLACEHOLDER.to_string()))
}

fn find_arguments(value: &Value) -> Option<&Value> {
    let object = value.as_object()?;
    for key in ["arguments", "args", "input"] {
        if let Some(found) = object.get(key) {
            return Some(found);
        }
    }
    object.values().find_map(find_arguments)
}

/// Guess which tool produced an output when no call was seen.
pub fn infer_tool_from_output(output: &str) -> &'static str {
    let lower = output.to_lowercase();

    if lower.contains("progress updated:") {
        "update_research_progress"
    } else if lower.contains("metadata saved") || lower.contains("title:") {
        "write_research_metadata"
    } else if lower.contains("successfully wrote") || lower.contains("characters to") {
        "write_file"
    } else if ["https://", "http://", "www."].iter().any(|d| lower.contains(d)) {
        "web_search"
    } else if lower.contains("directory created") || lower.contains("created directory") {
        "create_directory"
    } else {
        UNKNOWN_TOOL
    }
}
