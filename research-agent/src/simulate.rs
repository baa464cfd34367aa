//! research-agent-simulate - scripted live event stream for UI testing
//!
//! Prints the same JSON lines a real session emits, with fixed pauses in
//! between, so front ends can be exercised without LLM costs.

use anyhow::{Context, Result};
use clap::Parser;
use research_core::events::Status;
use research_core::{Activity, ActivityKind, EventSink, JsonLinesSink, Lifecycle, LiveEvent};
use serde_json::json;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "research-agent-simulate")]
#[command(about = "Print a scripted research session event stream")]
#[command(version)]
struct Args {
    /// Research topic
    #[arg(default_value = "Simulation Test")]
    topic: String,

    /// Project directory reported in the events
    project_dir: Option<PathBuf>,

    /// Base pause between events in milliseconds
    #[arg(long, default_value = "1000")]
    delay_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let project_dir = match args.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .context("failed to resolve current directory")?
            .join("research-projects")
            .join("simulation-test"),
    };
    let project_dir = project_dir.display().to_string();

    let sink = JsonLinesSink::stdout();
    for (event, pause) in script(&args.topic, &project_dir) {
        sink.emit(&event);
        // Pauses are expressed in half steps of the base delay.
        if pause > 0 {
            thread::sleep(Duration::from_millis(args.delay_ms * pause / 2));
        }
    }

    Ok(())
}

fn script(topic: &str, project_dir: &str) -> Vec<(LiveEvent, u64)> {
    let activity = |kind: ActivityKind| LiveEvent::from(Activity::new(kind));

    vec![
        (
            Lifecycle::Init {
                project_dir: project_dir.to_string(),
                topic: topic.to_string(),
                provider: "simulator".to_string(),
                model: "test-model".to_string(),
            }
            .into(),
            2,
        ),
        (
            Lifecycle::AppStarted {
                project_dir: project_dir.to_string(),
            }
            .into(),
            1,
        ),
        (
            Lifecycle::ToolsLoaded {
                count: 15,
                tools: ["web_search", "write_file", "read_file", "crawl_url"]
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            }
            .into(),
            1,
        ),
        (
            Lifecycle::ResearchStarted {
                cwd: project_dir.to_string(),
            }
            .into(),
            2,
        ),
        (
            Lifecycle::LlmStarting {
                topic: topic.to_string(),
            }
            .into(),
            2,
        ),
        (
            activity(ActivityKind::Thought {
                content: format!(
                    "I need to research '{}'. I will start by searching the web for the latest information.",
                    topic
                ),
            }),
            4,
        ),
        (
            activity(ActivityKind::ToolCall {
                tool: "web_search".to_string(),
                args: json!({ "query": format!("{} latest news", topic), "limit": 3 }),
            }),
            4,
        ),
        (
            activity(ActivityKind::ToolResult {
                tool: "web_search".to_string(),
                output: "1. News Article A: The topic is trending.\n\
                         2. News Article B: Experts say it's important.\n\
                         3. News Article C: New developments released yesterday."
                    .to_string(),
            }),
            4,
        ),
        (
            activity(ActivityKind::Thought {
                content: "The search results are promising. I will now create the landing page to summarize these findings."
                    .to_string(),
            }),
            4,
        ),
        (
            activity(ActivityKind::ToolCall {
                tool: "write".to_string(),
                args: json!({
                    "path": "index.html",
                    "content": "<html><body><h1>Research Summary</h1><p>Findings...</p></body></html>",
                }),
            }),
            4,
        ),
        (
            activity(ActivityKind::ToolResult {
                tool: "write".to_string(),
                output: "Successfully wrote to index.html".to_string(),
            }),
            2,
        ),
        (
            Lifecycle::LlmCompleted {
                status: Status::Success,
            }
            .into(),
            0,
        ),
        (
            Lifecycle::ResearchCompleted {
                status: Status::Success,
            }
            .into(),
            0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_order() {
        let types: Vec<String> = script("Grills", "/tmp/grills")
            .iter()
            .map(|(event, _)| event.event_type())
            .collect();

        assert_eq!(types.first().map(String::as_str), Some("init"));
        assert_eq!(types.last().map(String::as_str), Some("research_completed"));
        assert_eq!(types.iter().filter(|t| *t == "tool_call").count(), 2);
        assert_eq!(types.iter().filter(|t| *t == "tool_result").count(), 2);
    }

    #[test]
    fn test_script_uses_topic() {
        let script = script("Grills", "/tmp/grills");
        let line = serde_json::to_string(&script[4].0).unwrap();
        assert!(line.contains("\"type\":\"llm_starting\""));
        assert!(line.contains("Grills"));
    }
}
