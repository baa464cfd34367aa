//! Prompt templates for research turns
//!
//! Templates use `{name}` placeholders. Rendering substitutes the known
//! placeholders only; the templates carry no other braces.

use crate::error::{Error, Result};
use crate::types::Message;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// How much effort the initial research turn should spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
    Unlimited,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Quick => "quick",
            Depth::Standard => "standard",
            Depth::Deep => "deep",
            Depth::Unlimited => "unlimited",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Depth::Quick => "Provide a concise 15-20 minute research summary with 5-10 tool calls",
            Depth::Standard => {
                "Provide a comprehensive 45-60 minute research with 15-20 tool calls"
            }
            Depth::Deep => "Provide an exhaustive in-depth research with 30-40 tool calls",
            Depth::Unlimited => {
                "Research as thoroughly as needed - NO LIMIT on tool calls or depth"
            }
        }
    }

    /// Parse a depth name, falling back to [`Depth::Standard`] for unknown names
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            "unlimited" => Ok(Depth::Unlimited),
            _ => Err(format!("unknown depth: {}", s)),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the generated documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Comprehensive,
    Comparing,
    Practical,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Comprehensive => "comprehensive",
            Style::Comparing => "comparing",
            Style::Practical => "practical",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Style::Comprehensive => {
                "Create detailed, well-structured documentation with multiple sections"
            }
            Style::Comparing => "Focus on comparisons and contrasts between options",
            Style::Practical => "Focus on practical, actionable insights and implementation",
        }
    }

    /// Parse a style name, falling back to [`Style::Comprehensive`]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comprehensive" => Ok(Style::Comprehensive),
            "comparing" => Ok(Style::Comparing),
            "practical" => Ok(Style::Practical),
            _ => Err(format!("unknown style: {}", s)),
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Templates
// ============================================

const RESEARCH_INSTRUCTION: &str = "\
You are a meticulous research assistant. Research the following topic and
publish your findings as a small website of HTML files in the working
directory.

TOPIC: {topic}

CURRENT TIME: {current_time}

DEPTH: {depth_instruction}
STYLE: {style_instruction}

TEMPORAL AWARENESS
- Compare every source date against the current time above.
- When the user asks for the LATEST information, prefer sources from the
  last few weeks; for fast-moving fields such as AI, anything older than a
  few months may already be outdated.
- Verify the release date of any product before recommending it.
- Do not add an old year range such as \"2024 2025\" to searches; use the
  time_range parameter of the search tool instead.

METHOD
1. PLANNING: break the topic into questions and list the sources you need.
2. SEARCH: run focused searches for each question.
3. EVALUATE: judge every source for currency, relevance, authority,
   accuracy and purpose (CRAAP).
4. GAP ANALYSIS: list what is still unanswered and iterate on SEARCH until
   the gaps are closed.
5. SYNTHESIS: write the final documents.

REPORTING
- Call filesystem_write_research_metadata first to set the project title,
  description, category and tags.
- Call filesystem_update_research_progress at every phase boundary with an
  honest percentage and an estimate of the minutes remaining.
- Progress of 90% or more is rejected while any HTML file links to a local
  file that does not exist. Create every page you link to.

DOCUMENTS
- Start with index.html and split long material into multiple files.
- Use a dark background with light text and keep styling inline.
- Cite every source with a link.
";

const USER_PROMPT: &str = "\
Research topic: {topic}

Follow your research instructions and report progress as you go.
";

const CONTINUATION_INSTRUCTION: &str = "\
{history}The user has a follow-up request about the research in this
directory:

{user_message}

Treat this as a continuation of the same project. Read the existing files
before changing them, research anything new the request needs, update or
add HTML files as required and keep every local link valid. Report progress
with filesystem_update_research_progress and finish with a short summary of
what changed.
";

const HISTORY_HEADER: &str = "=== PREVIOUS CONVERSATION HISTORY ===\n\n";
const HISTORY_FOOTER: &str = "=== END CONVERSATION HISTORY ===\n\n";

fn render(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Prompt(format!("{} must not be empty", name)));
    }
    Ok(())
}

/// System instruction for the initial research turn.
pub fn research_instruction(
    topic: &str,
    depth: Depth,
    style: Style,
    now: DateTime<Utc>,
) -> Result<String> {
    require_non_empty("topic", topic)?;
    let current_time = now.format("%Y-%m-%d %H:%M:%S").to_string();
    Ok(render(
        RESEARCH_INSTRUCTION,
        &[
            ("topic", topic),
            ("current_time", &current_time),
            ("depth_instruction", depth.instruction()),
            ("style_instruction", style.instruction()),
        ],
    ))
}

/// Minimal user turn that starts the research.
pub fn user_prompt(topic: &str) -> Result<String> {
    require_non_empty("topic", topic)?;
    Ok(render(USER_PROMPT, &[("topic", topic)]))
}

/// Prompt for one follow-up message, optionally preceded by history.
pub fn continuation_prompt(user_message: &str, history: Option<&str>) -> Result<String> {
    require_non_empty("user message", user_message)?;
    Ok(render(
        CONTINUATION_INSTRUCTION,
        &[
            ("history", history.unwrap_or_default()),
            ("user_message", user_message),
        ],
    ))
}

/// Render the conversation so far; `None` when there is nothing to show.
pub fn render_history(messages: &[Message]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let mut out = String::from(HISTORY_HEADER);
    for message in messages {
        let sent_at = message
            .sent_at()
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S");
        out.push_str(&format!(
            "[{}] {}: {}\n",
            sent_at,
            message.role.to_uppercase(),
            message.content
        ));
        if let Some(response) = message.response.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(&format!("ASSISTANT: {}\n", response));
        }
        out.push('\n');
    }
    out.push_str(HISTORY_FOOTER);
    Some(out)
}
