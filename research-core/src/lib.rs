//! # research-core
//!
//! Core library for research-agent - a coordinator for long-running,
//! tool-calling research sessions.
//!
//! This library provides:
//! - Classification of the agent runtime's diagnostic lines into a typed activity feed
//! - A completion gate that caps progress while generated HTML links to missing files
//! - A polling follow-up loop with error backoff and cancellation
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Everything a session knows lives in its project directory:
//! - `.activities.json` - the activity feed, capped to the most recent entries
//! - `.research-progress.json` - the single progress record
//! - `.messages.json` - queued follow-up messages and their responses
//! - `.kill` - cancellation sentinel
//! - `metadata.json` - title and description shown by the portal
//!
//! Every state transition is also mirrored as one JSON object per line on a
//! live event channel (see [`events`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use research_core::{Config, Project, ProgressStore, ProgressUpdate};
//!
//! let config = Config::load().expect("failed to load config");
//! let project = Project::new("/tmp/research/grills");
//!
//! let store = ProgressStore::new(&project, &config.progress);
//! let outcome = store.update(&ProgressUpdate::new(100, "Complete", "All files written"));
//! println!("{}", outcome.summary());
//! ```

// Re-export commonly used items at the crate root
pub use classify::{ActivityPipeline, ClassifierSession, LogClassifier};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{CollectingSink, EventSink, JsonLinesSink, Lifecycle, LiveEvent};
pub use links::{check_missing_files, extract_local_links, MissingLinks};
pub use llm::{HttpLlmTurn, LlmTurn};
pub use message_loop::{LoopExit, MessageLoop, PollOutcome};
pub use session::{ResearchRequest, ResearchSession, SessionOutcome};
pub use store::{
    ActivityStore, Loaded, MessageQueue, MetadataStore, MetadataUpdate, ProgressOutcome,
    ProgressStore, ProgressUpdate,
};
pub use types::*;

// Public modules
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod links;
pub mod llm;
pub mod logging;
pub mod message_loop;
pub mod prompt;
pub mod session;
pub mod store;
pub mod types;
