//! Follow-up conversation loop
//!
//! After the initial research turn the session keeps polling the project's
//! message queue. Each unprocessed message gets one LLM turn; the answer is
//! written back to the queue and announced on the live channel.
//!
//! ```text
//! POLLING -> PROCESSING -> POLLING -> ... -> TERMINATED
//! ```
//!
//! The loop terminates when the project directory disappears, the `.kill`
//! sentinel appears, the in-process shutdown flag is raised, or too many
//! consecutive iterations fail.

use crate::config::{Config, MessageLoopConfig};
use crate::error::Result;
use crate::events::{EventSink, Lifecycle, Status};
use crate::llm::LlmTurn;
use crate::prompt;
use crate::store::{MessageQueue, ProgressOutcome, ProgressStore, ProgressUpdate};
use crate::types::{Message, MessageId, Project};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting, so a shutdown request is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The project directory no longer exists
    ProjectMissing,
    /// The `.kill` sentinel is present
    KillFile,
    /// The in-process shutdown flag was raised
    Shutdown,
    /// `max_consecutive_errors` iterations failed in a row
    TooManyErrors { consecutive: u32, last_error: String },
}

impl LoopExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopExit::ProjectMissing => "project_missing",
            LoopExit::KillFile => "kill_file",
            LoopExit::Shutdown => "shutdown",
            LoopExit::TooManyErrors { .. } => "too_many_errors",
        }
    }

    /// Whether the loop stopped because it was asked to
    pub fn is_requested(&self) -> bool {
        matches!(self, LoopExit::KillFile | LoopExit::Shutdown)
    }
}

/// Result of a single poll iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new in the queue
    Idle,
    /// This many messages were answered
    Processed(usize),
    /// A termination condition was detected
    Terminated(LoopExit),
}

pub struct MessageLoop<'a> {
    project: Project,
    queue: MessageQueue,
    progress: ProgressStore,
    sink: &'a dyn EventSink,
    config: MessageLoopConfig,
    last_message_id: Option<MessageId>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<'a> MessageLoop<'a> {
    pub fn new(project: &Project, config: &Config, sink: &'a dyn EventSink) -> Self {
        Self {
            project: project.clone(),
            queue: MessageQueue::new(project),
            progress: ProgressStore::new(project, &config.progress),
            sink,
            config: config.message_loop.clone(),
            last_message_id: None,
            shutdown: None,
        }
    }

    /// Stop at the next check once `flag` is set
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Id of the last message picked up for processing
    pub fn last_message_id(&self) -> Option<&MessageId> {
        self.last_message_id.as_ref()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn check_termination(&self) -> Option<LoopExit> {
        if !self.project.exists() {
            Some(LoopExit::ProjectMissing)
        } else if self.project.kill_requested() {
            Some(LoopExit::KillFile)
        } else if self.shutdown_requested() {
            Some(LoopExit::Shutdown)
        } else {
            None
        }
    }

    /// Run one iteration: termination checks, then one pass over the queue.
    pub fn poll_once(&mut self, llm: &mut dyn LlmTurn) -> Result<PollOutcome> {
        if let Some(exit) = self.check_termination() {
            return Ok(PollOutcome::Terminated(exit));
        }

        let candidates: Vec<Message> = self
            .queue
            .pending()?
            .into_iter()
            .filter(|m| m.id != self.last_message_id)
            .collect();

        let mut processed = 0;
        for message in candidates {
            self.process_message(message, llm)?;
            processed += 1;
        }

        Ok(if processed == 0 {
            PollOutcome::Idle
        } else {
            PollOutcome::Processed(processed)
        })
    }

    fn process_message(&mut self, message: Message, llm: &mut dyn LlmTurn) -> Result<()> {
        // Recorded before processing: a failing message is not retried while it stays the latest
        self.last_message_id = message.id.clone();
        let message_id = message.id.clone();

        tracing::info!(
            message_id = ?message_id,
            chars = message.content.len(),
            "Processing follow-up message"
        );

        self.sink.lifecycle(Lifecycle::UserMessageReceived {
            message: message.content.clone(),
            message_id: message_id.clone(),
        });
        self.advance(10, "Processing follow-up request");

        let history = if self.config.include_history {
            let answered: Vec<Message> = self
                .queue
                .load()?
                .into_iter()
                .filter(|m| m.processed)
                .collect();
            prompt::render_history(&answered)
        } else {
            None
        };
        let prompt = prompt::continuation_prompt(&message.content, history.as_deref())?;

        self.sink.lifecycle(Lifecycle::LlmStarting {
            topic: message.content.clone(),
        });
        self.advance(30, "Researching follow-up");

        let response = llm.run_turn(&prompt)?;

        self.sink.lifecycle(Lifecycle::LlmCompleted {
            status: Status::Success,
        });
        self.advance(90, "Finalizing response");

        if let Some(id) = &message_id {
            self.queue.mark_processed(id, &response)?;
        }

        self.advance(100, "Follow-up complete - Ready for messages");

        self.sink.lifecycle(Lifecycle::MessageProcessed {
            message_id: message_id.clone(),
        });
        self.sink.lifecycle(Lifecycle::AssistantResponse {
            message_id,
            response,
        });
        self.sink.lifecycle(Lifecycle::ResearchFullyCompleted {
            status: Status::Success,
        });
        Ok(())
    }

    /// Gated progress write mirrored onto the live channel
    fn advance(&self, percentage: i64, task: &str) -> ProgressOutcome {
        let outcome = self.progress.update(&ProgressUpdate::new(
            percentage,
            task,
            format!("Currently working on: {}", task),
        ));
        emit_progress(self.sink, &outcome);
        outcome
    }

    /// Poll until a termination condition or the error threshold is reached.
    pub fn run(&mut self, llm: &mut dyn LlmTurn) -> LoopExit {
        self.sink.lifecycle(Lifecycle::MessageLoopStarted {
            message: "Listening for follow-up messages".to_string(),
        });
        tracing::info!(project = %self.project.root().display(), "Message loop started");

        let mut consecutive_errors: u32 = 0;

        loop {
            match self.poll_once(llm) {
                Ok(PollOutcome::Terminated(exit)) => {
                    self.sink.lifecycle(Lifecycle::log(termination_message(&exit)));
                    tracing::info!(reason = exit.as_str(), "Message loop terminated");
                    return exit;
                }
                Ok(_) => {
                    consecutive_errors = 0;
                    self.pause(self.config.poll_interval());
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        error = %e,
                        consecutive_errors,
                        "Message loop iteration failed"
                    );
                    self.sink.lifecycle(Lifecycle::MessageLoopError {
                        error: e.to_string(),
                        consecutive_errors,
                    });

                    if consecutive_errors >= self.config.max_consecutive_errors {
                        let exit = LoopExit::TooManyErrors {
                            consecutive: consecutive_errors,
                            last_error: e.to_string(),
                        };
                        self.sink.lifecycle(Lifecycle::log(termination_message(&exit)));
                        tracing::error!(consecutive_errors, "Message loop giving up");
                        return exit;
                    }

                    self.pause(self.config.error_backoff());
                }
            }
        }
    }

    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline || self.shutdown_requested() {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Mirror a progress write onto the live channel.
///
/// A capped write is followed by a log event explaining what is missing.
pub fn emit_progress(sink: &dyn EventSink, outcome: &ProgressOutcome) {
    sink.lifecycle(Lifecycle::progress(
        outcome.record.current_task.clone(),
        outcome.record.percentage,
    ));
    if outcome.blocked {
        sink.lifecycle(Lifecycle::log(outcome.summary()));
    }
}

fn termination_message(exit: &LoopExit) -> String {
    match exit {
        LoopExit::ProjectMissing => {
            "Project directory no longer exists. Exiting message loop.".to_string()
        }
        LoopExit::KillFile => "Received kill signal. Exiting message loop.".to_string(),
        LoopExit::Shutdown => "Shutdown requested. Exiting message loop.".to_string(),
        LoopExit::TooManyErrors { consecutive, .. } => format!(
            "Stopping message loop after {} consecutive errors.",
            consecutive
        ),
    }
}
