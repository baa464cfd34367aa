//! Research session driver
//!
//! Runs the initial research turn for a topic, walking the progress record
//! through its phases, then hands the session to the [`MessageLoop`]. A
//! resumed session skips the research turn and goes straight to the loop.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventSink, Lifecycle, Status};
use crate::llm::LlmTurn;
use crate::message_loop::{emit_progress, LoopExit, MessageLoop};
use crate::prompt::{self, Depth, Style};
use crate::store::{MessageQueue, ProgressStore, ProgressUpdate};
use crate::types::Project;
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Parameters of a research session
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchRequest {
    pub topic: String,
    /// Provider name, reported on the live channel
    pub provider: String,
    pub model: String,
    pub depth: Depth,
    pub style: Style,
    /// Names of the tools available to the collaborator
    pub tools: Vec<String>,
    /// Skip the research turn and only serve follow-up messages
    pub resume: bool,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            provider: String::new(),
            model: String::new(),
            depth: Depth::default(),
            style: Style::default(),
            tools: Vec::new(),
            resume: false,
        }
    }

    /// System instruction for the collaborator
    pub fn system_prompt(&self, now: DateTime<Utc>) -> Result<String> {
        prompt::research_instruction(&self.topic, self.depth, self.style, now)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Research finished, then the message loop stopped
    Completed(LoopExit),
    /// A resumed session's message loop stopped
    Resumed(LoopExit),
    /// The research turn failed
    Failed { error: String, error_type: String },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SessionOutcome::Failed { .. })
    }
}

pub struct ResearchSession<'a> {
    project: Project,
    config: Config,
    sink: &'a dyn EventSink,
    progress: ProgressStore,
    completed_tasks: Vec<String>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<'a> ResearchSession<'a> {
    pub fn new(project: &Project, config: &Config, sink: &'a dyn EventSink) -> Self {
        Self {
            project: project.clone(),
            config: config.clone(),
            sink,
            progress: ProgressStore::new(project, &config.progress),
            completed_tasks: Vec::new(),
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Run the session to completion.
    pub fn run(&mut self, request: &ResearchRequest, llm: &mut dyn LlmTurn) -> SessionOutcome {
        if !self.project.exists() {
            return self.fail(Error::ProjectNotFound(self.project.root().to_path_buf()));
        }

        tracing::info!(
            project = %self.project.root().display(),
            topic = %request.topic,
            resume = request.resume,
            "Research session starting"
        );

        self.start(request);

        if request.resume {
            self.resume();
            return SessionOutcome::Resumed(self.message_loop(llm));
        }

        match self.research(request, llm) {
            Ok(()) => SessionOutcome::Completed(self.message_loop(llm)),
            Err(e) => self.fail(e),
        }
    }

    fn start(&mut self, request: &ResearchRequest) {
        let project_dir = self.project.root().display().to_string();

        self.sink.lifecycle(Lifecycle::Init {
            project_dir: project_dir.clone(),
            topic: request.topic.clone(),
            provider: request.provider.clone(),
            model: request.model.clone(),
        });
        self.phase(0, "Initializing", None);

        self.sink.lifecycle(Lifecycle::AppStarted { project_dir });
        self.phase(10, "Connecting to research tools", Some("Created app configuration"));
        self.phase(20, "Initializing research agent", Some("Connected to research tools"));

        self.sink.lifecycle(Lifecycle::progress(
            format!("Loaded {} tools", request.tools.len()),
            30,
        ));
        self.sink.lifecycle(Lifecycle::ToolsLoaded {
            count: request.tools.len(),
            tools: request.tools.clone(),
        });
        self.phase(30, "Attaching LLM", Some("Loaded research tools"));

        self.sink.lifecycle(Lifecycle::progress(
            format!("Connecting to {} ({})", request.provider, request.model),
            35,
        ));
        self.sink.lifecycle(Lifecycle::progress(
            format!("Connected to {}", request.provider),
            40,
        ));
        self.phase(40, "Starting research", Some("Connected to LLM"));
    }

    fn resume(&mut self) {
        self.sink.lifecycle(Lifecycle::ResumeMode {
            message: "Resuming research session".to_string(),
        });

        match MessageQueue::new(&self.project).load() {
            Ok(messages) => {
                if prompt::render_history(&messages).is_some() {
                    self.sink.lifecycle(Lifecycle::HistoryLoaded {
                        message: "Loaded previous conversation history".to_string(),
                    });
                }
            }
            Err(e) => {
                self.sink.lifecycle(Lifecycle::Error {
                    error: format!("Failed to load conversation history: {}", e),
                    error_type: e.kind().to_string(),
                });
            }
        }

        self.phase(100, "Resumed - Ready for messages", None);
        self.sink.lifecycle(Lifecycle::WaitingForMessages {
            message: "Research resumed. Waiting for messages...".to_string(),
        });
    }

    fn research(&mut self, request: &ResearchRequest, llm: &mut dyn LlmTurn) -> Result<()> {
        self.sink.lifecycle(Lifecycle::ResearchStarted {
            cwd: self.project.root().display().to_string(),
        });
        self.sink.lifecycle(Lifecycle::LlmStarting {
            topic: request.topic.clone(),
        });
        self.sink
            .lifecycle(Lifecycle::progress("LLM is researching...", 50));

        let user_prompt = prompt::user_prompt(&request.topic)?;
        let result = llm.run_turn(&user_prompt)?;

        self.phase(80, "Creating documentation", Some("Completed web research"));
        self.sink.lifecycle(Lifecycle::LlmCompleted {
            status: Status::Success,
        });
        self.phase(90, "Finalizing", Some("Completed research"));
        self.sink.lifecycle(Lifecycle::ResearchCompleted {
            status: Status::Success,
        });
        self.phase(100, "Complete", Some("Generated all files"));

        self.sink.lifecycle(Lifecycle::AssistantResponse {
            message_id: None,
            response: result,
        });
        self.sink.lifecycle(Lifecycle::ResearchFullyCompleted {
            status: Status::Success,
        });
        self.sink.lifecycle(Lifecycle::WaitingForMessages {
            message: "Research complete. Waiting for follow-up questions...".to_string(),
        });
        Ok(())
    }

    fn message_loop(&self, llm: &mut dyn LlmTurn) -> LoopExit {
        let mut message_loop = MessageLoop::new(&self.project, &self.config, self.sink);
        if let Some(flag) = &self.shutdown {
            message_loop = message_loop.with_shutdown(flag.clone());
        }
        message_loop.run(llm)
    }

    fn fail(&mut self, error: Error) -> SessionOutcome {
        tracing::error!(error = %error, "Research session failed");
        self.sink.lifecycle(Lifecycle::Error {
            error: error.to_string(),
            error_type: error.kind().to_string(),
        });
        if self.project.exists() {
            self.phase(100, "Failed", None);
        }
        SessionOutcome::Failed {
            error: error.to_string(),
            error_type: error.kind().to_string(),
        }
    }

    /// Record a phase boundary, optionally completing a task first.
    fn phase(&mut self, percentage: i64, task: &str, completed: Option<&str>) {
        if let Some(done) = completed {
            if !self.completed_tasks.iter().any(|t| t == done) {
                self.completed_tasks.push(done.to_string());
            }
        }
        let outcome = self.progress.update(
            &ProgressUpdate::new(percentage, task, format!("Currently working on: {}", task))
                .with_completed_tasks(self.completed_tasks.clone()),
        );
        emit_progress(self.sink, &outcome);
    }
}
