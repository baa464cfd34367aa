//! research-agent - drive a research session and its follow-up conversation
//!
//! Every subcommand works on a project directory. Live events are written to
//! stdout as one JSON object per line; diagnostics go to the log file.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/research-agent/research-agent.log
//! - Config: $XDG_CONFIG_HOME/research-agent/config.toml

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use research_core::config::{LlmConfig, LlmProvider};
use research_core::logging::log_file_path;
use research_core::prompt::{Depth, Style};
use research_core::store::metadata::format_metadata_saved;
use research_core::{
    ActivityPipeline, ActivityStore, Config, EventSink, HttpLlmTurn, JsonLinesSink, Lifecycle,
    MetadataStore, MetadataUpdate, Project, ProgressStore, ProgressUpdate, ResearchRequest,
    ResearchSession, SessionOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "research-agent")]
#[command(about = "Run research sessions with a gated progress record and follow-up messages")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a topic, then serve follow-up messages until stopped
    Run {
        /// Research topic
        topic: String,

        /// Project directory (created if missing)
        project_dir: PathBuf,

        #[command(flatten)]
        llm: LlmArgs,

        /// Research depth: quick, standard, deep or unlimited
        #[arg(long, default_value = "standard")]
        depth: String,

        /// Report style: comprehensive, comparing or practical
        #[arg(long, default_value = "comprehensive")]
        style: String,

        /// Tool names to report as available (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,

        /// Skip the research turn and only serve follow-up messages
        #[arg(long)]
        resume: bool,
    },

    /// Serve follow-up messages for an existing project
    Loop {
        /// Project directory
        project_dir: PathBuf,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Classify diagnostic lines from stdin into activity events
    Classify {
        /// Project directory
        project_dir: PathBuf,

        /// Emit events without writing .activities.json
        #[arg(long)]
        no_store: bool,
    },

    /// Write the progress record, subject to the completion gate
    Progress {
        /// Project directory
        project_dir: PathBuf,

        /// Requested completion percentage (clamped to 0-100)
        #[arg(allow_negative_numbers = true)]
        percentage: i64,

        /// Short label of the current task
        task: String,

        /// Longer description of the current task
        description: String,

        /// Estimated minutes remaining
        #[arg(long)]
        eta: Option<i64>,

        /// Tasks to merge into the completed list (repeatable)
        #[arg(long = "completed")]
        completed: Vec<String>,
    },

    /// List local references in HTML documents that point at missing files
    CheckLinks {
        /// Project directory
        project_dir: PathBuf,
    },

    /// Write metadata.json for the research portal
    Metadata {
        /// Project directory
        project_dir: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        category: String,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value = "")]
        summary: String,
    },
}

#[derive(clap::Args)]
struct LlmArgs {
    /// LLM provider: claude, openai or ollama (default: from config)
    #[arg(long)]
    provider: Option<String>,

    /// Model name (default: from config, or the provider's default)
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        research_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("research-agent starting");

    match args.command {
        Command::Run {
            topic,
            project_dir,
            llm,
            depth,
            style,
            tools,
            resume,
        } => {
            std::fs::create_dir_all(&project_dir).with_context(|| {
                format!("failed to create project directory {}", project_dir.display())
            })?;
            let project = open_project(&project_dir)?;

            let llm_config = resolve_llm_config(&config, &llm)?;
            let mut request = ResearchRequest::new(topic);
            request.provider = llm_config.provider.as_str().to_string();
            request.model = llm_config.model.clone();
            request.depth = Depth::parse_lenient(&depth);
            request.style = Style::parse_lenient(&style);
            request.tools = tools;
            request.resume = resume;

            run_session(&project, &config, &llm_config, &request)
        }
        Command::Loop { project_dir, llm } => {
            let project = open_project(&project_dir)?;
            let llm_config = resolve_llm_config(&config, &llm)?;

            let mut request = ResearchRequest::new(resume_topic(&project));
            request.provider = llm_config.provider.as_str().to_string();
            request.model = llm_config.model.clone();
            request.resume = true;

            run_session(&project, &config, &llm_config, &request)
        }
        Command::Classify {
            project_dir,
            no_store,
        } => {
            let project = open_project(&project_dir)?;
            let sink = JsonLinesSink::stdout();
            let store = (!no_store).then(|| ActivityStore::new(&project, &config.activities));
            let mut pipeline = ActivityPipeline::new(store, &sink);

            let stdin = std::io::stdin();
            let lines = pipeline
                .ingest_reader(stdin.lock())
                .context("failed to read diagnostic lines from stdin")?;
            tracing::info!(lines, "Classification finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Progress {
            project_dir,
            percentage,
            task,
            description,
            eta,
            completed,
        } => {
            let project = open_project(&project_dir)?;
            let store = ProgressStore::new(&project, &config.progress);
            let update = ProgressUpdate::new(percentage, task, description)
                .with_completed_tasks(completed)
                .with_eta(eta);

            let outcome = store.update(&update);
            println!("{}", outcome.summary());
            if !outcome.saved {
                bail!("failed to write {}", project.progress_path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckLinks { project_dir } => {
            let project = open_project(&project_dir)?;
            let missing = research_core::check_missing_files(project.root());

            if missing.is_empty() {
                println!("All local references resolve");
                return Ok(ExitCode::SUCCESS);
            }
            for pair in missing.pairs() {
                println!("{}", pair);
            }
            println!(
                "{} missing reference(s) in {} document(s)",
                missing.total(),
                missing.document_count()
            );
            Ok(ExitCode::FAILURE)
        }
        Command::Metadata {
            project_dir,
            title,
            description,
            category,
            tags,
            summary,
        } => {
            let project = open_project(&project_dir)?;
            let store = MetadataStore::new(&project);
            let metadata = store
                .write(MetadataUpdate {
                    title,
                    description,
                    category,
                    tags,
                    summary,
                })
                .context("failed to write metadata")?;
            println!("{}", format_metadata_saved(&metadata));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolve a project directory to an absolute path that must exist.
fn open_project(dir: &Path) -> Result<Project> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("project directory not found: {}", dir.display()))?;
    Ok(Project::new(root))
}

/// Merge CLI overrides into the configured LLM settings.
fn resolve_llm_config(config: &Config, args: &LlmArgs) -> Result<LlmConfig> {
    let provider = match args.provider.as_deref() {
        Some(name) => Some(name.parse::<LlmProvider>().map_err(anyhow::Error::msg)?),
        None => None,
    };

    let mut llm = match (&config.llm, provider) {
        (Some(configured), Some(p)) if configured.provider != p => {
            LlmConfig::new(p, p.default_model())
        }
        (Some(configured), _) => configured.clone(),
        (None, p) => {
            let p = p.unwrap_or(LlmProvider::Claude);
            LlmConfig::new(p, p.default_model())
        }
    };
    if let Some(model) = &args.model {
        llm.model = model.clone();
    }
    Ok(llm)
}

/// Topic used for the system prompt of a resumed session.
fn resume_topic(project: &Project) -> String {
    MetadataStore::new(project)
        .read()
        .parsed()
        .map(|m| m.title)
        .filter(|title| !title.trim().is_empty())
        .or_else(|| {
            project
                .root()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "research".to_string())
}

fn run_session(
    project: &Project,
    config: &Config,
    llm_config: &LlmConfig,
    request: &ResearchRequest,
) -> Result<ExitCode> {
    let sink = JsonLinesSink::stdout();

    let system = match request.system_prompt(Utc::now()) {
        Ok(system) => system,
        Err(e) => return report_startup_failure(&sink, e),
    };
    let mut llm = match HttpLlmTurn::new(llm_config) {
        Ok(llm) => llm.with_system(system),
        Err(e) => return report_startup_failure(&sink, e),
    };

    // Set up Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        s.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    tracing::info!(
        project = %project.root().display(),
        topic = %request.topic,
        resume = request.resume,
        "Starting session"
    );

    let mut session = ResearchSession::new(project, config, &sink).with_shutdown(shutdown);
    let outcome = session.run(request, &mut llm);

    match outcome {
        SessionOutcome::Completed(exit) | SessionOutcome::Resumed(exit) => {
            if exit.is_requested() {
                tracing::info!(exit = exit.as_str(), "Session stopped on request");
            } else {
                tracing::warn!(exit = exit.as_str(), "Session stopped");
                eprintln!("Message loop stopped: {}", exit.as_str());
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::Failed { error, error_type } => {
            tracing::error!(%error, %error_type, "Session failed");
            eprintln!("Session failed: {} (log: {})", error, log_file_path().display());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_startup_failure(sink: &dyn EventSink, e: research_core::Error) -> Result<ExitCode> {
    tracing::error!(error = %e, "Session could not start");
    eprintln!("Session could not start: {} (log: {})", e, log_file_path().display());
    sink.lifecycle(Lifecycle::Error {
        error: e.to_string(),
        error_type: e.kind().to_string(),
    });
    Ok(ExitCode::FAILURE)
}
