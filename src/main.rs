mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use tame::assistant::Assistant;
use tame::config::{self, LoggingConfig, TameConfig};

#[derive(Parser)]
#[command(name = "tame", version, about = "Personalized multimodal assistant with double memory")]
struct Cli {
    /// Config file (default: ~/.tame/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model shortcut or full model id, overriding the config
    #[arg(long, short, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build memory from every concept's conversation history
    Build {
        /// Concepts processed in parallel; each concept stays on one worker
        #[arg(long, short, default_value_t = 1)]
        jobs: usize,
    },
    /// Answer every dataset question, skipping ones already in the results file
    Qa,
    /// Record one conversation turn for a concept
    Turn {
        concept: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Print a concept's memory context, optionally aligned to a question
    Context {
        concept: String,
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Identify which known concept an image shows
    Identify { image: PathBuf },
    /// Show a concept's static and dynamic memory
    Inspect { concept: String },
    /// Show per-concept memory counts
    Stats,
    /// Delete a concept's dynamic memory
    CleanDynamic { concept: String },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the CLIP model to ~/.tame/models/
    Download,
}

/// Stderr at the configured level, plus a debug-level file per run when `file_dir` is set.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (file_layer, guard) = match &logging.file_dir {
        Some(dir) => {
            let dir = config::expand_tilde(dir);
            std::fs::create_dir_all(&dir)?;
            let file_name = format!("tame-{}.log", chrono::Local::now().format("%m%d_%H%M%S"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, file_name));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TameConfig::load_from(path)?,
        None => TameConfig::load()?,
    };
    if let Some(model) = cli.model {
        config.model.model = model;
    }

    // Logs go to stderr so stdout carries only command output.
    let _guard = init_tracing(&config.logging)?;
    tracing::info!(model = %config.model_id(), short_name = %config.model_short_name(), "tame starting");

    match cli.command {
        Command::Build { jobs } => {
            let assistant = Assistant::from_config(config)?;
            cli::build::build(&assistant, jobs)?;
        }
        Command::Qa => {
            let assistant = Assistant::from_config(config)?;
            cli::qa::qa(&assistant)?;
        }
        Command::Turn {
            concept,
            question,
            answer,
            image,
        } => {
            let assistant = Assistant::from_config(config)?;
            cli::turn::turn(&assistant, &concept, &question, &answer, image.as_deref())?;
        }
        Command::Context {
            concept,
            question,
            image,
        } => {
            let assistant = Assistant::from_config(config)?;
            cli::turn::context(&assistant, &concept, question.as_deref(), image.as_deref())?;
        }
        Command::Identify { image } => {
            let assistant = Assistant::from_config(config)?;
            cli::turn::identify(&assistant, &image)?;
        }
        Command::Inspect { concept } => cli::inspect::inspect(&config, &concept)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::CleanDynamic { concept } => cli::inspect::clean_dynamic(&config, &concept)?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding)?;
            }
        },
    }

    Ok(())
}
