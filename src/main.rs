//! # askdocs CLI
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs extract` | Read a batch and print per-file status, chunk count and corpus |
//! | `askdocs ask` | Read a batch and ask the model one question about it |
//! | `askdocs serve` | Start the HTTP form front end |
//! | `askdocs formats` | List supported extensions |
//!
//! Exit codes: `0` success, `1` configuration or acquisition failure,
//! `2` the model call failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askdocs::config::{self, ApiKey, Config};
use askdocs::connector_drive::DriveSync;
use askdocs::connector_upload::Upload;
use askdocs::connector_zip;
use askdocs::dispatch::DocumentFormat;
use askdocs::llm::GeminiClient;
use askdocs::progress::{ProgressMode, ProgressReporter};
use askdocs::query::{QueryOutcome, QueryState};
use askdocs::server::{self, AppState};
use askdocs::session::Session;
use askdocs::traits::FolderSync;

/// Ask a generative model about a batch of documents.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "Extract text from PDF, Office and text files and ask a generative model about it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when it
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal,
    /// `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass and print what was read.
    Extract {
        #[command(flatten)]
        source: SourceArgs,

        /// Print only the per-file status and summary, not the corpus.
        #[arg(long)]
        quiet: bool,
    },

    /// Run one ingestion pass, then ask the model a question about it.
    Ask {
        #[command(flatten)]
        source: SourceArgs,

        /// The question, passed to the model as typed.
        #[arg(long, short)]
        question: String,
    },

    /// Start the HTTP form front end on `[server].bind`.
    Serve,

    /// List supported file extensions and their readers.
    Formats,
}

/// Where the batch comes from. Exactly one is required.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Local files, read in the order given.
    #[arg(long, num_args = 1..)]
    files: Vec<PathBuf>,

    /// A `.zip` archive; every file inside (recursively) is read.
    #[arg(long)]
    zip: Option<PathBuf>,

    /// A Drive folder id or folder URL.
    #[arg(long)]
    folder: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Cli {
        config: config_path,
        progress: progress_mode,
        command,
    } = cli;
    let setup = || -> anyhow::Result<(Config, Box<dyn ProgressReporter>)> {
        let cfg = config::load_config(&config_path)?;
        let progress = progress_mode
            .unwrap_or_else(ProgressMode::default_for_tty)
            .reporter();
        Ok((cfg, progress))
    };

    match command {
        Commands::Formats => {
            print_formats();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Extract { source, quiet } => {
            let (cfg, progress) = setup()?;
            let mut session = Session::new(&cfg);
            acquire(&mut session, &cfg, &source, progress.as_ref()).await?;
            print_corpus(&session, quiet);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ask { source, question } => {
            let (cfg, progress) = setup()?;
            // Fail before any work when the credential is missing.
            let key = ApiKey::from_env(&cfg.model.api_key_env)?;
            let model = GeminiClient::new(&cfg.model, key)?;

            let mut session = Session::new(&cfg);
            acquire(&mut session, &cfg, &source, progress.as_ref()).await?;
            if let Some(notice) = session.notice() {
                eprintln!("{}", notice);
            }
            if !session.can_ask() {
                eprintln!("No document text was extracted; the question was not sent.");
                return Ok(ExitCode::FAILURE);
            }

            match session.ask(&model, &question, progress.as_ref()).await {
                QueryState::Resolved(outcome) => match outcome {
                    QueryOutcome::Failed(_) => {
                        eprintln!("{}", outcome.render());
                        Ok(ExitCode::from(2))
                    }
                    _ => {
                        println!("{}", outcome.render());
                        Ok(ExitCode::SUCCESS)
                    }
                },
                QueryState::Idle | QueryState::InFlight => {
                    eprintln!("The question is empty; nothing was sent.");
                    Ok(ExitCode::from(2))
                }
            }
        }
        Commands::Serve => {
            let (cfg, _) = setup()?;
            let key = ApiKey::from_env(&cfg.model.api_key_env)?;
            let model = Arc::new(GeminiClient::new(&cfg.model, key)?);
            let drive = drive_client(&cfg)?.map(|d| Arc::new(d) as Arc<dyn FolderSync>);
            if drive.is_none() {
                tracing::warn!(
                    var = %cfg.drive.api_key_env,
                    "no Drive API key; folder sync disabled"
                );
            }
            let state = AppState::new(&cfg, model, drive);
            server::run_server(&cfg, state).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Drive client when its key is present, `None` otherwise.
fn drive_client(cfg: &Config) -> anyhow::Result<Option<DriveSync>> {
    match ApiKey::from_env(&cfg.drive.api_key_env) {
        Ok(key) => Ok(Some(DriveSync::new(&cfg.drive, key)?)),
        Err(_) => Ok(None),
    }
}

async fn acquire(
    session: &mut Session,
    cfg: &Config,
    source: &SourceArgs,
    progress: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    if !source.files.is_empty() {
        let uploads = source
            .files
            .iter()
            .map(|p| Upload::from_path(p))
            .collect::<Result<Vec<_>, _>>()?;
        session.load_uploads(&uploads, progress)?;
    } else if let Some(zip) = &source.zip {
        let pass = connector_zip::ingest_archive_path(zip, progress);
        session.apply_pass(pass, progress)?;
    } else if let Some(folder) = &source.folder {
        let key = ApiKey::from_env(&cfg.drive.api_key_env)
            .context("A Drive API key is required for --folder")?;
        let drive = DriveSync::new(&cfg.drive, key)?;
        session.load_folder(&drive, folder, progress).await?;
    }
    Ok(())
}

fn print_corpus(session: &Session, quiet: bool) {
    let corpus = session.corpus();
    for f in corpus.files() {
        println!(
            "{:<8} {:<5} {:>9}  {}",
            f.status(),
            f.format.map(DocumentFormat::label).unwrap_or("-"),
            f.chars,
            f.name
        );
    }
    println!(
        "files: {}  failed: {}  skipped: {}  chars: {}  chunks: {}",
        corpus.files().len(),
        corpus.failed_count(),
        corpus.skipped_count(),
        corpus.char_count(),
        session.chunk_count()
    );
    if !quiet {
        println!("---");
        println!("{}", corpus.text());
    }
}

fn print_formats() {
    for format in DocumentFormat::ALL {
        let exts: Vec<String> = format
            .extensions()
            .iter()
            .map(|e| format!(".{}", e))
            .collect();
        println!("{:<12} {}", exts.join(" "), format.description());
    }
    println!("{:<12} archive of any of the above (--zip)", ".zip");
}
