use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rust_doc_qa::api::{self, AppState};
use rust_doc_qa::commands::ingest::{self, IngestOptions};
use rust_doc_qa::commands::query::{self, RunOptions};
use rust_doc_qa::commands::{manifest, openai_api_key, Terminal};
use rust_doc_qa::config::{DeviceType, Settings, DEFAULT_MAX_LENGTH};
use rust_doc_qa::database::Database;
use rust_doc_qa::manifest::ManifestError;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask questions about your own documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, split and embed the source documents into the vector store
    Ingest {
        /// Device to run on (default: cuda when available, else cpu)
        #[arg(long, value_enum)]
        device_type: Option<DeviceType>,

        /// Use OpenAI embeddings instead of the local embedding server
        #[arg(short = 'o', long)]
        openai: bool,

        /// Folder to ingest; asked interactively when omitted
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },
    /// Interactive question answering over the ingested documents
    Run {
        #[arg(long, value_enum)]
        device_type: Option<DeviceType>,

        /// Use OpenAI for embeddings and answers
        #[arg(short = 'o', long)]
        openai: bool,

        #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
        max_length: usize,

        /// Show source documents without asking
        #[arg(long)]
        show_sources: bool,

        #[arg(long)]
        model_id: Option<String>,

        /// Model file name, or `None` for a full model
        #[arg(long)]
        model_basename: Option<String>,

        /// Trim old chat history so prompts stay within --max-length characters
        #[arg(long)]
        truncate_history: bool,
    },
    /// Check or inspect a requirements manifest
    Manifest {
        #[command(subcommand)]
        action: ManifestAction,
    },
    /// Serve the question answering API over HTTP
    Serve {
        #[arg(long, default_value = "3000")]
        port: u16,

        #[arg(long, value_enum)]
        device_type: Option<DeviceType>,

        #[arg(short = 'o', long)]
        openai: bool,

        #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
        max_length: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ManifestAction {
    /// Report unparseable lines, platform gaps and overlaps, and conflicting pins
    Check {
        file: PathBuf,

        /// Target platform as os/machine or `host`; repeatable (default: linux, windows and macOS)
        #[arg(long = "platform")]
        platforms: Vec<String>,
    },
    /// List sections and the entries that apply on each platform
    Show {
        file: PathBuf,

        #[arg(long = "platform")]
        platforms: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Server error: {0}")]
    Server(String),
    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}:{} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match execute(cli.command, &settings).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Runs one subcommand. `Ok(false)` means it finished but found problems.
async fn execute(command: Command, settings: &Settings) -> Result<bool, AppError> {
    match command {
        Command::Ingest {
            device_type,
            openai,
            source_dir,
        } => {
            let mut terminal = Terminal::new()?;
            let options = IngestOptions {
                device_type: device_type.unwrap_or_else(DeviceType::detect),
                openai,
                source_dir,
            };
            ingest::run(settings, options, &mut terminal).await?;
            Ok(true)
        }
        Command::Run {
            device_type,
            openai,
            max_length,
            show_sources,
            model_id,
            model_basename,
            truncate_history,
        } => {
            let mut terminal = Terminal::new()?;
            let options = RunOptions {
                device_type: device_type.unwrap_or_else(DeviceType::detect),
                openai,
                max_length,
                show_sources,
                model_id,
                model_basename,
                truncate_history,
            };
            query::run(settings, options, &mut terminal).await?;
            Ok(true)
        }
        Command::Manifest { action } => match action {
            ManifestAction::Check { file, platforms } => Ok(manifest::check(&file, &platforms)?),
            ManifestAction::Show { file, platforms } => {
                manifest::show(&file, &platforms)?;
                Ok(true)
            }
        },
        Command::Serve {
            port,
            device_type,
            openai,
            max_length,
        } => {
            serve(settings, port, device_type.unwrap_or_else(DeviceType::detect), openai, max_length).await?;
            Ok(true)
        }
    }
}

async fn serve(
    settings: &Settings,
    port: u16,
    device_type: DeviceType,
    openai: bool,
    max_length: usize,
) -> Result<(), AppError> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .map_err(|e| AppError::Server(format!("Invalid port {}: {}", port, e)))?;

    let openai_key = if openai {
        let mut terminal = Terminal::new()?;
        Some(openai_api_key(&mut terminal)?)
    } else {
        None
    };

    let qa = query::build_chain(
        settings,
        device_type,
        max_length,
        openai_key.as_deref(),
        (settings.model_id.clone(), settings.model_basename.clone()),
    )
    .await?
    .with_history_limit(max_length);
    let db = Database::new(settings.ledger_path())
        .await
        .map_err(|e| AppError::Server(format!("Failed to open ledger: {}", e)))?;

    let app = api::create_api(AppState::new(qa, Some(db)));

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
    log::info!("Serving on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    Ok(())
}
