use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rustydocqa::{
    config::Config,
    extraction::{DocumentFormat, TextExtractor},
    logging::{self, Console},
    processing::{ProcessingService, chunk_text},
    session::SessionId,
};

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Extract text from documents and ask questions about them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the text extracted from a PDF, image, or CSV file.
    Extract { file: PathBuf },
    /// Print the chunks the indexer would embed for a file.
    Chunks {
        file: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Answer a single question about a file.
    Ask { file: PathBuf, question: String },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing_with(Console::Stderr, "warn");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Extract { file } => {
                let text = extract(&file, &extraction_config()).await?;
                println!("{text}");
                Ok(())
            }
            Command::Chunks {
                file,
                chunk_size,
                overlap,
            } => {
                let config = extraction_config();
                let text = extract(&file, &config).await?;
                let chunks = chunk_text(
                    &text,
                    chunk_size.unwrap_or(config.text_splitter_chunk_size),
                    overlap.unwrap_or(config.text_splitter_chunk_overlap),
                )?;
                for chunk in chunks {
                    println!(
                        "--- chunk {} ({} chars) ---\n{}",
                        chunk.position,
                        chunk.text.chars().count(),
                        chunk.text
                    );
                }
                Ok(())
            }
            Command::Ask { file, question } => ask(&file, &question).await,
        }
    })
}

/// Extraction needs no credentials, so a missing `API_KEY` or other gap falls back to defaults.
fn extraction_config() -> Config {
    Config::from_env().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Using default configuration for extraction");
        Config::default()
    })
}

async fn extract(file: &Path, config: &Config) -> Result<String> {
    let filename = file_name(file)?;
    let format = DocumentFormat::from_filename(&filename);
    if !format.is_supported() {
        bail!("unsupported file format: {filename} (expected .pdf, .png, .jpg, .jpeg, or .csv)");
    }
    TextExtractor::from_config(config)
        .extract(file, format)
        .await
        .with_context(|| format!("failed to extract text from {}", file.display()))
}

async fn ask(file: &Path, question: &str) -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let service = ProcessingService::new(&config)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let session = SessionId::default();
    service
        .upload_document(&session, &file_name(file)?, &bytes)
        .await?;
    let outcome = service.ask(&session, question).await?;
    println!("{}", outcome.answer);
    Ok(())
}

fn file_name(file: &Path) -> Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", file.display()))
}
