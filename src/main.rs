//! # pdf-qa CLI (`pdfqa`)
//!
//! The `pdfqa` binary ingests one PDF into a workspace directory and
//! answers questions about it, either one command at a time or through the
//! JSON HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! pdfqa --config ./pdfqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfqa ingest <pdf>` | Extract, chunk and index a PDF, replacing the loaded one |
//! | `pdfqa ask "<question>"` | Answer a question about the loaded PDF |
//! | `pdfqa summary` | Summarize the loaded PDF |
//! | `pdfqa chunks` | List the chunks and their heading paths |
//! | `pdfqa images` | List the figure catalog |
//! | `pdfqa serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Text-layer extraction
//! pdfqa ingest paper.pdf
//!
//! # Use a bundle (content.md + images/) produced by an OCR tool
//! pdfqa ingest paper.pdf --bundle ./paper_bundle
//!
//! # Ask, highlighting key terms in the evidence
//! pdfqa ask "What is the main contribution?" --highlight
//!
//! # Machine-readable answer record
//! pdfqa ask "第3张图描述了什么？" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pdf_qa::answer::highlight;
use pdf_qa::config;
use pdf_qa::error::QaError;
use pdf_qa::extract::create_extractor;
use pdf_qa::models::Evidence;
use pdf_qa::server::run_server;
use pdf_qa::session::Session;

/// pdf-qa: ask questions about a PDF.
#[derive(Parser)]
#[command(name = "pdfqa", version, about = "Ask questions about a PDF")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./pdfqa.toml")]
    config: PathBuf,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF into the workspace.
    ///
    /// Wipes the previous document, extracts markdown and figures, builds
    /// the chunk index and persists everything for later commands.
    Ingest {
        /// Path to the PDF file.
        pdf: PathBuf,

        /// Use a pre-built extraction bundle (`content.md`, `images/`,
        /// optional `img_descriptions.md`) instead of running extraction.
        #[arg(long)]
        bundle: Option<PathBuf>,
    },

    /// Answer a question about the loaded PDF.
    ///
    /// Prints the answer followed by the evidence it was grounded on.
    Ask {
        /// The question, in any language.
        question: String,

        /// Print the full answer record as JSON.
        #[arg(long)]
        json: bool,

        /// Bold key terms in the printed evidence.
        #[arg(long)]
        highlight: bool,
    },

    /// Summarize the loaded PDF.
    Summary,

    /// List the chunks of the loaded PDF.
    Chunks,

    /// List the figures of the loaded PDF.
    Images,

    /// Start the JSON HTTP server.
    ///
    /// Binds to `[server].bind` and reloads the workspace document, if any.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { pdf, bundle } => {
            let extractor = create_extractor(&cfg.extraction, bundle.as_deref())?;
            let session = Session::from_config(cfg)?;
            let report = session.ingest(&pdf, extractor.as_ref()).await?;

            println!("Ingested {}", report.source);
            println!("  extractor:   {}", report.extractor);
            println!("  index:       {}", report.index_backend);
            println!("  chunks:      {}", report.chunks);
            println!("  images:      {}", report.images);
            if report.described_images > 0 {
                println!("  described:   {}", report.described_images);
            }
            println!("  fingerprint: {}", report.fingerprint);
        }
        Commands::Ask {
            question,
            json,
            highlight: bold,
        } => {
            let session = load_session(cfg).await?;
            let answer = session.ask(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
                return Ok(());
            }

            println!("{}", answer.answer);
            println!();
            match &answer.evidence {
                Evidence::Image { path, description } => {
                    println!("--- Evidence: {} ---", path);
                    println!("{}", description);
                }
                Evidence::Text { text } => {
                    println!("--- Evidence ---");
                    if bold {
                        println!("{}", highlight(text));
                    } else {
                        println!("{}", text);
                    }
                }
            }
        }
        Commands::Summary => {
            let session = load_session(cfg).await?;
            println!("{}", session.summary().await?);
        }
        Commands::Chunks => {
            let session = load_session(cfg).await?;
            let doc = session.current().await.ok_or(QaError::NoDocument)?;
            println!("{} ({} chunks)", doc.document.source, doc.chunks.len());
            for chunk in &doc.chunks {
                let path = chunk.heading_path().join(" > ");
                let preview: String = chunk.content.chars().take(60).collect();
                println!(
                    "  #{:<4} {:>6}..{:<6} [{}] {}",
                    chunk.index,
                    chunk.start,
                    chunk.end,
                    path,
                    preview.replace('\n', " ")
                );
            }
        }
        Commands::Images => {
            let session = load_session(cfg).await?;
            let doc = session.current().await.ok_or(QaError::NoDocument)?;
            if doc.images.is_empty() {
                println!("No images.");
                return Ok(());
            }
            println!("{:<8} {:<6} {:<6} {:<10} {:<12} PATH", "ORDINAL", "PAGE", "INDEX", "SIZE", "DESCRIBED");
            for record in doc.images.records() {
                println!(
                    "{:<8} {:<6} {:<6} {:<10} {:<12} {}",
                    record.ordinal,
                    record.page,
                    record.index,
                    format!("{}x{}", record.width, record.height),
                    if record.description.is_some() { "yes" } else { "no" },
                    record.path
                );
            }
        }
        Commands::Serve => {
            let session = Session::from_config(cfg)?;
            session.load_workspace().await?;
            run_server(Arc::new(session)).await?;
        }
    }

    Ok(())
}

/// A session with the workspace document loaded, or `NoDocument`.
async fn load_session(cfg: config::Config) -> anyhow::Result<Session> {
    let session = Session::from_config(cfg)?;
    if !session.load_workspace().await? {
        return Err(QaError::NoDocument.into());
    }
    Ok(session)
}
