use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drafter::notion::{MemoryStore, NotionClient};
use drafter::{Config, Document, Pipeline, Result, Submitter};

#[derive(Parser)]
#[command(name = "drafter")]
#[command(about = "Draft articles into a Notion database from Markdown")]
struct Cli {
    /// Config file layered over the built-in defaults
    #[arg(short, long, env = "DRAFTER_CONFIG", default_value = "drafter.toml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draft every page waiting in the prompt status
    Run,

    /// Print the block payload for a Markdown file
    Convert {
        /// Markdown file, or `-` for stdin
        input: PathBuf,
    },

    /// Submit a Markdown file as a new page, or replace an existing one
    Publish {
        input: PathBuf,

        #[arg(long)]
        title: Option<String>,

        /// Cover image URL
        #[arg(long)]
        cover: Option<String>,

        /// Status for the page (defaults to the configured draft status)
        #[arg(long)]
        status: Option<String>,

        /// Replace the body of this page instead of creating a new one
        #[arg(long, conflicts_with = "dry_run")]
        page: Option<String>,

        /// Submit to an in-memory store and print what would be sent
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a page's content as Markdown
    Extract { page_id: String },
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("drafter=debug")
    } else {
        EnvFilter::new("drafter=info")
    };

    // stdout carries command output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_markdown(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        Ok(io::read_to_string(io::stdin())?)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn convert(input: &Path) -> Result<()> {
    let blocks = drafter::parse(&read_markdown(input)?);
    let payload = drafter::payload::blocks_to_payload(&blocks);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let load = || Config::load(&cli.config);

    match cli.command {
        Command::Convert { input } => convert(&input)?,
        Command::Run => {
            let config = load()?;
            config.validate()?;
            let report = Pipeline::from_config(&config).run().await?;
            println!("{}", report.summary());
        }
        Command::Publish {
            input,
            title,
            cover,
            status,
            page,
            dry_run,
        } => {
            let config = load()?;
            let mut document = Document::from_markdown(&read_markdown(&input)?);
            if let Some(title) = title {
                document = document.with_title(title);
            }
            if let Some(url) = cover {
                document = document.with_cover(url);
            }

            let status = status.unwrap_or_else(|| config.pipeline.draft_status.clone());

            if dry_run {
                let store = MemoryStore::new();
                let page_id = Submitter::new(Arc::new(store.clone()))
                    .with_status(status)
                    .submit(&document)
                    .await?;
                let appends = store.append_sizes().await;
                info!(?appends, "dry run submitted");
                print!("{}", drafter::extract(&store, &page_id).await?);
                return Ok(());
            }

            config.validate_notion()?;
            let submitter =
                Submitter::new(Arc::new(NotionClient::new(&config.notion))).with_status(status);
            let page_id = match page {
                Some(page_id) => {
                    submitter.replace(&page_id, &document).await?;
                    page_id
                }
                None => submitter.submit(&document).await?,
            };
            info!(page_id = %page_id, "published");
            println!("{page_id}");
        }
        Command::Extract { page_id } => {
            let config = load()?;
            config.validate_notion()?;
            let store = NotionClient::new(&config.notion);
            print!("{}", drafter::extract(&store, &page_id).await?);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = execute(cli).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
