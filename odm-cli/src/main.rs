//! ODM operator console
//!
//! Opens a JSON snapshot written by `MemoryBackend::save_snapshot` and runs
//! one maintenance command against it:
//! 1. List collections and their sizes
//! 2. Show, find or remove documents
//! 3. Drop references whose target document is gone
//!
//! Usage:
//!   odm-cli --snapshot data.json collections
//!   odm-cli --snapshot data.json find user login a@example.com
//!   odm-cli --snapshot data.json drop-dangling --dry-run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use odm_cli::{
    document_json, drop_dangling_refs, find_documents, list_collections, parse_token,
    parse_value, remove_document, show_document,
};
use odm_model::OdmConfig;
use odm_storage::MemoryBackend;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "odm-cli")]
#[command(about = "Inspect and repair an ODM snapshot")]
struct Args {
    /// Snapshot file; falls back to `snapshot_path` from the config
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Config file
    #[arg(short, long, default_value = "odm.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List collections with their document counts
    Collections,
    /// Print one document as JSON
    Show {
        /// Reference in `collection:id` form
        reference: String,
    },
    /// Print documents whose field equals or contains a value
    Find {
        collection: String,
        field: String,
        value: String,
    },
    /// Remove one document
    Remove {
        /// Reference in `collection:id` form
        reference: String,
    },
    /// Clear references to documents that no longer exist
    DropDangling {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = OdmConfig::load_from(&args.config);
    let snapshot = args
        .snapshot
        .or(config.snapshot_path)
        .context("no snapshot given; pass --snapshot or set snapshot_path in the config")?;

    let backend = MemoryBackend::open(&snapshot)
        .with_context(|| format!("failed to open snapshot {}", snapshot.display()))?;
    info!("Opened snapshot {:?}", snapshot);

    match args.command {
        Command::Collections => {
            for info in list_collections(&backend)? {
                println!("{}\t{}", info.name, info.documents);
            }
        }
        Command::Show { reference } => {
            let doc = show_document(&backend, &parse_token(&reference)?)?;
            println!("{}", serde_json::to_string_pretty(&document_json(&doc))?);
        }
        Command::Find {
            collection,
            field,
            value,
        } => {
            let docs = find_documents(&backend, &collection, &field, &parse_value(&value))?;
            let rendered: Vec<_> = docs.iter().map(document_json).collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Remove { reference } => {
            remove_document(&backend, &parse_token(&reference)?)?;
            backend.save_snapshot(&snapshot)?;
        }
        Command::DropDangling { dry_run } => {
            let report = drop_dangling_refs(&backend, dry_run)?;
            println!(
                "scanned {} documents, updated {}, dropped {} references",
                report.documents_scanned, report.documents_updated, report.references_dropped
            );
            if !dry_run && report.documents_updated > 0 {
                backend.save_snapshot(&snapshot)?;
            }
        }
    }
    Ok(())
}
