//! chronostore admin CLI
//!
//! Inspects and manages a local mapped-file store: list symbols, versions
//! and snapshots, create and delete snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use chronostore::{open_storage, BackendConfig, LmdbConfig, VersionStore};

/// chronostore admin tool
#[derive(Parser, Debug)]
#[command(name = "chrono-cli")]
#[command(about = "Versioned object store admin tool")]
#[command(version)]
struct Args {
    /// Path of the mapped-file store
    #[arg(short, long, default_value = "./chronostore.dat")]
    path: String,

    /// Maximum map size in MB
    #[arg(short, long, default_value = "128")]
    map_size_mb: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List symbols with a live current version
    Symbols,

    /// List versions, optionally for one symbol
    Versions {
        /// Restrict to one symbol
        symbol: Option<String>,
    },

    /// List snapshots and their metadata
    Snapshots,

    /// Create a snapshot of all current versions
    Snapshot {
        /// Snapshot name (unique among live snapshots)
        name: String,

        /// Metadata entries as key=value
        #[arg(short = 'M', long = "meta")]
        metadata: Vec<String>,
    },

    /// Delete a snapshot, removing versions it alone kept alive
    DeleteSnapshot {
        /// Snapshot name
        name: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chronostore=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = BackendConfig::Lmdb(
        LmdbConfig::new(&args.path).map_size(args.map_size_mb * 1024 * 1024),
    );
    let storage = match open_storage(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };
    let store = VersionStore::new(Arc::clone(&storage));

    if let Err(e) = run(&store, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(store: &VersionStore, command: Command) -> chronostore::Result<()> {
    match command {
        Command::Symbols => {
            for symbol in store.list_symbols()? {
                println!("{symbol}");
            }
        }
        Command::Versions { symbol } => {
            for info in store.list_versions(symbol.as_deref(), None)? {
                let snaps = if info.snapshots.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", info.snapshots.join(", "))
                };
                println!(
                    "{}  v{}  ts={}{}",
                    info.symbol, info.version_id, info.created_ts, snaps
                );
            }
        }
        Command::Snapshots => {
            for (name, metadata) in store.list_snapshots()? {
                let meta: Vec<String> =
                    metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!("{name}  {}", meta.join(" "));
            }
        }
        Command::Snapshot { name, metadata } => {
            let mut meta = BTreeMap::new();
            for entry in metadata {
                match entry.split_once('=') {
                    Some((k, v)) => {
                        meta.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        meta.insert(entry, String::new());
                    }
                }
            }
            store.snapshot(&name, meta, BTreeMap::new(), &[])?;
            println!("created snapshot {name}");
        }
        Command::DeleteSnapshot { name } => {
            store.delete_snapshot(&name)?;
            println!("deleted snapshot {name}");
        }
    }
    Ok(())
}
