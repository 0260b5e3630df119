//! rdb CLI
//!
//! Command-line interface for inspecting and editing an rdb directory.

use std::ops::ControlFlow;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rdb::wal::WalRecovery;
use rdb::{Config, Engine, Result};

/// rdb CLI
#[derive(Parser, Debug)]
#[command(name = "rdb-cli")]
#[command(about = "CLI for the rdb embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./rdb_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all entries in key order
    List {
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check the WAL without modifying it
    Verify,

    /// Flush and merge all SSTables into one
    Compact,
}

fn main() -> ExitCode {
    rdb::logging::init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let read_only = matches!(
        args.command,
        Commands::Get { .. } | Commands::List { .. } | Commands::Verify
    );

    if let Commands::Verify = args.command {
        let wal_path = std::path::Path::new(&args.data_dir).join(Engine::WAL_FILENAME);
        if !wal_path.exists() {
            println!("no WAL at {}", wal_path.display());
            return Ok(());
        }
        let report = WalRecovery::verify(&wal_path)?;
        println!("entries:   {}", report.entries_recovered);
        println!("corrupted: {}", report.entries_corrupted);
        println!("last lsn:  {}", report.last_lsn);
        println!("torn tail: {}", report.was_truncated);
        return Ok(());
    }

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .read_only(read_only)
        .build();
    let engine = Engine::open(config)?;

    match &args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::List { limit } => {
            let mut remaining = limit.unwrap_or(usize::MAX);
            engine.for_each(|key, value| {
                if remaining == 0 {
                    return ControlFlow::Break(());
                }
                remaining -= 1;
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                );
                ControlFlow::Continue(())
            })?;
        }
        Commands::Compact => {
            engine.compact()?;
            println!("OK ({} sstable(s))", engine.sstable_count());
        }
        Commands::Verify => {}
    }

    if !engine.is_read_only() {
        engine.close()?;
    }
    Ok(())
}
