//! CLI for the trackfetch download orchestrator.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use trackfetch_core::config;
use trackfetch_core::store::LibraryDb;

use commands::{
    run_add, run_cancel, run_pause, run_resume, run_retry, run_scheduler, run_status,
};

/// Top-level CLI for trackfetch.
#[derive(Debug, Parser)]
#[command(name = "trackfetch")]
#[command(about = "trackfetch: fetch tracks from the peer network into your library", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Register a track and queue a download for it.
    Add {
        /// Track artist.
        artist: String,
        /// Track title.
        title: String,
        /// Album, if known.
        #[arg(long)]
        album: Option<String>,
        /// Higher priorities are downloaded first.
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        priority: i32,
    },

    /// Run the worker loop until every pending download is done.
    Run {
        /// Download up to N tracks concurrently (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show status of all downloads.
    Status,

    /// Pause everything, or one download by ID.
    Pause {
        /// Download identifier; omit to pause the running scheduler.
        id: Option<String>,
    },

    /// Resume everything, or one paused download by ID.
    Resume {
        /// Download identifier; omit to resume the running scheduler.
        id: Option<String>,
    },

    /// Cancel a download by its ID.
    Cancel {
        /// Download identifier.
        id: String,
    },

    /// Re-queue a failed download that has retries left.
    Retry {
        /// Download identifier.
        id: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = LibraryDb::open_default().await?;

        match cli.command {
            CliCommand::Add {
                artist,
                title,
                album,
                priority,
            } => run_add(&db, &cfg, &artist, &title, album, priority).await?,
            CliCommand::Run { jobs } => run_scheduler(&db, &cfg, jobs).await?,
            CliCommand::Status => run_status(&db).await?,
            CliCommand::Pause { id } => run_pause(&db, &cfg, id).await?,
            CliCommand::Resume { id } => run_resume(&db, &cfg, id).await?,
            CliCommand::Cancel { id } => run_cancel(&db, &cfg, &id).await?,
            CliCommand::Retry { id } => run_retry(&db, &cfg, &id).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
