// Quran Audio Core - Offline recitation downloads for mobile
// Copyright (C) 2025 Quran Audio Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::Context;
use clap::{Parser, Subcommand};
use quran_audio_core::download::{Collaborators, NetworkStatus, WatchedNetworkPolicy};
use quran_audio_core::storage::{Database, SqliteKeyValueStore};
use quran_audio_core::{DownloadConfig, DownloadService, DownloadSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quran-audio-cli")]
#[command(about = "Quran audio CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// JSON file with download configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue database (defaults to the platform data directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Audio directory (overrides the config file)
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// Parallel downloads
    #[arg(short = 'j', long, default_value_t = 2)]
    jobs: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one surah for a reciter
    Download {
        /// Surah number (1-114)
        surah: u32,
        /// Reciter directory, e.g. Alafasy_128kbps
        variant: String,
    },
    /// Download every surah for a reciter
    DownloadAll {
        variant: String,
    },
    /// Show the queue and what is downloaded
    Status {
        variant: Option<String>,
    },
    /// Delete a downloaded surah, or the whole reciter without a surah
    Delete {
        variant: String,
        surah: Option<u32>,
    },
    /// Drop downloaded entries whose files are missing
    Verify {
        variant: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<DownloadConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => DownloadConfig::default(),
    };
    if let Some(dir) = &cli.audio_dir {
        config.audio_directory = dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let db_path = cli.db.clone().unwrap_or_else(Database::get_default_path);
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("failed to open queue database {}", db_path.display()))?;
    if !db.quick_check().await? {
        tracing::warn!(path = %db_path.display(), "queue database failed its integrity check");
    }
    // Only download commands go online; the rest leave restored items queued
    let status = match cli.command {
        Commands::Download { .. } | Commands::DownloadAll { .. } => NetworkStatus::wifi(),
        _ => NetworkStatus::offline(),
    };
    let network = Arc::new(WatchedNetworkPolicy::new(
        status,
        DownloadSettings { max_concurrent_downloads: cli.jobs, wifi_only_downloads: false },
    ));
    let collaborators = Collaborators::local(&config, Arc::new(SqliteKeyValueStore::new(db)), network)?;
    let service = DownloadService::new(config, collaborators);

    let _progress = service.on_progress(|p| println!("{}", p.display_string()));
    let _complete = service.on_complete(|p| println!("{}", p.display_string()));
    let _error = service.on_error(|p| eprintln!("{}", p.display_string()));

    service.start().await?;

    match cli.command {
        Commands::Download { surah, variant } => {
            let id = service.enqueue_resource(surah, &variant).await?;
            println!("Queued {}", id);
            service.wait_until_idle().await;
        }
        Commands::DownloadAll { variant } => {
            let added = service.enqueue_all(&variant).await?;
            println!("Queued {} surahs", added.len());
            service.wait_until_idle().await;
        }
        Commands::Status { variant } => {
            let items = service.queue_snapshot();
            if items.is_empty() {
                println!("Queue is empty");
            }
            for item in &items {
                let progress = quran_audio_core::download::DownloadProgress::from(item);
                println!("{}", progress.display_string());
            }
            let variants = match variant {
                Some(variant) => vec![variant],
                None => service.downloaded_variants(),
            };
            for variant in variants {
                let surahs = service.downloaded_resources(&variant);
                println!(
                    "{}: {} surahs downloaded, {} bytes",
                    variant,
                    surahs.len(),
                    service.storage_used(&variant)
                );
            }
        }
        Commands::Delete { variant, surah: Some(surah) } => {
            service.delete_resource(surah, &variant).await?;
            println!("Deleted surah {} for {}", surah, variant);
        }
        Commands::Delete { variant, surah: None } => {
            service.delete_all_for_variant(&variant).await?;
            println!("Deleted everything for {}", variant);
        }
        Commands::Verify { variant } => {
            let dropped = service.verify_downloads(&variant).await?;
            if dropped.is_empty() {
                println!("All downloads for {} are intact", variant);
            } else {
                println!("Dropped incomplete surahs: {:?}", dropped);
            }
        }
    }

    Ok(())
}
