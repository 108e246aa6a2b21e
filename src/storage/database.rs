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


//! Database connection and management
//!
//! # Database Location
//! - Desktop (macOS): ~/Library/Application Support/QuranAudio/downloads.db
//! - Desktop (Linux): ~/.local/share/QuranAudio/downloads.db
//! - Android: app-specific data directory (context.getDatabasePath())
//! - iOS: app-specific documents directory
//!
//! # SQLite Configuration
//! - WAL mode so UI reads never block a queue write
//! - Normal synchronous mode
//! - Busy timeout for writes racing a checkpoint

use crate::error::{CoreError, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Database manager - handles connection pooling and migrations
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory databases
}

impl Database {
    /// Create new database connection with migrations
    ///
    /// # Arguments
    /// * `database_path` - Path to the queue database (created if it doesn't exist)
    ///
    /// # Example
    /// ```rust,no_run
    /// # use quran_audio_core::storage::Database;
    /// # async fn example() -> quran_audio_core::Result<()> {
    /// let db = Database::new("/tmp/downloads.db").await?;
    /// assert!(db.quick_check().await?);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns error if:
    /// - Parent directory doesn't exist and can't be created
    /// - Database file can't be opened
    /// - Migrations fail
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::FileIoError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connection_string = format!("sqlite://{}?mode=rwc", path.display());
        let connect_opts = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_opts)
            .await?;

        let db = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.migrate().await?;

        Ok(db)
    }

    /// Create in-memory database for testing
    ///
    /// Limited to one connection, since every in-memory connection opens a
    /// separate database.
    ///
    /// # Errors
    /// Returns error if database creation or migration fails
    pub async fn new_in_memory() -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_opts)
            .await?;

        let db = Self { pool, path: None };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Safe to call repeatedly; applied migrations are skipped.
    ///
    /// # Errors
    /// Returns `CoreError::MigrationFailed` if a migration statement fails
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| CoreError::MigrationFailed(e.to_string()))?;

        Ok(())
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    ///
    /// Returns `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close database and release all connections
    ///
    /// Waits for checked-out connections to be returned first.
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Get default database path for desktop platforms
    ///
    /// # Returns
    /// - macOS: `~/Library/Application Support/QuranAudio/downloads.db`
    /// - Linux: `~/.local/share/QuranAudio/downloads.db`
    /// - Other: `./downloads.db`
    ///
    /// Falls back to the working directory when `HOME` is unset. Mobile
    /// builds always pass the path from the host app.
    pub fn get_default_path() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("QuranAudio")
                .join("downloads.db")
        }

        #[cfg(target_os = "linux")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("QuranAudio")
                .join("downloads.db")
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            PathBuf::from("./downloads.db")
        }
    }

    /// Quick integrity check
    ///
    /// Runs `PRAGMA quick_check`, which skips the index cross-checks of a
    /// full `integrity_check`.
    ///
    /// # Returns
    /// `true` if SQLite reports `ok`
    ///
    /// # Errors
    /// Returns error if the pragma cannot be executed
    pub async fn quick_check(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_one(&self.pool)
            .await?;

        Ok(result == "ok")
    }
}
