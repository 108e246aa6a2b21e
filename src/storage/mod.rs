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


//! Durable storage for download state
//!
//! The download queue and the completed-downloads metadata are stored as
//! whole JSON documents under fixed keys. On device the documents live in a
//! small SQLite database managed with sqlx.
//!
//! # Usage Example
//! ```no_run
//! use quran_audio_core::storage::{Database, KeyValueStore, SqliteKeyValueStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./downloads.db").await?;
//! let store = SqliteKeyValueStore::new(db);
//! store.save("downloads.queue", "[]").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod kv;
pub mod migrations;

// Re-export commonly used types
pub use database::Database;
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
