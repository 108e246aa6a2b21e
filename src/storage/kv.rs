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


//! Durable key/value storage for serialized download state

use crate::error::Result;
use crate::storage::Database;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::Row;
use std::collections::HashMap;

/// Key/value persistence used by the download queue
///
/// Values are whole JSON documents; every save replaces the previous value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store (table `KeyValueStore`)
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db: Database,
}

impl SqliteKeyValueStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM KeyValueStore WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO KeyValueStore (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

/// In-process store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, handy for assertions
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteKeyValueStore::new(db);

        assert_eq!(store.load("downloads.queue").await.unwrap(), None);

        store.save("downloads.queue", "[]").await.unwrap();
        assert_eq!(store.load("downloads.queue").await.unwrap().as_deref(), Some("[]"));

        store.save("downloads.queue", "[1]").await.unwrap();
        assert_eq!(store.load("downloads.queue").await.unwrap().as_deref(), Some("[1]"));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM KeyValueStore")
            .fetch_one(store.database().pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        store.save("a", "1").await.unwrap();
        assert_eq!(store.load("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b"), None);
    }
}
