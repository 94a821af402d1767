//! Context storage in a single SQLite database

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;

use super::{ContextStorage, SCHEMA};

pub struct SqliteContextStorage {
    conn: Connection,
}

impl SqliteContextStorage {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening context database {}", path.display()))?;
        let storage = Self { conn };
        storage.init_schema()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let storage = Self {
            conn: Connection::open_in_memory()?,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

impl ContextStorage for SqliteContextStorage {
    fn store(&self, context_id: &str, jsonl: &str) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO contexts (context_id, data, stored_at)
               VALUES (?, ?, datetime('now'))
               ON CONFLICT(context_id) DO UPDATE SET
                   data = excluded.data,
                   stored_at = datetime('now')"#,
            params![context_id, jsonl],
        )?;
        Ok(())
    }

    fn fetch(&self, context_id: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT data FROM contexts WHERE context_id = ?",
            params![context_id],
            |row| row.get(0),
        );

        match result {
            Ok(data) => Ok(Some(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, context_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM contexts WHERE context_id = ?",
            params![context_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
