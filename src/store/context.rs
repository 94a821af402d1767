//! Storage for merged context documents, keyed by context id

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use super::{write_atomic, SqliteContextStorage};
use crate::config::StorageBackend;
use crate::paths::Layout;

/// Capability set for holding merged conversations.
///
/// Capture and the CLI only see this trait, so a
/// content-addressed or remote backend can be dropped in later.
pub trait ContextStorage {
    /// Store (or replace) the JSONL document for `context_id`
    fn store(&self, context_id: &str, jsonl: &str) -> Result<()>;

    /// Fetch a stored document, `None` if unknown
    fn fetch(&self, context_id: &str) -> Result<Option<String>>;

    fn exists(&self, context_id: &str) -> Result<bool>;
}

/// One `<context_id>.jsonl` file per context
pub struct FileContextStorage {
    dir: PathBuf,
}

impl FileContextStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, context_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", context_id))
    }
}

impl ContextStorage for FileContextStorage {
    fn store(&self, context_id: &str, jsonl: &str) -> Result<()> {
        let path = self.path(context_id);
        write_atomic(&path, jsonl.as_bytes())
            .with_context(|| format!("storing context {}", path.display()))
    }

    fn fetch(&self, context_id: &str) -> Result<Option<String>> {
        let path = self.path(context_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("reading context {}", path.display()))?;
        Ok(Some(data))
    }

    fn exists(&self, context_id: &str) -> Result<bool> {
        Ok(self.path(context_id).is_file())
    }
}

/// Open the backend selected in the configuration
pub fn open_context_storage(
    backend: StorageBackend,
    layout: &Layout,
) -> Result<Box<dyn ContextStorage>> {
    Ok(match backend {
        StorageBackend::File => Box::new(FileContextStorage::new(layout.contexts_dir())),
        StorageBackend::Sqlite => Box::new(SqliteContextStorage::open(&layout.contexts_db())?),
    })
}
