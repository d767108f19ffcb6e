//! Storage layer for cheereading
//!
//! SQLite holds the catalog and reader activity; the similarity index lives
//! in its own file under `store/vectors`.

mod activity;
mod catalog;
pub mod database;

use crate::error::{CheerError, Result};
use std::path::PathBuf;

pub use catalog::{decode_vector, encode_vector};
pub use database::{Database, DbPool, DbStats};

/// Storage manager that lays out the data directory and opens the database
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create a new storage manager rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store = base_path.join("store");
        let vectors = store.join("vectors");

        std::fs::create_dir_all(&vectors).map_err(|e| CheerError::Io {
            source: e,
            context: format!("Failed to create vectors directory: {}", vectors.display()),
        })?;

        let database = Database::new(&store.join("db.sqlite"))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    /// Directory holding the database and index files
    pub fn store_dir(&self) -> PathBuf {
        self.base_path.join("store")
    }

    /// Path of a persisted similarity index
    pub fn index_path(&self, file_name: &str) -> PathBuf {
        self.store_dir().join("vectors").join(file_name)
    }

    /// Split into the database and the index path, for handing to services
    pub fn into_parts(self, index_file: &str) -> (Database, PathBuf) {
        let index_path = self.index_path(index_file);
        (self.database, index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_layout() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(storage.store_dir().join("db.sqlite").exists());
        assert!(storage.store_dir().join("vectors").is_dir());
        assert_eq!(
            storage.index_path("items.index"),
            temp_dir.path().join("store/vectors/items.index")
        );
    }
}
