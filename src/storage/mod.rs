//! Storage layer for bubblewatch
//!
//! Provides the SQLite-backed key-value database shared by the keyword
//! history and settings stores.

pub mod database;

use crate::error::{BubbleError, Result};
use std::path::PathBuf;

pub use database::{Database, DbPool, DbStats};

/// Storage manager that owns the data directory layout
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create a new storage manager rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store_dir = base_path.join("store");
        std::fs::create_dir_all(&store_dir).map_err(|e| BubbleError::Io {
            source: e,
            context: format!("Failed to create store directory: {}", store_dir.display()),
        })?;

        let database = Database::new(&store_dir.join("db.sqlite"))?;

        Ok(Self {
            database,
            base_path,
        })
    }

    /// Directory holding the database files
    pub fn store_dir(&self) -> PathBuf {
        self.base_path.join("store")
    }
}

/// Format a byte count as a human-readable string
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_idx])
    }
}
