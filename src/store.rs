//! Snapshot Persistence
//!
//! The controller's durable state (history, edge, platform totals, last
//! round number) is written after every settlement and read back on start.
//!
//! ```text
//! RoundController ──snapshot()──> SnapshotStore::save
//!        ^                              │
//!        └──restore()── SnapshotStore::load
//! ```
//!
//! [`FileStore`] picks the encoding from the file extension: `.bin` is
//! bincode, anything else is pretty-printed JSON. Writes go to a temporary
//! file that is synced and then renamed over the target.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::derive::HouseEdge;
use crate::game::history::HistoryRecord;
use crate::game::state::RoundId;
use crate::game::tick::PlatformStats;

/// Default snapshot name.
pub const STORAGE_KEY: &str = "skyhigh_aviator_pro_db_v1";

/// Errors from snapshot persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding or decoding failed.
    #[error("bincode error: {0}")]
    Bincode(String),
}

/// Durable controller state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Settled rounds, newest first.
    pub history: Vec<HistoryRecord>,
    /// Edge in effect.
    pub house_edge: HouseEdge,
    /// Platform totals.
    pub stats: PlatformStats,
    /// Last round number handed out.
    pub last_round: RoundId,
}

/// Snapshot storage backend.
pub trait SnapshotStore: Send {
    /// Load the stored snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Replace the stored snapshot.
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Snapshot encoding on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Pretty-printed JSON.
    Json,
    /// bincode.
    Bincode,
}

impl Encoding {
    /// `.bin` selects bincode, everything else JSON.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => Encoding::Bincode,
            _ => Encoding::Json,
        }
    }
}

/// File-backed store.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    encoding: Encoding,
}

impl FileStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let encoding = Encoding::for_path(&path);
        Self { path, encoding }
    }

    /// `<dir>/skyhigh_aviator_pro_db_v1.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", STORAGE_KEY)))
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoding chosen for the target.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>, StoreError> {
        match self.encoding {
            Encoding::Json => Ok(serde_json::to_vec_pretty(snapshot)?),
            Encoding::Bincode => {
                bincode::serialize(snapshot).map_err(|e| StoreError::Bincode(e.to_string()))
            }
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Snapshot, StoreError> {
        match self.encoding {
            Encoding::Json => Ok(serde_json::from_slice(data)?),
            Encoding::Bincode => {
                bincode::deserialize(data).map_err(|e| StoreError::Bincode(e.to_string()))
            }
        }
    }
}

impl SnapshotStore for FileStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.decode(&data).map(Some)
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let data = self.encode(snapshot)?;
        let temp_path = self.path.with_extension("tmp");

        {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &self.path)?;

        debug!(
            "Saved snapshot ({} records, {} bytes) to {}",
            snapshot.history.len(),
            data.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-memory store (testing, or running without persistence).
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    snapshot: Option<Snapshot>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot saved.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshot.clone())
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshot = Some(snapshot.clone());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::multiplier::Multiplier;
    use crate::game::history::testing::{organic_record, with_crash_point};

    fn sample() -> Snapshot {
        Snapshot {
            history: vec![
                organic_record(2, "second"),
                with_crash_point(organic_record(1, "first"), Multiplier::from_hundredths(250)),
            ],
            house_edge: HouseEdge::new(4.5).unwrap(),
            stats: PlatformStats {
                total_wagered: 5000,
                total_paid_out: 4100,
            },
            last_round: RoundId(2),
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        assert!(store.load().unwrap().is_none());
        assert!(store.path().ends_with("skyhigh_aviator_pro_db_v1.json"));
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::in_dir(dir.path());
        assert_eq!(store.encoding(), Encoding::Json);

        let snapshot = sample();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));

        // Human-readable on disk, no temp file left behind
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"server_seed\": \"second\""));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_bincode_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("state.bin"));
        assert_eq!(store.encoding(), Encoding::Bincode);

        let snapshot = sample();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        let snapshot = sample();
        store.save(&snapshot).unwrap();
        assert_eq!(store.snapshot(), Some(&snapshot));
    }
}
