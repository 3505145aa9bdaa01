//! Persistence of the "last indexed" refresh cursor.

use crate::error::{IndexError, IndexResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Where the last successful pass left off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCursor {
    /// Instant the pass started.
    pub last_indexed: DateTime<Utc>,
    /// Items that pass indexed whose last change is exactly `last_indexed`.
    /// They are not counted again until they change.
    pub boundary: BTreeSet<String>,
}

impl RefreshCursor {
    pub fn at(last_indexed: DateTime<Utc>) -> Self {
        Self {
            last_indexed,
            boundary: BTreeSet::new(),
        }
    }

    /// Whether an item changed at `last_change` was already indexed by the
    /// pass that wrote this cursor.
    pub fn covers(&self, uid: &str, last_change: DateTime<Utc>) -> bool {
        last_change < self.last_indexed
            || (last_change == self.last_indexed && self.boundary.contains(uid))
    }
}

pub trait CursorStore: Send + Sync {
    /// `None` when no refresh has completed yet.
    fn load(&self) -> IndexResult<Option<RefreshCursor>>;

    fn store(&self, cursor: &RefreshCursor) -> IndexResult<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    last_indexed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    boundary: BTreeSet<String>,
}

/// Keeps the cursor in a small JSON file, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> IndexResult<Option<RefreshCursor>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(IndexError::io(&self.path, err)),
        };
        let state: IndexState = serde_json::from_str(&raw)?;
        Ok(state.last_indexed.map(|last_indexed| RefreshCursor {
            last_indexed,
            boundary: state.boundary,
        }))
    }

    fn store(&self, cursor: &RefreshCursor) -> IndexResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| IndexError::io(parent, err))?;
        }
        let state = IndexState {
            last_indexed: Some(cursor.last_indexed),
            boundary: cursor.boundary.clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json).map_err(|err| IndexError::io(&temp, err))?;
        fs::rename(&temp, &self.path).map_err(|err| IndexError::io(&self.path, err))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<RefreshCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> IndexResult<Option<RefreshCursor>> {
        Ok(self.cursor.lock().clone())
    }

    fn store(&self, cursor: &RefreshCursor) -> IndexResult<()> {
        *self.cursor.lock() = Some(cursor.clone());
        Ok(())
    }
}
