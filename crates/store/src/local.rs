use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use snafu::ResultExt;

use crate::LocalStore;
use crate::error::{
    CreateStoreDirSnafu, ReplaceStoreFileSnafu, SerializeEntriesSnafu, StoreResult,
    WriteStoreFileSnafu,
};

/// Key the active exercise identifier is saved under.
pub const EXERCISE_ID_KEY: &str = "exerciseId";

/// Key the student's code snapshot is saved under.
pub const STUDENT_CODE_KEY: &str = "studentCode";

/// Exercise context required by the authenticated submit path.
///
/// Both values are read at submission time. A missing or blank value means
/// there is no usable context and the submission is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseContext {
    pub exercise_id: String,
    pub student_code: String,
}

impl ExerciseContext {
    pub fn load(store: &dyn LocalStore) -> Option<Self> {
        let exercise_id = non_blank(store.get(EXERCISE_ID_KEY)?)?;
        let student_code = non_blank(store.get(STUDENT_CODE_KEY)?)?;
        Some(Self {
            exercise_id,
            student_code,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Flat JSON key/value store persisted to a single file.
///
/// Writes go through a temp file and rename so a crash mid-write never
/// leaves a truncated store behind.
pub struct JsonFileStore {
    path: PathBuf,
    entries: ArcSwap<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading any entries already on disk.
    /// Unreadable or malformed files start the store empty instead of
    /// failing; the next `set` rewrites the file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries: ArcSwap::from_pointee(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context(CreateStoreDirSnafu {
                stage: "persist-local-store",
                path: parent.display().to_string(),
            })?;
        }

        let serialized = serde_json::to_string_pretty(entries).context(SerializeEntriesSnafu {
            stage: "persist-local-store",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized).context(WriteStoreFileSnafu {
            stage: "persist-local-store",
            path: temp_path.display().to_string(),
        })?;
        fs::rename(&temp_path, &self.path).context(ReplaceStoreFileSnafu {
            stage: "persist-local-store",
            path: self.path.display().to_string(),
        })?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut next = HashMap::clone(&self.entries.load());
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        self.entries.store(Arc::new(next));
        Ok(())
    }
}

fn load_entries(path: &Path) -> HashMap<String, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read local store, starting empty"
            );
            return HashMap::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to parse local store, starting empty"
            );
            HashMap::new()
        }
    }
}

/// In-memory store for tests and QA scenarios.
pub struct MemoryStore {
    entries: ArcSwap<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn with_exercise_context(exercise_id: &str, student_code: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(EXERCISE_ID_KEY.to_string(), exercise_id.to_string());
        entries.insert(STUDENT_CODE_KEY.to_string(), student_code.to_string());
        Self {
            entries: ArcSwap::from_pointee(entries),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut next = HashMap::clone(&self.entries.load());
        next.insert(key.to_string(), value.to_string());
        self.entries.store(Arc::new(next));
        Ok(())
    }
}
