//! Durable key-value storage for the registry's configuration.
//!
//! Keys are strings and values are JSON, mirroring browser local storage.
//! [`MemoryStorage`] keeps everything in process; [`FileStorage`] keeps one
//! JSON file per key in a directory, written atomically.

use fs2::FileExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StorageError;

/// String-keyed, JSON-valued durable storage.
pub trait Storage: Send {
    /// Read a key. `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a key, replacing any previous value.
    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Remove a key. Idempotent.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage holding raw JSON strings.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the registry wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Store a raw string without validating it as JSON.
    pub fn set_raw(&self, key: &str, raw: impl Into<String>) {
        self.lock().insert(key.to_string(), raw.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.lock().get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.lock().insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Locking strategy for [`FileStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Hold an exclusive advisory lock on `storage.lock` while open.
    #[default]
    Exclusive,
    /// No locking.
    None,
}

/// Directory-backed storage, one pretty-printed JSON file per key.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    _lock: Option<File>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory with an exclusive lock.
    ///
    /// # Errors
    ///
    /// [`StorageError::Locked`] if another open `FileStorage` holds the lock.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        FileStorage::open_with_lock(dir, LockMode::Exclusive)
    }

    pub fn open_with_lock(dir: impl AsRef<Path>, mode: LockMode) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock = match mode {
            LockMode::None => None,
            LockMode::Exclusive => {
                let lock_path = dir.join("storage.lock");
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&lock_path)?;
                match file.try_lock_exclusive() {
                    Ok(()) => Some(file),
                    Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                        return Err(StorageError::Locked(lock_path));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        Ok(FileStorage { dir, _lock: lock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let contents = match fs::read_to_string(self.key_path(key)) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.key_path(key);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(value)?;
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_data()?;
        drop(file);

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
