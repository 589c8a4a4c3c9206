use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persistent key-value capability the description store is built on.
///
/// `set` must be durable by the time it returns. `remove` succeeds when the
/// key is already absent.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError>;
    fn remove(&self, key: &str) -> Result<(), KvError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        (**self).remove(key)
    }
}

/// Check that a key can be used verbatim as a file name
pub fn validate_key(key: &str) -> Result<(), KvError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-');
    if key.is_empty() || key == "." || key == ".." || !key.chars().all(allowed) {
        return Err(KvError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Sequence for temp file names, shared by every store in the process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory-backed store: one file per key.
pub struct FileKvStore {
    base_path: PathBuf,
}

impl FileKvStore {
    /// Create a store rooted at the given directory. The directory is
    /// created lazily on the first write.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, KvError> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{}.val", key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.base_path
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), seq))
    }

    /// Flush the directory entry so a completed rename survives a crash
    #[cfg(unix)]
    fn sync_base_dir(&self) -> Result<(), KvError> {
        fs::File::open(&self.base_path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_base_dir(&self) -> Result<(), KvError> {
        Ok(())
    }

    fn ensure_base_dir(&self) -> Result<(), KvError> {
        if self.base_path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.base_path)?;
        // Owner only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.base_path, fs::Permissions::from_mode(0o700))?;
        }
        log::debug!("Created storage directory {}", self.base_path.display());
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let path = self.value_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let path = self.value_path(key)?;
        self.ensure_base_dir()?;

        // Write to a sibling temp file then rename, so readers never see a
        // partially written value.
        let tmp = self.temp_path(key);
        {
            let mut file = fs::File::create(&tmp)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(value)?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.sync_base_dir()?;

        log::debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let path = self.value_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, mostly for tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
