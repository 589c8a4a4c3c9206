pub mod compare;
pub mod config;
pub mod kv;
pub mod store;

pub use compare::{ExactMatcher, MatchResult, Matcher};
pub use store::{FaceDescriptionStore, RegisteredDescription, StorageError};

use kv::{FileKvStore, KeyValueStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Storage error: {0}")]
    Storage(#[from] store::StorageError),
}

/// What a submitted payload ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was registered, so the payload became the registration
    Registered(RegisteredDescription),
    /// A registration existed and the payload was compared against it
    Compared(MatchResult),
}

/// Entry point used by front ends: one registered face, backed by the
/// configured storage.
pub struct FaceRegistry<S: KeyValueStore = FileKvStore> {
    config: config::Config,
    store: FaceDescriptionStore<S>,
}

impl FaceRegistry<FileKvStore> {
    /// Create a registry storing its description under the configured
    /// database directory
    pub fn new(config: config::Config) -> Result<Self, Error> {
        let backend = FileKvStore::new(config.database_dir());
        Self::with_backend(config, backend)
    }
}

impl<S: KeyValueStore> FaceRegistry<S> {
    /// Create a registry over an arbitrary storage backend
    pub fn with_backend(config: config::Config, backend: S) -> Result<Self, Error> {
        config.validate()?;
        let store = FaceDescriptionStore::new(backend)
            .key(config.storage.key.clone())
            .max_payload_bytes(config.registration.max_payload_bytes);
        log::debug!("Face registry using key {:?}", config.storage.key);

        Ok(Self { config, store })
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    /// Get the description store for direct access
    pub fn store(&self) -> &FaceDescriptionStore<S> {
        &self.store
    }

    pub fn register(&self, payload: &[u8]) -> Result<RegisteredDescription, Error> {
        Ok(self.store.register(payload)?)
    }

    pub fn compare(&self, probe: &[u8]) -> Result<MatchResult, Error> {
        Ok(self.store.compare(probe)?)
    }

    /// Forget the registered face (logout)
    pub fn clear(&self) -> Result<(), Error> {
        Ok(self.store.clear()?)
    }

    pub fn status(&self) -> Result<Option<RegisteredDescription>, Error> {
        Ok(self.store.load()?)
    }

    /// Register the payload if nothing is registered yet, otherwise compare
    /// it against the registration. Concurrent submits register at most once.
    pub fn submit(&self, payload: &[u8]) -> Result<Submission, Error> {
        if let Some(description) = self.store.register_if_absent(payload)? {
            return Ok(Submission::Registered(description));
        }

        let result = self.compare(payload)?;
        log::info!("Submitted face compared: {}", result);
        Ok(Submission::Compared(result))
    }
}
