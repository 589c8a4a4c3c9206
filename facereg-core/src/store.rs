use crate::compare::{ExactMatcher, MatchResult, Matcher};
use crate::kv::{KeyValueStore, KvError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Key the description lives under
pub const DEFAULT_KEY: &str = "@face_description";

/// Default cap on a registered payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read face description: {0}")]
    Read(#[source] KvError),
    #[error("Failed to write face description: {0}")]
    Write(#[source] KvError),
    #[error("Failed to encode face description: {0}")]
    Encode(String),
    #[error("Stored face description is unreadable: {0}")]
    Corrupt(String),
    #[error("Payload is empty")]
    EmptyPayload,
    #[error("Payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl StorageError {
    /// True for failures of the read path, including an undecodable entry
    pub fn is_read_error(&self) -> bool {
        matches!(self, StorageError::Read(_) | StorageError::Corrupt(_))
    }

    pub fn is_write_error(&self) -> bool {
        matches!(self, StorageError::Write(_) | StorageError::Encode(_))
    }
}

/// The single registered face description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDescription {
    pub value: Vec<u8>,
    pub registered_at: DateTime<Utc>,
}

impl RegisteredDescription {
    /// Hex SHA-256 of the stored value
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(&self.value))
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Holds zero or one [`RegisteredDescription`] under a fixed key and
/// answers match queries against it.
///
/// Writers (`register`, `clear`) are serialized against readers, so a
/// completed `register` is always visible to the next `compare`.
pub struct FaceDescriptionStore<S: KeyValueStore, M: Matcher = ExactMatcher> {
    backend: S,
    matcher: M,
    key: String,
    max_payload_bytes: usize,
    guard: RwLock<()>,
}

impl<S: KeyValueStore> FaceDescriptionStore<S, ExactMatcher> {
    /// Create a store over `backend` using the default key and exact matching
    pub fn new(backend: S) -> Self {
        Self::with_matcher(backend, ExactMatcher)
    }
}

impl<S: KeyValueStore, M: Matcher> FaceDescriptionStore<S, M> {
    pub fn with_matcher(backend: S, matcher: M) -> Self {
        Self {
            backend,
            matcher,
            key: DEFAULT_KEY.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            guard: RwLock::new(()),
        }
    }

    /// Use a different storage key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    // The lock protects no data, so a poisoned guard is still usable.
    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.guard.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.guard.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `payload` as the registered description, replacing any
    /// previous one.
    pub fn register(&self, payload: &[u8]) -> Result<RegisteredDescription, StorageError> {
        let (description, data) = self.encode(payload)?;

        let _guard = self.write_guard();
        self.write_description(&description, &data)?;
        Ok(description)
    }

    /// Register `payload` only if nothing is registered yet. The check and
    /// the write happen under one write lock; returns `None` when a
    /// description already exists.
    pub fn register_if_absent(
        &self,
        payload: &[u8],
    ) -> Result<Option<RegisteredDescription>, StorageError> {
        let (description, data) = self.encode(payload)?;

        let _guard = self.write_guard();
        if self.read_description()?.is_some() {
            return Ok(None);
        }
        self.write_description(&description, &data)?;
        Ok(Some(description))
    }

    fn encode(&self, payload: &[u8]) -> Result<(RegisteredDescription, Vec<u8>), StorageError> {
        if payload.is_empty() {
            return Err(StorageError::EmptyPayload);
        }
        if payload.len() > self.max_payload_bytes {
            return Err(StorageError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let description = RegisteredDescription {
            value: payload.to_vec(),
            registered_at: Utc::now(),
        };
        let data = bincode::serialize(&description)
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        Ok((description, data))
    }

    // Caller holds the write guard.
    fn write_description(
        &self,
        description: &RegisteredDescription,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.backend
            .set(&self.key, data)
            .map_err(StorageError::Write)?;

        log::info!(
            "Registered face description ({} bytes, sha256 {})",
            description.len(),
            description.fingerprint()
        );
        Ok(())
    }

    /// Compare `probe` with the registered description. Having nothing
    /// registered is a normal no-match result.
    pub fn compare(&self, probe: &[u8]) -> Result<MatchResult, StorageError> {
        let stored = {
            let _guard = self.read_guard();
            self.read_description()?
        };

        let Some(stored) = stored else {
            log::debug!("No face description registered, reporting no match");
            return Ok(MatchResult::NOT_REGISTERED);
        };

        let result = self.matcher.compare(&stored.value, probe);
        log::debug!(
            "Compared {} byte probe: match={}, similarity={}",
            probe.len(),
            result.is_match,
            result.similarity
        );
        Ok(result)
    }

    /// Remove the registered description. Does nothing if none exists.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_guard();
        self.backend
            .remove(&self.key)
            .map_err(StorageError::Write)?;
        log::info!("Cleared face description");
        Ok(())
    }

    /// Current registered description, if any
    pub fn load(&self) -> Result<Option<RegisteredDescription>, StorageError> {
        let _guard = self.read_guard();
        self.read_description()
    }

    pub fn is_registered(&self) -> Result<bool, StorageError> {
        Ok(self.load()?.is_some())
    }

    fn read_description(&self) -> Result<Option<RegisteredDescription>, StorageError> {
        let Some(data) = self.backend.get(&self.key).map_err(StorageError::Read)? else {
            return Ok(None);
        };

        match bincode::deserialize::<RegisteredDescription>(&data) {
            Ok(description) => Ok(Some(description)),
            Err(e) => {
                log::warn!("Face description under {:?} could not be decoded: {}", self.key, e);
                Err(StorageError::Corrupt(e.to_string()))
            }
        }
    }
}
