use thiserror::Error;

/// Coarse classification of [`StoreError`], stable for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSeed,
    InvalidKey,
    InvalidKeyMethod,
    InvalidUri,
    UnsupportedBackend,
    StoreAlreadyExists,
    StoreNotFound,
    AuthenticationFailed,
    HandleAlreadyClosed,
    DuplicateEntry,
    Backend,
    Encryption,
}

/// Errors produced by store provisioning, key handling and entry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Seed is too short to derive a raw key from.
    #[error("seed must be at least {min} bytes, got {len}")]
    InvalidSeed { len: usize, min: usize },
    /// Pass key could not be interpreted for the requested method.
    #[error("invalid store key: {reason}")]
    InvalidKey { reason: String },
    /// Unknown key derivation method.
    #[error("unsupported key method: {method}")]
    InvalidKeyMethod { method: String },
    /// Malformed store URI.
    #[error("invalid store uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    /// Recognised scheme without a backend in this build.
    #[error("no backend available for scheme: {scheme}")]
    UnsupportedBackend { scheme: String },
    #[error("store already exists at {uri}")]
    StoreAlreadyExists { uri: String },
    #[error("store not found at {uri}")]
    StoreNotFound { uri: String },
    /// The supplied key does not unlock the store.
    #[error("authentication failed: store key does not match")]
    AuthenticationFailed,
    #[error("store handle already closed")]
    HandleAlreadyClosed,
    #[error("entry already exists: {category}/{name}")]
    DuplicateEntry { category: String, name: String },
    /// Underlying storage medium failure.
    #[error("backend failure: {reason}")]
    Backend { reason: String },
    /// Encryption or decryption failure on stored data.
    #[error("encryption failure: {reason}")]
    Encryption { reason: String },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidSeed { .. } => ErrorKind::InvalidSeed,
            StoreError::InvalidKey { .. } => ErrorKind::InvalidKey,
            StoreError::InvalidKeyMethod { .. } => ErrorKind::InvalidKeyMethod,
            StoreError::InvalidUri { .. } => ErrorKind::InvalidUri,
            StoreError::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            StoreError::StoreAlreadyExists { .. } => ErrorKind::StoreAlreadyExists,
            StoreError::StoreNotFound { .. } => ErrorKind::StoreNotFound,
            StoreError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            StoreError::HandleAlreadyClosed => ErrorKind::HandleAlreadyClosed,
            StoreError::DuplicateEntry { .. } => ErrorKind::DuplicateEntry,
            StoreError::Backend { .. } => ErrorKind::Backend,
            StoreError::Encryption { .. } => ErrorKind::Encryption,
        }
    }

    /// Wrap any displayable backend failure.
    pub fn backend<E: ToString>(err: E) -> Self {
        StoreError::Backend {
            reason: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
