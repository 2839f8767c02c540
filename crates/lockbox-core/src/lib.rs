//! Core abstractions for Lockbox: keys, store locations, errors, logging and
//! the entry contract every store handle implements.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod encode;
pub mod error;
pub mod key;
pub mod logging;
pub mod storage;
pub mod uri;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use key::{generate_raw_key, Argon2Level, KeyDerivationMethod, PassKey, RawKey};
pub use logging::{LogLevel, LogSink};
pub use uri::{StoreLocation, StoreUri};
