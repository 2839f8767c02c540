//! Helpers for test suites that need a provisioned store.
//!
//! Configuration is read from the environment once, by [`TestConfig::from_env`],
//! and passed explicitly to the setup routines.

use std::{
    env,
    sync::{Arc, Once},
};

use lockbox_core::{
    logging::{self, LogLevel, LogSink},
    KeyDerivationMethod, PassKey, RawKey, StoreResult, StoreUri,
};

use crate::Store;

pub use lockbox_core::encode::base64url;

/// Selects the store URI for test runs.
pub const URI_ENV: &str = "LOCKBOX_TEST_URI";
/// Any non-empty value enables trace logging.
pub const LOG_ENV: &str = "LOCKBOX_TEST_LOG";

pub const TEST_SEED: &[u8] = b"00000000000000000000000000000My1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub store_uri: StoreUri,
    pub enable_trace_logging: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            store_uri: StoreUri::in_memory(),
            enable_trace_logging: false,
        }
    }
}

impl TestConfig {
    pub fn from_env() -> StoreResult<Self> {
        Self::from_values(env::var(URI_ENV).ok(), env::var(LOG_ENV).ok())
    }

    /// Build from raw variable values; `None` means unset.
    pub fn from_values(uri: Option<String>, log: Option<String>) -> StoreResult<Self> {
        let store_uri = match uri.filter(|u| !u.trim().is_empty()) {
            Some(raw) => StoreUri::parse(&raw)?,
            None => StoreUri::in_memory(),
        };
        Ok(Self {
            store_uri,
            enable_trace_logging: log.is_some_and(|v| !v.is_empty()),
        })
    }
}

/// Key derived from the fixed test seed.
pub fn test_raw_key() -> StoreResult<RawKey> {
    RawKey::from_seed(TEST_SEED)
}

/// Writes forwarded records to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn record(&self, level: LogLevel, message: &str) {
        eprintln!("lockbox [{level}] {message}");
    }
}

static SETUP: Once = Once::new();

/// One-time process setup. Only the first call has any effect.
pub fn setup(config: &TestConfig) {
    SETUP.call_once(|| {
        if config.enable_trace_logging {
            logging::set_custom_logger(Arc::new(StderrSink), LogLevel::Trace);
        }
    });
}

/// Provision a fresh store at the configured URI with the test key.
pub async fn setup_store(config: &TestConfig) -> StoreResult<Store> {
    let key = test_raw_key()?;
    Store::provision(
        &config.store_uri,
        KeyDerivationMethod::Raw,
        &PassKey::from(key),
        true,
    )
    .await
}
