use std::path::PathBuf;

use crate::{cli::StoreTarget, config::Config};
use color_eyre::Result;
use dirs::data_dir;
use lockbox_core::{KeyDerivationMethod, PassKey, StoreUri};
use tracing::debug;

/// Environment fallback for `--key`.
pub const PASS_KEY_ENV: &str = "LOCKBOX_PASS_KEY";

/// Resolve the default data directory for Lockbox.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("lockbox"))
}

/// Store in the platform data directory, used when neither flag nor config names one.
pub fn default_store_uri() -> Result<StoreUri> {
    Ok(StoreUri::file(default_data_dir()?.join("store.db"))?)
}

/// Pick the store URI: flag, then config override, then the data directory.
pub fn resolve_uri(flag: Option<&str>, config: &Config) -> Result<StoreUri> {
    if let Some(raw) = flag.or(config.store_uri.as_deref()) {
        let uri = StoreUri::parse(raw)?;
        debug!(uri = %uri, "using configured store uri");
        return Ok(uri);
    }
    default_store_uri()
}

/// Pick the pass key: flag, then `LOCKBOX_PASS_KEY`. Unprotected stores need none.
pub fn resolve_pass_key(
    flag: Option<&str>,
    env_value: Option<String>,
    method: KeyDerivationMethod,
) -> Result<PassKey> {
    match flag.map(str::to_owned).or(env_value) {
        Some(secret) => Ok(PassKey::new(secret)),
        None if method == KeyDerivationMethod::Unprotected => Ok(PassKey::empty()),
        None => Err(color_eyre::eyre::eyre!(
            "no pass key given; pass --key or set {PASS_KEY_ENV}"
        )),
    }
}

/// URI and pass key for a store command.
pub fn resolve_target(
    target: &StoreTarget,
    config: &Config,
    method: KeyDerivationMethod,
) -> Result<(StoreUri, PassKey)> {
    let uri = resolve_uri(target.uri.as_deref(), config)?;
    let key = resolve_pass_key(
        target.key.as_deref(),
        std::env::var(PASS_KEY_ENV).ok(),
        method,
    )?;
    Ok((uri, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_config() {
        let config = Config {
            store_uri: Some("sqlite:///from/config.db".into()),
            ..Config::default()
        };
        let uri = resolve_uri(Some("sqlite://:memory:"), &config).expect("uri");
        assert!(uri.is_in_memory());

        let uri = resolve_uri(None, &config).expect("uri");
        assert_eq!(uri.as_str(), "sqlite:///from/config.db");
    }

    #[test]
    fn pass_key_falls_back_to_env_value() {
        let key = resolve_pass_key(None, Some("from-env".into()), KeyDerivationMethod::Raw)
            .expect("key");
        assert_eq!(key.expose(), "from-env");

        let key = resolve_pass_key(
            Some("from-flag"),
            Some("from-env".into()),
            KeyDerivationMethod::Raw,
        )
        .expect("key");
        assert_eq!(key.expose(), "from-flag");
    }

    #[test]
    fn missing_pass_key_only_allowed_for_unprotected() {
        assert!(resolve_pass_key(None, None, KeyDerivationMethod::Raw).is_err());
        let key =
            resolve_pass_key(None, None, KeyDerivationMethod::Unprotected).expect("empty key");
        assert!(key.is_empty());
    }
}
