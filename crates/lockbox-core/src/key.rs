use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Length of raw keys and of every symmetric key derived from them.
pub const KEY_LEN: usize = 32;
/// Shortest seed accepted by [`generate_raw_key`].
pub const MIN_SEED_LEN: usize = 32;

const RAW_KEY_DOMAIN: &[u8] = b"lockbox:raw-key:v1";

/// 256-bit store key. The text form is URL-safe base64 without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct RawKey([u8; KEY_LEN]);

impl RawKey {
    /// Derive a key from seed bytes; the same seed always yields the same key.
    pub fn from_seed(seed: &[u8]) -> StoreResult<Self> {
        if seed.len() < MIN_SEED_LEN {
            return Err(StoreError::InvalidSeed {
                len: seed.len(),
                min: MIN_SEED_LEN,
            });
        }
        let mut hasher = Sha256::new();
        hasher.update(RAW_KEY_DOMAIN);
        hasher.update(seed);
        Ok(Self(hasher.finalize().into()))
    }

    /// Fresh key from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Free-function form of [`RawKey::from_seed`].
pub fn generate_raw_key(seed: &[u8]) -> StoreResult<RawKey> {
    RawKey::from_seed(seed)
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawKey(..)")
    }
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl FromStr for RawKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| StoreError::InvalidKey {
                reason: format!("raw key decode failed: {e}"),
            })?;
        let bytes: [u8; KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::InvalidKey {
                    reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
                })?;
        Ok(Self(bytes))
    }
}

/// Secret presented when provisioning or opening a store.
///
/// Holds the text form of a [`RawKey`] for the `raw` method, or a passphrase
/// for `kdf:*` methods. `Debug` never prints the secret.
pub struct PassKey(SecretString);

impl PassKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }

    /// Pass key for unprotected stores.
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for PassKey {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl fmt::Debug for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassKey(..)")
    }
}

impl From<&RawKey> for PassKey {
    fn from(key: &RawKey) -> Self {
        Self::new(key.to_string())
    }
}

impl From<RawKey> for PassKey {
    fn from(key: RawKey) -> Self {
        Self::from(&key)
    }
}

impl From<&str> for PassKey {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

/// Cost profile for passphrase derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Argon2Level {
    /// Slow, for long-lived stores.
    Moderate,
    /// Fast, for interactive unlocks and tests.
    Interactive,
}

/// How a [`PassKey`] becomes the master key that wraps the store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyDerivationMethod {
    /// Pass key is the text form of a [`RawKey`] used directly.
    #[default]
    Raw,
    /// Pass key is a passphrase stretched with Argon2i and a per-store salt.
    Argon2i(Argon2Level),
    /// No protection; the pass key must be empty.
    Unprotected,
}

impl fmt::Display for KeyDerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KeyDerivationMethod::Raw => "raw",
            KeyDerivationMethod::Argon2i(Argon2Level::Moderate) => "kdf:argon2i:mod",
            KeyDerivationMethod::Argon2i(Argon2Level::Interactive) => "kdf:argon2i:int",
            KeyDerivationMethod::Unprotected => "none",
        };
        f.write_str(text)
    }
}

impl FromStr for KeyDerivationMethod {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(KeyDerivationMethod::Raw),
            "kdf:argon2i" | "kdf:argon2i:mod" => {
                Ok(KeyDerivationMethod::Argon2i(Argon2Level::Moderate))
            }
            "kdf:argon2i:int" => Ok(KeyDerivationMethod::Argon2i(Argon2Level::Interactive)),
            "none" => Ok(KeyDerivationMethod::Unprotected),
            other => Err(StoreError::InvalidKeyMethod {
                method: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &[u8] = b"00000000000000000000000000000My1";

    #[test]
    fn seed_derivation_is_deterministic() {
        let first = generate_raw_key(SEED).expect("derive");
        let second = generate_raw_key(SEED).expect("derive again");
        assert_eq!(first, second);
        assert_eq!(first.to_string().len(), 43);
    }

    #[test]
    fn distinct_seeds_give_distinct_keys() {
        let a = generate_raw_key(SEED).expect("derive");
        let b = generate_raw_key(b"00000000000000000000000000000My2").expect("derive");
        assert_ne!(a, b);
    }

    #[test]
    fn short_seed_is_rejected() {
        let err = generate_raw_key(b"too-short").expect_err("should reject");
        assert_eq!(err, StoreError::InvalidSeed { len: 9, min: 32 });
    }

    #[test]
    fn raw_key_text_form_parses_back() {
        let key = RawKey::random();
        let parsed: RawKey = key.to_string().parse().expect("parse");
        assert_eq!(parsed, key);

        let err = "abcd".parse::<RawKey>().expect_err("wrong length");
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let key = generate_raw_key(SEED).expect("derive");
        let pass = PassKey::from(&key);
        assert_eq!(format!("{key:?}"), "RawKey(..)");
        assert!(!format!("{pass:?}").contains(&key.to_string()));
    }

    #[test]
    fn key_methods_parse_their_display_form() {
        for method in [
            KeyDerivationMethod::Raw,
            KeyDerivationMethod::Argon2i(Argon2Level::Moderate),
            KeyDerivationMethod::Argon2i(Argon2Level::Interactive),
            KeyDerivationMethod::Unprotected,
        ] {
            assert_eq!(method.to_string().parse::<KeyDerivationMethod>(), Ok(method));
        }
        assert_eq!(
            "kdf:argon2i".parse::<KeyDerivationMethod>(),
            Ok(KeyDerivationMethod::Argon2i(Argon2Level::Moderate))
        );
        assert!(matches!(
            "kdf:scrypt".parse::<KeyDerivationMethod>(),
            Err(StoreError::InvalidKeyMethod { .. })
        ));
    }
}
