//! Persisted wrapper around the store key.
//!
//! The store key encrypts every entry and never changes for the life of a
//! store. It is kept sealed under the master key derived from the caller's
//! pass key, so rekeying only rewrites this envelope.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use lockbox_core::{key::KEY_LEN, KeyDerivationMethod, PassKey, StoreError, StoreResult};
use serde::{Deserialize, Serialize};

use crate::{cipher, kdf};

const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyEnvelope {
    version: u32,
    key_method: String,
    salt: Option<String>,
    wrapped_key: String,
}

impl KeyEnvelope {
    /// Seal `store_key` under a master key derived from `pass_key`.
    pub(crate) fn seal(
        store_key: &[u8; KEY_LEN],
        method: KeyDerivationMethod,
        pass_key: &PassKey,
    ) -> StoreResult<Self> {
        let salt = kdf::new_salt(method);
        let master = kdf::derive_master_key(method, pass_key, salt.as_ref().map(|s| s.as_slice()))?;
        let key_method = method.to_string();
        let wrapped = cipher::seal(
            &cipher::build_cipher(&master)?,
            store_key,
            key_method.as_bytes(),
        )?;

        Ok(Self {
            version: ENVELOPE_VERSION,
            key_method,
            salt: salt.map(|s| URL_SAFE_NO_PAD.encode(s)),
            wrapped_key: URL_SAFE_NO_PAD.encode(wrapped),
        })
    }

    /// Recover the store key. A pass key that does not derive the sealing
    /// master key fails with [`StoreError::AuthenticationFailed`].
    pub(crate) fn unseal(&self, pass_key: &PassKey) -> StoreResult<[u8; KEY_LEN]> {
        let method = self.key_method()?;
        let salt = self.salt.as_deref().map(decode).transpose()?;
        let master = kdf::derive_master_key(method, pass_key, salt.as_deref())
            .map_err(|err| match err {
                // A pass key that is not even a raw key cannot be the right one.
                StoreError::InvalidKey { .. } => StoreError::AuthenticationFailed,
                other => other,
            })?;

        let wrapped = decode(&self.wrapped_key)?;
        let store_key = cipher::open(
            &cipher::build_cipher(&master)?,
            &wrapped,
            self.key_method.as_bytes(),
        )
        .map_err(|_| StoreError::AuthenticationFailed)?;

        store_key
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Encryption {
                reason: format!("store key length mismatch: got {}", store_key.len()),
            })
    }

    pub(crate) fn key_method(&self) -> StoreResult<KeyDerivationMethod> {
        self.key_method.parse()
    }

    pub(crate) fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(StoreError::backend)
    }

    pub(crate) fn from_json(json: &str) -> StoreResult<Self> {
        let envelope: Self = serde_json::from_str(json).map_err(|e| StoreError::Backend {
            reason: format!("corrupt key envelope: {e}"),
        })?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StoreError::Backend {
                reason: format!("unsupported key envelope version: {}", envelope.version),
            });
        }
        Ok(envelope)
    }
}

fn decode(text: &str) -> StoreResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| StoreError::Backend {
            reason: format!("key envelope decode failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use lockbox_core::{Argon2Level, RawKey};

    use super::*;

    const STORE_KEY: [u8; KEY_LEN] = [9u8; KEY_LEN];

    #[test]
    fn raw_envelope_unseals_with_same_key_only() {
        let key = RawKey::random();
        let envelope =
            KeyEnvelope::seal(&STORE_KEY, KeyDerivationMethod::Raw, &PassKey::from(&key))
                .expect("seal");
        let json = envelope.to_json().expect("json");
        assert!(!json.contains(&key.to_string()));

        let decoded = KeyEnvelope::from_json(&json).expect("parse");
        assert_eq!(decoded.unseal(&PassKey::from(&key)).expect("unseal"), STORE_KEY);

        let err = decoded
            .unseal(&PassKey::from(RawKey::random()))
            .expect_err("wrong key");
        assert_eq!(err, StoreError::AuthenticationFailed);

        let err = decoded
            .unseal(&PassKey::from("not-a-key"))
            .expect_err("garbage key");
        assert_eq!(err, StoreError::AuthenticationFailed);
    }

    #[test]
    fn argon2_envelope_carries_its_salt() {
        let method = KeyDerivationMethod::Argon2i(Argon2Level::Interactive);
        let envelope =
            KeyEnvelope::seal(&STORE_KEY, method, &PassKey::from("passphrase")).expect("seal");
        assert!(envelope.salt.is_some());
        assert_eq!(envelope.key_method().expect("method"), method);
        assert_eq!(
            envelope.unseal(&PassKey::from("passphrase")).expect("unseal"),
            STORE_KEY
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let mut envelope = KeyEnvelope::seal(
            &STORE_KEY,
            KeyDerivationMethod::Unprotected,
            &PassKey::empty(),
        )
        .expect("seal");
        envelope.version = ENVELOPE_VERSION + 1;
        let json = envelope.to_json().expect("json");
        let err = KeyEnvelope::from_json(&json).expect_err("version mismatch");
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}
