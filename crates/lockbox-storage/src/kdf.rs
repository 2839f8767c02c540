use argon2::{Algorithm, Argon2, Params, Version};
use lockbox_core::{
    key::KEY_LEN, Argon2Level, KeyDerivationMethod, PassKey, RawKey, StoreError, StoreResult,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

pub(crate) const SALT_LEN: usize = 16;

const UNPROTECTED_DOMAIN: &[u8] = b"lockbox:unprotected:v1";

/// (memory KiB, iterations) per cost profile.
fn argon2_cost(level: Argon2Level) -> (u32, u32) {
    match level {
        Argon2Level::Moderate => (128 * 1024, 10),
        Argon2Level::Interactive => (32 * 1024, 4),
    }
}

/// Fresh salt when the method needs one.
pub(crate) fn new_salt(method: KeyDerivationMethod) -> Option<[u8; SALT_LEN]> {
    match method {
        KeyDerivationMethod::Argon2i(_) => {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            Some(salt)
        }
        KeyDerivationMethod::Raw | KeyDerivationMethod::Unprotected => None,
    }
}

/// Turn a pass key into the master key that wraps the store key.
pub(crate) fn derive_master_key(
    method: KeyDerivationMethod,
    pass_key: &PassKey,
    salt: Option<&[u8]>,
) -> StoreResult<[u8; KEY_LEN]> {
    match method {
        KeyDerivationMethod::Raw => {
            let key: RawKey = pass_key.expose().parse()?;
            Ok(*key.as_bytes())
        }
        KeyDerivationMethod::Argon2i(level) => {
            let salt = salt.ok_or_else(|| StoreError::Encryption {
                reason: "argon2 derivation requires a salt".to_string(),
            })?;
            let (m_cost, t_cost) = argon2_cost(level);
            let params = Params::new(m_cost, t_cost, 1, Some(KEY_LEN)).map_err(|e| {
                StoreError::Encryption {
                    reason: format!("argon2 params: {e}"),
                }
            })?;
            let argon2 = Argon2::new(Algorithm::Argon2i, Version::V0x13, params);

            let mut out = [0u8; KEY_LEN];
            argon2
                .hash_password_into(pass_key.expose().as_bytes(), salt, &mut out)
                .map_err(|e| StoreError::Encryption {
                    reason: format!("argon2 derivation failed: {e}"),
                })?;
            Ok(out)
        }
        KeyDerivationMethod::Unprotected => {
            if !pass_key.is_empty() {
                return Err(StoreError::InvalidKey {
                    reason: "unprotected stores take an empty pass key".to_string(),
                });
            }
            Ok(Sha256::digest(UNPROTECTED_DOMAIN).into())
        }
    }
}
