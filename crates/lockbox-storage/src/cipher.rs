//! Symmetric primitives: AES-256-GCM sealing and HMAC-SHA256 blind indexes.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use lockbox_core::{key::KEY_LEN, StoreError, StoreResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const NONCE_LEN: usize = 12;

const VALUE_KEY_LABEL: &[u8] = b"lockbox:value-key:v1";
const INDEX_KEY_LABEL: &[u8] = b"lockbox:index-key:v1";

/// Output is `nonce || ciphertext`.
pub(crate) fn seal(cipher: &Aes256Gcm, plaintext: &[u8], aad: &[u8]) -> StoreResult<Vec<u8>> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| StoreError::Encryption {
            reason: format!("encrypt failed: {e}"),
        })?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`]. Any tampering or wrong key yields `aes_gcm::Error`.
pub(crate) fn open(
    cipher: &Aes256Gcm,
    sealed: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    if sealed.len() < NONCE_LEN {
        return Err(aes_gcm::Error);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher.decrypt(
        Nonce::from_slice(nonce),
        Payload {
            msg: ciphertext,
            aad,
        },
    )
}

pub(crate) fn build_cipher(key: &[u8; KEY_LEN]) -> StoreResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| StoreError::Encryption {
        reason: format!("cipher init failed: {e}"),
    })
}

fn keyed_hash(key: &[u8], parts: &[&[u8]]) -> StoreResult<[u8; 32]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|e| StoreError::Encryption {
        reason: format!("hmac init failed: {e}"),
    })?;
    for part in parts {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        mac.update(&(part.len() as u64).to_be_bytes());
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Per-store cipher derived from the store key.
pub(crate) struct StoreCipher {
    value_cipher: Aes256Gcm,
    index_key: [u8; 32],
}

impl StoreCipher {
    pub(crate) fn new(store_key: &[u8; KEY_LEN]) -> StoreResult<Self> {
        let value_key = keyed_hash(store_key, &[VALUE_KEY_LABEL])?;
        let index_key = keyed_hash(store_key, &[INDEX_KEY_LABEL])?;
        Ok(Self {
            value_cipher: build_cipher(&value_key)?,
            index_key,
        })
    }

    pub(crate) fn category_index(&self, category: &str) -> StoreResult<Vec<u8>> {
        Ok(keyed_hash(&self.index_key, &[&b"category"[..], category.as_bytes()])?.to_vec())
    }

    pub(crate) fn item_index(&self, category: &str, name: &str) -> StoreResult<Vec<u8>> {
        Ok(keyed_hash(
            &self.index_key,
            &[&b"item"[..], category.as_bytes(), name.as_bytes()],
        )?
        .to_vec())
    }

    /// Seal one field of the row identified by `item_index`.
    pub(crate) fn seal_field(
        &self,
        field: &[u8],
        item_index: &[u8],
        plaintext: &[u8],
    ) -> StoreResult<Vec<u8>> {
        seal(&self.value_cipher, plaintext, &field_aad(field, item_index))
    }

    pub(crate) fn open_field(
        &self,
        field: &[u8],
        item_index: &[u8],
        sealed: &[u8],
    ) -> StoreResult<Vec<u8>> {
        open(&self.value_cipher, sealed, &field_aad(field, item_index)).map_err(|e| {
            StoreError::Encryption {
                reason: format!("decrypt failed: {e}"),
            }
        })
    }
}

fn field_aad(field: &[u8], item_index: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(field.len() + 1 + item_index.len());
    aad.extend_from_slice(field);
    aad.push(b':');
    aad.extend_from_slice(item_index);
    aad
}
