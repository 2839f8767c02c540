use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use lockbox_core::{
    key::KEY_LEN,
    storage::{Entry, SecureStore},
    KeyDerivationMethod, PassKey, StoreError, StoreLocation, StoreResult, StoreUri,
};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info, instrument, warn};

use crate::{
    cipher::StoreCipher,
    envelope::KeyEnvelope,
    sqlite::{self, Database, ItemRow},
};

const NAME_FIELD: &[u8] = b"name";
const VALUE_FIELD: &[u8] = b"value";

/// Everything a live handle owns. Dropped (and the connection closed) on `close`.
struct OpenStore {
    db: Database,
    /// Held for the life of the handle so rekeying need not re-derive it.
    store_key: [u8; KEY_LEN],
    cipher: StoreCipher,
    key_method: KeyDerivationMethod,
}

/// Exclusive handle to a provisioned, encrypted store.
///
/// Operations on one handle run one at a time. The backend connection is
/// released by [`Store::close`] or, failing that, when the handle is dropped.
pub struct Store {
    uri: StoreUri,
    inner: Arc<Mutex<Option<OpenStore>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("uri", &self.uri).finish_non_exhaustive()
    }
}

impl Store {
    /// Create a store at `uri`, destroying an existing one first when `recreate` is set.
    #[instrument(skip_all, fields(uri = %uri, method = %method, recreate = recreate))]
    pub async fn provision(
        uri: &StoreUri,
        method: KeyDerivationMethod,
        pass_key: &PassKey,
        recreate: bool,
    ) -> StoreResult<Self> {
        let location = uri.location().clone();
        let raw_uri = uri.to_string();
        let pass_key = pass_key.clone();

        let open = blocking(move || match location {
            StoreLocation::Memory => {
                let keys = NewKeys::generate(method, &pass_key)?;
                initialize(Database::open_in_memory()?, keys)
            }
            StoreLocation::File(path) => {
                if !recreate && path.exists() {
                    return Err(StoreError::StoreAlreadyExists { uri: raw_uri });
                }
                // Key material is checked before an existing store is touched.
                let keys = NewKeys::generate(method, &pass_key)?;
                if recreate && sqlite::remove_database(&path)? {
                    info!(path = %path.display(), "removed existing store for recreate");
                }

                let db = Database::create(&path)?;
                initialize(db, keys).inspect_err(|_| discard(&path))
            }
            StoreLocation::Remote { scheme } => Err(StoreError::UnsupportedBackend { scheme }),
        })
        .await?;

        info!("store provisioned");
        Ok(Self::from_open(uri.clone(), open))
    }

    /// Open an existing store. In-memory stores never outlive their handle,
    /// so opening one always fails with [`StoreError::StoreNotFound`].
    #[instrument(skip_all, fields(uri = %uri))]
    pub async fn open(uri: &StoreUri, pass_key: &PassKey) -> StoreResult<Self> {
        let location = uri.location().clone();
        let raw_uri = uri.to_string();
        let pass_key = pass_key.clone();

        let open = blocking(move || match location {
            StoreLocation::Memory => Err(StoreError::StoreNotFound { uri: raw_uri }),
            StoreLocation::File(path) => {
                if !path.exists() {
                    return Err(StoreError::StoreNotFound { uri: raw_uri });
                }
                let db = Database::open_existing(&path)?;
                let json = db
                    .load_envelope()?
                    .ok_or(StoreError::StoreNotFound { uri: raw_uri })?;
                let envelope = KeyEnvelope::from_json(&json)?;
                let store_key = envelope.unseal(&pass_key)?;
                Ok(OpenStore {
                    cipher: StoreCipher::new(&store_key)?,
                    store_key,
                    key_method: envelope.key_method()?,
                    db,
                })
            }
            StoreLocation::Remote { scheme } => Err(StoreError::UnsupportedBackend { scheme }),
        })
        .await
        .inspect_err(|err| warn!("open failed: {err}"))?;

        debug!(method = %open.key_method, "store opened");
        Ok(Self::from_open(uri.clone(), open))
    }

    /// Delete the store at `uri`. Returns `false` if there was nothing to remove.
    #[instrument(skip_all, fields(uri = %uri))]
    pub async fn remove(uri: &StoreUri) -> StoreResult<bool> {
        let location = uri.location().clone();
        blocking(move || match location {
            // Nothing addressable survives an in-memory handle.
            StoreLocation::Memory => Ok(false),
            StoreLocation::File(path) => sqlite::remove_database(&path),
            StoreLocation::Remote { scheme } => Err(StoreError::UnsupportedBackend { scheme }),
        })
        .await
    }

    /// Release the backend. Only the first call succeeds.
    #[instrument(skip_all, fields(uri = %self.uri))]
    pub async fn close(&self) -> StoreResult<()> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let open = lock(&inner)?
                .take()
                .ok_or(StoreError::HandleAlreadyClosed)?;
            open.db.close()
        })
        .await?;
        debug!("store closed");
        Ok(())
    }

    /// Re-wrap the store key under a new pass key. Entries are left untouched.
    #[instrument(skip_all, fields(uri = %self.uri, method = %method))]
    pub async fn rekey(&self, method: KeyDerivationMethod, pass_key: &PassKey) -> StoreResult<()> {
        let pass_key = pass_key.clone();
        self.with_open(move |open| {
            let envelope = KeyEnvelope::seal(&open.store_key, method, &pass_key)?;
            open.db.save_envelope(&envelope.to_json()?)?;
            open.key_method = method;
            Ok(())
        })
        .await?;
        info!("store rekeyed");
        Ok(())
    }

    pub fn uri(&self) -> &StoreUri {
        &self.uri
    }

    pub async fn key_method(&self) -> StoreResult<KeyDerivationMethod> {
        self.with_open(|open| Ok(open.key_method)).await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }

    fn from_open(uri: StoreUri, open: OpenStore) -> Self {
        Self {
            uri,
            inner: Arc::new(Mutex::new(Some(open))),
        }
    }

    /// Run `f` against the open store on the blocking pool.
    async fn with_open<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut OpenStore) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let mut guard = lock(&inner)?;
            let open = guard.as_mut().ok_or(StoreError::HandleAlreadyClosed)?;
            f(open)
        })
        .await
    }
}

impl OpenStore {
    fn sealed_row(&self, category: &str, name: &str, value: &[u8]) -> StoreResult<ItemRow> {
        let item_index = self.cipher.item_index(category, name)?;
        Ok(ItemRow {
            category_index: self.cipher.category_index(category)?,
            name: self.cipher.seal_field(NAME_FIELD, &item_index, name.as_bytes())?,
            value: self.cipher.seal_field(VALUE_FIELD, &item_index, value)?,
            item_index,
        })
    }

    fn open_row(&self, category: &str, row: ItemRow) -> StoreResult<Entry> {
        let name = self
            .cipher
            .open_field(NAME_FIELD, &row.item_index, &row.name)?;
        let name = String::from_utf8(name).map_err(|e| StoreError::Encryption {
            reason: format!("entry name is not utf-8: {e}"),
        })?;
        let value = self
            .cipher
            .open_field(VALUE_FIELD, &row.item_index, &row.value)?;
        Ok(Entry {
            category: category.to_string(),
            name,
            value,
        })
    }
}

#[async_trait]
impl SecureStore for Store {
    #[instrument(skip_all, fields(category = %category))]
    async fn insert(&self, category: &str, name: &str, value: &[u8]) -> Result<(), StoreError> {
        let (category, name, value) = (category.to_owned(), name.to_owned(), value.to_vec());
        self.with_open(move |open| {
            let row = open.sealed_row(&category, &name, &value)?;
            if open.db.insert_item(&row)? {
                Ok(())
            } else {
                Err(StoreError::DuplicateEntry { category, name })
            }
        })
        .await
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn replace(&self, category: &str, name: &str, value: &[u8]) -> Result<(), StoreError> {
        let (category, name, value) = (category.to_owned(), name.to_owned(), value.to_vec());
        self.with_open(move |open| {
            let row = open.sealed_row(&category, &name, &value)?;
            open.db.upsert_item(&row)
        })
        .await
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn fetch(&self, category: &str, name: &str) -> Result<Option<Entry>, StoreError> {
        let (category, name) = (category.to_owned(), name.to_owned());
        self.with_open(move |open| {
            let item_index = open.cipher.item_index(&category, &name)?;
            open.db
                .fetch_item(&item_index)?
                .map(|row| open.open_row(&category, row))
                .transpose()
        })
        .await
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn delete(&self, category: &str, name: &str) -> Result<(), StoreError> {
        let (category, name) = (category.to_owned(), name.to_owned());
        self.with_open(move |open| {
            let item_index = open.cipher.item_index(&category, &name)?;
            if !open.db.delete_item(&item_index)? {
                debug!("delete of missing entry ignored");
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn scan(&self, category: &str) -> Result<Vec<Entry>, StoreError> {
        let category = category.to_owned();
        self.with_open(move |open| {
            let category_index = open.cipher.category_index(&category)?;
            open.db
                .scan_items(&category_index)?
                .into_iter()
                .map(|row| open.open_row(&category, row))
                .collect()
        })
        .await
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn count(&self, category: &str) -> Result<usize, StoreError> {
        let category = category.to_owned();
        self.with_open(move |open| {
            let category_index = open.cipher.category_index(&category)?;
            open.db.count_items(&category_index)
        })
        .await
    }
}

/// Fresh store key and the envelope sealing it, built before any backend work.
struct NewKeys {
    store_key: [u8; KEY_LEN],
    cipher: StoreCipher,
    method: KeyDerivationMethod,
    envelope_json: String,
}

impl NewKeys {
    fn generate(method: KeyDerivationMethod, pass_key: &PassKey) -> StoreResult<Self> {
        let mut store_key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut store_key);

        let envelope = KeyEnvelope::seal(&store_key, method, pass_key)?;
        Ok(Self {
            cipher: StoreCipher::new(&store_key)?,
            envelope_json: envelope.to_json()?,
            store_key,
            method,
        })
    }
}

/// Write the schema and first envelope into a newly created database.
fn initialize(mut db: Database, keys: NewKeys) -> StoreResult<OpenStore> {
    db.initialize(&keys.envelope_json)?;
    Ok(OpenStore {
        db,
        store_key: keys.store_key,
        cipher: keys.cipher,
        key_method: keys.method,
    })
}

/// Best-effort cleanup of a half-provisioned database file.
fn discard(path: &Path) {
    if let Err(err) = sqlite::remove_database(path) {
        warn!(path = %path.display(), "failed to clean up after provision error: {err}");
    }
}

fn lock(
    inner: &Mutex<Option<OpenStore>>,
) -> StoreResult<std::sync::MutexGuard<'_, Option<OpenStore>>> {
    inner.lock().map_err(|err| StoreError::Backend {
        reason: format!("lock poisoned: {err}"),
    })
}

/// SQLite and key derivation block; keep them off the async workers.
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend {
            reason: format!("blocking task failed: {e}"),
        })?
}
