use async_trait::async_trait;

use crate::error::StoreError;

/// Decrypted record held in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub category: String,
    pub name: String,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(category: impl Into<String>, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Entry-level contract for an opened, encrypted-at-rest store.
///
/// Operations on one handle are serialised; every method fails with
/// [`StoreError::HandleAlreadyClosed`] once the handle has been closed.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Add a new entry; fails with [`StoreError::DuplicateEntry`] if it exists.
    async fn insert(&self, category: &str, name: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Persist a value, overwriting any existing entry.
    async fn replace(&self, category: &str, name: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn fetch(&self, category: &str, name: &str) -> Result<Option<Entry>, StoreError>;

    /// Remove an entry (idempotent).
    async fn delete(&self, category: &str, name: &str) -> Result<(), StoreError>;

    /// All entries in a category, ordered by insertion.
    async fn scan(&self, category: &str) -> Result<Vec<Entry>, StoreError>;

    async fn count(&self, category: &str) -> Result<usize, StoreError>;
}
