//! SQLite persistence for key envelopes and sealed entries.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use lockbox_core::{StoreError, StoreResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

const ENVELOPE_KEY: &str = "key_envelope";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS config (
        name            TEXT PRIMARY KEY,
        value           TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS items (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        category_index  BLOB NOT NULL,
        item_index      BLOB NOT NULL UNIQUE,
        name            BLOB NOT NULL,
        value           BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS ix_items_category ON items (category_index);
";

/// One sealed row of the `items` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemRow {
    pub(crate) category_index: Vec<u8>,
    pub(crate) item_index: Vec<u8>,
    pub(crate) name: Vec<u8>,
    pub(crate) value: Vec<u8>,
}

/// Connection to one store's database.
pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Ok(Self { conn })
    }

    /// Open the database file at `path`, creating it (and its parent directory) if needed.
    pub(crate) fn create(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        Ok(Self { conn })
    }

    /// Open an existing database file without creating it.
    pub(crate) fn open_existing(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(StoreError::backend)?;
        Ok(Self { conn })
    }

    /// Create the schema and store the first key envelope atomically.
    pub(crate) fn initialize(&mut self, envelope_json: &str) -> StoreResult<()> {
        let tx = self.conn.transaction().map_err(StoreError::backend)?;
        tx.execute_batch(SCHEMA).map_err(StoreError::backend)?;
        tx.execute(
            "INSERT INTO config (name, value) VALUES (?1, ?2)",
            params![ENVELOPE_KEY, envelope_json],
        )
        .map_err(StoreError::backend)?;
        tx.commit().map_err(StoreError::backend)
    }

    /// The stored key envelope, or `None` if this is not an initialized store.
    pub(crate) fn load_envelope(&self) -> StoreResult<Option<String>> {
        let has_config: bool = self
            .conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'config')",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::backend)?;
        if !has_config {
            return Ok(None);
        }

        self.conn
            .query_row(
                "SELECT value FROM config WHERE name = ?1",
                params![ENVELOPE_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::backend)
    }

    pub(crate) fn save_envelope(&self, envelope_json: &str) -> StoreResult<()> {
        self.conn
            .execute(
                "UPDATE config SET value = ?2 WHERE name = ?1",
                params![ENVELOPE_KEY, envelope_json],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    /// Insert a new row; returns `false` if the item already exists.
    pub(crate) fn insert_item(&self, row: &ItemRow) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO items (category_index, item_index, name, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.category_index, row.item_index, row.name, row.value],
            )
            .map_err(StoreError::backend)?;
        Ok(changed == 1)
    }

    /// Insert or overwrite a row, keeping the original insertion position.
    pub(crate) fn upsert_item(&self, row: &ItemRow) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO items (category_index, item_index, name, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (item_index) DO UPDATE SET name = excluded.name, value = excluded.value",
                params![row.category_index, row.item_index, row.name, row.value],
            )
            .map_err(StoreError::backend)?;
        Ok(())
    }

    pub(crate) fn fetch_item(&self, item_index: &[u8]) -> StoreResult<Option<ItemRow>> {
        self.conn
            .query_row(
                "SELECT category_index, item_index, name, value FROM items WHERE item_index = ?1",
                params![item_index],
                row_to_item,
            )
            .optional()
            .map_err(StoreError::backend)
    }

    pub(crate) fn delete_item(&self, item_index: &[u8]) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM items WHERE item_index = ?1", params![item_index])
            .map_err(StoreError::backend)?;
        Ok(changed > 0)
    }

    pub(crate) fn scan_items(&self, category_index: &[u8]) -> StoreResult<Vec<ItemRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT category_index, item_index, name, value FROM items
                 WHERE category_index = ?1 ORDER BY id",
            )
            .map_err(StoreError::backend)?;
        let rows = stmt
            .query_map(params![category_index], row_to_item)
            .map_err(StoreError::backend)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)
    }

    pub(crate) fn count_items(&self, category_index: &[u8]) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM items WHERE category_index = ?1",
                params![category_index],
                |row| row.get(0),
            )
            .map_err(StoreError::backend)?;
        usize::try_from(count).map_err(StoreError::backend)
    }

    pub(crate) fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .map_err(|(_conn, err)| StoreError::backend(err))
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        category_index: row.get(0)?,
        item_index: row.get(1)?,
        name: row.get(2)?,
        value: row.get(3)?,
    })
}

/// Paths SQLite may create next to a database file.
fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
    ["-wal", "-shm", "-journal"]
        .iter()
        .map(|suffix| {
            let mut os = path.as_os_str().to_owned();
            os.push(suffix);
            PathBuf::from(os)
        })
        .collect()
}

/// Delete a database file and its sidecars. Returns `false` if nothing existed.
pub(crate) fn remove_database(path: &Path) -> StoreResult<bool> {
    let removed = match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => return Err(StoreError::backend(err)),
    };
    for sidecar in sidecar_paths(path) {
        match fs::remove_file(&sidecar) {
            Ok(()) => debug!(path = %sidecar.display(), "removed sqlite sidecar"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::backend(err)),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &[u8], item: &[u8], value: &[u8]) -> ItemRow {
        ItemRow {
            category_index: category.to_vec(),
            item_index: item.to_vec(),
            name: b"sealed-name".to_vec(),
            value: value.to_vec(),
        }
    }

    fn initialized() -> Database {
        let mut db = Database::open_in_memory().expect("open");
        db.initialize("{}").expect("initialize");
        db
    }

    #[test]
    fn fresh_database_has_no_envelope() {
        let db = Database::open_in_memory().expect("open");
        assert_eq!(db.load_envelope().expect("load"), None);
    }

    #[test]
    fn envelope_can_be_replaced() {
        let db = initialized();
        assert_eq!(db.load_envelope().expect("load").as_deref(), Some("{}"));
        db.save_envelope("{\"v\":2}").expect("save");
        assert_eq!(
            db.load_envelope().expect("load").as_deref(),
            Some("{\"v\":2}")
        );
    }

    #[test]
    fn insert_refuses_duplicates_but_upsert_overwrites() {
        let db = initialized();
        assert!(db.insert_item(&row(b"c", b"i1", b"v1")).expect("insert"));
        assert!(!db.insert_item(&row(b"c", b"i1", b"v2")).expect("dup insert"));
        db.upsert_item(&row(b"c", b"i1", b"v3")).expect("upsert");

        let fetched = db.fetch_item(b"i1").expect("fetch").expect("present");
        assert_eq!(fetched.value, b"v3");
    }

    #[test]
    fn scan_keeps_insertion_order_within_category() {
        let db = initialized();
        db.insert_item(&row(b"c", b"i2", b"second")).expect("insert");
        db.insert_item(&row(b"other", b"i9", b"x")).expect("insert");
        db.insert_item(&row(b"c", b"i1", b"third")).expect("insert");
        db.upsert_item(&row(b"c", b"i2", b"first")).expect("upsert");

        let values: Vec<_> = db
            .scan_items(b"c")
            .expect("scan")
            .into_iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![b"first".to_vec(), b"third".to_vec()]);
        assert_eq!(db.count_items(b"c").expect("count"), 2);
        assert_eq!(db.count_items(b"missing").expect("count"), 0);
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let db = initialized();
        db.insert_item(&row(b"c", b"i1", b"v")).expect("insert");
        assert!(db.delete_item(b"i1").expect("delete"));
        assert!(!db.delete_item(b"i1").expect("delete again"));
        assert_eq!(db.fetch_item(b"i1").expect("fetch"), None);
    }

    #[test]
    fn remove_database_deletes_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.db");
        let mut db = Database::create(&path).expect("create");
        db.initialize("{}").expect("initialize");
        db.close().expect("close");

        assert!(remove_database(&path).expect("remove"));
        assert!(!path.exists());
        assert!(!remove_database(&path).expect("remove again"));
    }

    #[test]
    fn open_existing_does_not_create_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.db");
        assert!(Database::open_existing(&path).is_err());
        assert!(!path.exists());
    }
}
