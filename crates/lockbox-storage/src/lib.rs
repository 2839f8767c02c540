//! Encrypted store engine.
//! Entries live in SQLite, sealed with AES-GCM under a per-store key that is
//! itself wrapped by a key derived from the caller's pass key.

mod cipher;
mod envelope;
mod kdf;
mod sqlite;
pub mod store;
pub mod testing;

pub use store::Store;
