mod secure_store;

pub use secure_store::{Entry, SecureStore};
