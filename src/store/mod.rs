//! Key-value backends that hold a table's materialized state.
//!
//! A [`Store`] is the only shared mutable state in a table. The update
//! function writes to it while readers query it, possibly from other
//! threads, so every implementation must be linearizable per key: a `get`
//! sees the value from before or after a concurrent `set`/`del`, never a
//! partial write.
//!
//! [`MemStore`] is the reference backend. Anything that implements the
//! trait (an embedded database, a remote cache) can be attached to a table
//! instead.

mod memory;

pub use memory::MemStore;

use crate::error::Result;
use std::sync::Arc;

/// Point lookups, upserts and deletions keyed by opaque bytes.
pub trait Store: Send + Sync {
    /// Insert or overwrite the value under `key`.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Return the value under `key`, or [`TableError::NotFound`].
    ///
    /// [`TableError::NotFound`]: crate::TableError::NotFound
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Remove `key`. Returns [`TableError::NotFound`] if it was absent.
    ///
    /// [`TableError::NotFound`]: crate::TableError::NotFound
    fn del(&self, key: &[u8]) -> Result<()>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        (**self).del(key)
    }
}
