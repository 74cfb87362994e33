//! # logtable
//!
//! Materialized key-value tables derived from an ordered message channel.
//!
//! ## Core Concepts
//!
//! - **Store**: byte-keyed map behind a trait; per-key linearizable
//! - **Transport**: ordered, append-only channels with durable consumers
//! - **Table**: subscribes to a channel with full replay and folds every
//!   message into its store through a caller-supplied update function
//!
//! ## Example
//!
//! ```
//! use logtable::{MemoryTransport, Message, Store, Table, TableConfig, Transport};
//! use std::sync::Arc;
//!
//! let transport = MemoryTransport::new();
//! transport.publish("colors", b"bob=blue").unwrap();
//!
//! let table = Table::new(Arc::new(transport.clone()), TableConfig::new("colors"))
//!     .with_update_fn(|store: &dyn Store, msg: &Message| {
//!         if let Some(i) = msg.payload.iter().position(|b| *b == b'=') {
//!             let _ = store.set(&msg.payload[..i], &msg.payload[i + 1..]);
//!         }
//!     });
//! table.open().unwrap();
//!
//! // Delivery is asynchronous; wait for the backlog to be applied.
//! while table.position().0 < 1 {
//!     std::thread::yield_now();
//! }
//! assert_eq!(table.get(b"bob").unwrap(), b"blue");
//! table.close().unwrap();
//! ```

pub mod error;
pub mod store;
pub mod table;
pub mod transport;
pub mod types;

// Re-exports
pub use error::{Result, TableError};
pub use store::{MemStore, Store};
pub use table::{Table, TableConfig, TableState, UpdateFn};
pub use transport::{
    Handler, MemorySubscription, MemoryTransport, StartPosition, SubscribeOptions, Subscription,
    SubscriptionId, Transport,
};
pub use types::{Message, Sequence, Timestamp};
