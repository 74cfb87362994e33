//! Ordered-channel transport contract.
//!
//! Tables consume a transport only through these traits:
//! - `subscribe` registers a handler on a channel and returns a handle
//! - `publish` appends a payload to a channel
//! - the handle is torn down with `close` (durable position kept) or
//!   `unsubscribe` (durable position discarded)
//!
//! A transport must hand messages of one subscription to its handler one at
//! a time, in channel order.
//!
//! [`MemoryTransport`] is an in-process implementation with a retained log
//! per channel and durable consumer positions.
//!
//! # Example
//!
//! ```
//! use logtable::{MemoryTransport, Message, SubscribeOptions, Transport};
//! use std::sync::Arc;
//!
//! let transport = MemoryTransport::new();
//! transport.publish("colors", b"blue").unwrap();
//!
//! let mut sub = transport
//!     .subscribe(
//!         "colors",
//!         Arc::new(|msg: &Message| println!("{}: {:?}", msg.sequence, msg.payload)),
//!         SubscribeOptions::deliver_all_available(),
//!     )
//!     .unwrap();
//! sub.close().unwrap();
//! ```

mod memory;
mod types;

pub use memory::{MemorySubscription, MemoryTransport};
pub use types::{Handler, StartPosition, SubscribeOptions, SubscriptionId};

use crate::error::Result;
use crate::types::Sequence;

/// A live subscription owned by whoever called `subscribe`.
pub trait Subscription: Send {
    fn id(&self) -> SubscriptionId;

    /// Stop delivery. A durable position, if any, is retained.
    fn close(&mut self) -> Result<()>;

    /// Stop delivery and forget the durable position.
    fn unsubscribe(&mut self) -> Result<()>;
}

/// An ordered, append-only channel transport.
pub trait Transport: Send + Sync {
    /// Start delivering `channel` to `handler`.
    ///
    /// Returns once the subscription is registered; delivery continues
    /// asynchronously.
    fn subscribe(
        &self,
        channel: &str,
        handler: Handler,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>>;

    /// Append `payload` to `channel` and return its sequence.
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<Sequence>;
}
