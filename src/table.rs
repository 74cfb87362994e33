//! Tables: a store kept up to date by folding a channel into it.

use crate::error::{Result, TableError};
use crate::store::{MemStore, Store};
use crate::transport::{Handler, SubscribeOptions, Subscription, Transport};
use crate::types::{Message, Sequence};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

/// Applies one message to the store.
///
/// Called from the transport's delivery thread, one message at a time, in
/// channel order. Replays are deterministic only if the function depends on
/// nothing but the store and the message.
pub type UpdateFn = Arc<dyn Fn(&dyn Store, &Message) + Send + Sync>;

/// Table configuration.
#[derive(Clone, Debug, Default)]
pub struct TableConfig {
    /// Channel to materialize.
    pub channel: String,

    /// Durable consumer name. An empty name counts as none.
    pub durable_name: Option<String>,
}

impl TableConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            durable_name: None,
        }
    }

    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }
}

/// Lifecycle of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableState {
    Unopened,
    Open,
    /// Closed; a durable position is kept by the transport.
    Closed,
    /// Unsubscribed; the durable position is gone.
    Unsubscribed,
}

/// A materialized key-value view of a channel.
///
/// Opening the table subscribes to the channel with full replay; every
/// delivered message is passed, with the store, to the update function.
/// Reads go straight to the store and reflect everything applied so far.
///
/// The update function may close its own table. If it panics, the
/// transport stops delivering but the table still reports itself open; a
/// `warn!` line is the only signal.
pub struct Table {
    config: TableConfig,
    transport: Arc<dyn Transport>,
    update: Option<UpdateFn>,
    /// Set by the caller or lazily by the first `open`.
    store: OnceLock<Arc<dyn Store>>,
    progress: Arc<Mutex<Progress>>,
    sub: Mutex<SubSlot>,
    state: RwLock<TableState>,
}

/// Applied position of the current subscription session.
#[derive(Debug, Default)]
struct Progress {
    /// Bumped whenever `applied` is reset; late updates from an older
    /// session are not recorded.
    session: u64,
    applied: Sequence,
}

enum SubSlot {
    Empty,
    Active(Box<dyn Subscription>),
    /// Taken out by a teardown in progress.
    Closing,
}

impl Table {
    /// Create an unopened table. Nothing is validated until `open`.
    pub fn new(transport: Arc<dyn Transport>, config: TableConfig) -> Self {
        Self {
            config,
            transport,
            update: None,
            store: OnceLock::new(),
            progress: Arc::new(Mutex::new(Progress::default())),
            sub: Mutex::new(SubSlot::Empty),
            state: RwLock::new(TableState::Unopened),
        }
    }

    /// Use `store` instead of a fresh in-memory one.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = OnceLock::from(store);
        self
    }

    /// Set the update function.
    pub fn with_update_fn<F>(mut self, update: F) -> Self
    where
        F: Fn(&dyn Store, &Message) + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(update));
        self
    }

    /// Subscribe to the channel and start applying messages.
    ///
    /// Returns once the transport has accepted the subscription; delivery
    /// runs in the background. Fails with [`TableError::AlreadyOpen`] while a
    /// subscription is active and with [`TableError::UpdateFnRequired`]
    /// before any subscription attempt. Transport errors are returned as-is
    /// and leave the table as it was, so `open` can be retried.
    pub fn open(&self) -> Result<()> {
        let mut sub = self.sub.lock();
        if !matches!(*sub, SubSlot::Empty) {
            return Err(TableError::AlreadyOpen);
        }
        let update = self.update.clone().ok_or(TableError::UpdateFnRequired)?;

        let store = Arc::clone(self.store.get_or_init(|| {
            debug!(channel = %self.config.channel, "no store configured, using in-memory store");
            let default: Arc<dyn Store> = Arc::new(MemStore::new());
            default
        }));

        let progress = Arc::clone(&self.progress);
        let session = progress.lock().session;
        let channel = self.config.channel.clone();
        let handler: Handler = Arc::new(move |msg: &Message| {
            update(&*store, msg);
            let mut progress = progress.lock();
            if progress.session == session {
                progress.applied = msg.sequence;
            }
            drop(progress);
            trace!(channel = %channel, sequence = %msg.sequence, "applied message");
        });

        let mut options = SubscribeOptions::deliver_all_available();
        options.durable_name = self.durable_name().map(str::to_string);

        let subscription = self
            .transport
            .subscribe(&self.config.channel, handler, options)?;
        debug!(
            channel = %self.config.channel,
            durable = ?durable_name_of(&self.config),
            id = %subscription.id(),
            "table opened"
        );

        *sub = SubSlot::Active(subscription);
        *self.state.write() = TableState::Open;
        Ok(())
    }

    /// Stop delivery, keeping any durable position in the transport.
    ///
    /// A later `open` with the same durable name resumes after the last
    /// applied message. Blocks until the in-flight update, if any, is done.
    pub fn close(&self) -> Result<()> {
        self.teardown(false)
    }

    /// Stop delivery and discard the durable position.
    ///
    /// A later `open` replays the channel from the beginning, so the
    /// position goes back to `Sequence(0)`.
    pub fn unsubscribe(&self) -> Result<()> {
        self.teardown(true)
    }

    /// The handle is taken out of the slot while the transport tears it
    /// down, so the lock is never held across the join of the delivery
    /// thread. On failure the handle goes back and the table stays open.
    fn teardown(&self, discard: bool) -> Result<()> {
        let mut subscription = {
            let mut sub = self.sub.lock();
            match std::mem::replace(&mut *sub, SubSlot::Closing) {
                SubSlot::Active(subscription) => subscription,
                other => {
                    *sub = other;
                    return Err(TableError::NotOpen);
                }
            }
        };

        let result = if discard {
            subscription.unsubscribe()
        } else {
            subscription.close()
        };

        let mut sub = self.sub.lock();
        if let Err(e) = result {
            *sub = SubSlot::Active(subscription);
            return Err(e);
        }
        *sub = SubSlot::Empty;

        // The next open replays from the start unless the transport kept a
        // durable position.
        if discard || self.durable_name().is_none() {
            let mut progress = self.progress.lock();
            progress.session += 1;
            progress.applied = Sequence(0);
        }

        let next = if discard {
            TableState::Unsubscribed
        } else {
            TableState::Closed
        };
        *self.state.write() = next;
        drop(sub);
        debug!(channel = %self.config.channel, state = ?next, "table closed");
        Ok(())
    }

    /// Look up `key` in the store.
    ///
    /// Works in every state. A table that was never opened and has no
    /// caller-supplied store has nothing to find.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.store.get() {
            Some(store) => store.get(key),
            None => Err(TableError::NotFound),
        }
    }

    /// The attached store, if one exists yet.
    pub fn store(&self) -> Option<Arc<dyn Store>> {
        self.store.get().cloned()
    }

    pub fn state(&self) -> TableState {
        *self.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.state() == TableState::Open
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    pub fn durable_name(&self) -> Option<&str> {
        durable_name_of(&self.config)
    }

    /// Sequence of the last applied message, `Sequence(0)` if none.
    ///
    /// Reset to `Sequence(0)` whenever the next open will replay from the
    /// beginning: after `unsubscribe`, and after `close` without a durable
    /// name.
    pub fn position(&self) -> Sequence {
        self.progress.lock().applied
    }
}

fn durable_name_of(config: &TableConfig) -> Option<&str> {
    config.durable_name.as_deref().filter(|name| !name.is_empty())
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("channel", &self.config.channel)
            .field("durable_name", &self.config.durable_name)
            .field("state", &self.state())
            .field("position", &self.position())
            .finish()
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        let slot = std::mem::replace(self.sub.get_mut(), SubSlot::Empty);
        if let SubSlot::Active(mut subscription) = slot {
            if let Err(e) = subscription.close() {
                warn!(channel = %self.config.channel, error = %e, "failed to close table on drop");
            }
        }
    }
}
