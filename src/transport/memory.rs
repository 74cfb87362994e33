//! In-process transport with retained channel logs and durable consumers.

use crate::error::{Result, TableError};
use crate::types::{Message, Sequence, Timestamp};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

use super::types::{Handler, StartPosition, SubscribeOptions, SubscriptionId};
use super::{Subscription, Transport};

/// Retained messages of one channel plus the wakers of its subscribers.
#[derive(Default)]
struct ChannelLog {
    messages: RwLock<Vec<Arc<Message>>>,
    /// Wakeup senders, bounded(1). A full buffer already means "look again".
    waiters: Mutex<HashMap<SubscriptionId, Sender<()>>>,
}

impl ChannelLog {
    /// Message at `sequence`, if retained.
    fn get(&self, sequence: Sequence) -> Option<Arc<Message>> {
        let index = sequence.0.checked_sub(1)? as usize;
        self.messages.read().get(index).cloned()
    }

    fn head(&self) -> Sequence {
        Sequence(self.messages.read().len() as u64)
    }

    fn wake_all(&self) {
        for waker in self.waiters.lock().values() {
            let _ = waker.try_send(());
        }
    }
}

/// Position of a durable consumer.
#[derive(Clone, Copy, Debug, Default)]
struct DurableState {
    /// Last message whose handler returned.
    acked: Sequence,
    /// Last message handed to a handler, acknowledged or not.
    delivered: Sequence,
    /// A subscription currently holds this durable name.
    active: bool,
}

type DurableKey = (String, String);

struct Inner {
    channels: RwLock<HashMap<String, Arc<ChannelLog>>>,
    durables: Mutex<HashMap<DurableKey, DurableState>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn channel(&self, name: &str) -> Arc<ChannelLog> {
        if let Some(log) = self.channels.read().get(name) {
            return Arc::clone(log);
        }
        Arc::clone(self.channels.write().entry(name.to_string()).or_default())
    }

    fn ack(&self, key: &Option<DurableKey>, sequence: Sequence) {
        if let Some(key) = key {
            if let Some(state) = self.durables.lock().get_mut(key) {
                state.acked = sequence;
            }
        }
    }

    fn mark_delivered(&self, key: &Option<DurableKey>, sequence: Sequence) {
        if let Some(key) = key {
            if let Some(state) = self.durables.lock().get_mut(key) {
                state.delivered = state.delivered.max(sequence);
            }
        }
    }
}

/// Transport that keeps every channel in memory.
///
/// Cloning yields another handle to the same channels.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: RwLock::new(HashMap::new()),
                durables: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Refuse further subscribe and publish calls.
    ///
    /// Existing subscriptions keep delivering what is already retained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        debug!("memory transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of messages retained on `channel`.
    pub fn message_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .get(channel)
            .map_or(0, |log| log.messages.read().len())
    }

    /// Last acknowledged sequence of a durable consumer, if it exists.
    pub fn durable_position(&self, channel: &str, durable_name: &str) -> Option<Sequence> {
        self.inner
            .durables
            .lock()
            .get(&(channel.to_string(), durable_name.to_string()))
            .map(|state| state.acked)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TableError::TransportClosed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn subscribe(
        &self,
        channel: &str,
        handler: Handler,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        self.check_open()?;

        let log = self.inner.channel(channel);
        let fresh_cursor = match options.start {
            StartPosition::AllAvailable => Sequence(0),
            StartPosition::NewOnly => log.head(),
            StartPosition::AtSequence(seq) => seq.prev().unwrap_or_default(),
        };

        // Cursor is the last sequence considered handled.
        let durable_key = options
            .durable_name
            .as_ref()
            .map(|name| (channel.to_string(), name.clone()));
        let (cursor, redeliver_upto) = match &durable_key {
            Some(key) => {
                let mut durables = self.inner.durables.lock();
                let state = durables.entry(key.clone()).or_insert(DurableState {
                    acked: fresh_cursor,
                    delivered: fresh_cursor,
                    active: false,
                });
                if state.active {
                    return Err(TableError::DurableInUse {
                        channel: key.0.clone(),
                        durable_name: key.1.clone(),
                    });
                }
                state.active = true;
                debug!(channel, durable = %key.1, acked = %state.acked, "resuming durable subscription");
                (state.acked, state.delivered)
            }
            None => (fresh_cursor, fresh_cursor),
        };

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (wake_tx, wake_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        // Register before the first read so no publish can slip past unseen.
        log.waiters.lock().insert(id, wake_tx);

        let worker = DeliveryWorker {
            id,
            log: Arc::clone(&log),
            inner: Arc::clone(&self.inner),
            handler,
            durable_key: durable_key.clone(),
            cursor,
            redeliver_upto,
            wake_rx,
            stop_rx,
        };
        let spawned = thread::Builder::new()
            .name(format!("logtable-{id}"))
            .spawn(move || worker.run());

        let thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log.waiters.lock().remove(&id);
                if let Some(key) = &durable_key {
                    if let Some(state) = self.inner.durables.lock().get_mut(key) {
                        state.active = false;
                    }
                }
                return Err(TableError::Io(e));
            }
        };

        debug!(%id, channel, from = %cursor.next(), "subscription started");

        Ok(Box::new(MemorySubscription {
            id,
            channel: channel.to_string(),
            log,
            inner: Arc::clone(&self.inner),
            durable_key,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }

    fn publish(&self, channel: &str, payload: &[u8]) -> Result<Sequence> {
        self.check_open()?;

        let log = self.inner.channel(channel);
        let sequence = {
            let mut messages = log.messages.write();
            let sequence = Sequence(messages.len() as u64 + 1);
            messages.push(Arc::new(Message {
                channel: channel.to_string(),
                sequence,
                timestamp: Timestamp::now(),
                payload: payload.to_vec(),
                redelivered: false,
            }));
            sequence
        };
        log.wake_all();

        trace!(channel, %sequence, bytes = payload.len(), "published");
        Ok(sequence)
    }
}

/// State owned by a subscription's delivery thread.
struct DeliveryWorker {
    id: SubscriptionId,
    log: Arc<ChannelLog>,
    inner: Arc<Inner>,
    handler: Handler,
    durable_key: Option<DurableKey>,
    cursor: Sequence,
    /// Messages up to here were handed out before and never acknowledged.
    redeliver_upto: Sequence,
    wake_rx: Receiver<()>,
    stop_rx: Receiver<()>,
}

impl DeliveryWorker {
    fn run(mut self) {
        loop {
            while let Some(msg) = self.log.get(self.cursor.next()) {
                if self.stopped() {
                    return;
                }
                if !self.deliver(msg) {
                    return;
                }
            }

            select! {
                recv(self.stop_rx) -> _ => return,
                recv(self.wake_rx) -> _ => {}
            }
        }
    }

    /// The stop sender is dropped on teardown; nothing is ever sent on it.
    fn stopped(&self) -> bool {
        matches!(self.stop_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Hand one message to the handler. Returns false if the handler
    /// panicked, which ends delivery for this subscription.
    fn deliver(&mut self, msg: Arc<Message>) -> bool {
        let sequence = msg.sequence;
        let msg = if sequence <= self.redeliver_upto {
            let mut again = (*msg).clone();
            again.redelivered = true;
            Arc::new(again)
        } else {
            msg
        };

        self.inner.mark_delivered(&self.durable_key, sequence);
        let handler = &*self.handler;
        if catch_unwind(AssertUnwindSafe(|| handler(&*msg))).is_err() {
            warn!(id = %self.id, %sequence, "handler panicked, stopping delivery");
            return false;
        }

        self.cursor = sequence;
        self.inner.ack(&self.durable_key, sequence);
        trace!(id = %self.id, %sequence, "delivered");
        true
    }
}

/// Handle returned by [`MemoryTransport::subscribe`].
pub struct MemorySubscription {
    id: SubscriptionId,
    channel: String,
    log: Arc<ChannelLog>,
    inner: Arc<Inner>,
    durable_key: Option<DurableKey>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MemorySubscription {
    fn teardown(&mut self, keep_durable: bool) -> Result<()> {
        let stop_tx = self.stop_tx.take().ok_or_else(|| {
            TableError::Transport(format!("subscription {} already closed", self.id))
        })?;
        drop(stop_tx);
        self.log.waiters.lock().remove(&self.id);

        if let Some(worker) = self.thread.take() {
            // Closing from inside the handler: the worker exits on its own
            // once the handler returns.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                warn!(id = %self.id, "delivery thread panicked");
            }
        }

        if let Some(key) = &self.durable_key {
            let mut durables = self.inner.durables.lock();
            if keep_durable {
                if let Some(state) = durables.get_mut(key) {
                    state.active = false;
                }
            } else {
                durables.remove(key);
            }
        }

        debug!(id = %self.id, channel = %self.channel, keep_durable, "subscription stopped");
        Ok(())
    }
}

impl Subscription for MemorySubscription {
    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn close(&mut self) -> Result<()> {
        self.teardown(true)
    }

    fn unsubscribe(&mut self) -> Result<()> {
        self.teardown(false)
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if self.stop_tx.is_some() {
            if let Err(e) = self.teardown(true) {
                warn!(id = %self.id, error = %e, "failed to close subscription on drop");
            }
        }
    }
}
