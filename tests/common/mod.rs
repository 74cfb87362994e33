#![allow(dead_code)]

use logtable::{
    MemoryTransport, Message, Sequence, Store, Table, TableConfig, TableError, Transport,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

static NEXT_CHANNEL: AtomicUsize = AtomicUsize::new(0);

/// A channel name unique within this test binary.
pub fn fresh_channel(prefix: &str) -> String {
    format!("{prefix}-{}", NEXT_CHANNEL.fetch_add(1, Ordering::SeqCst))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KvPair {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A set (with value) or a delete (without).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KvOp {
    pub key: String,
    pub value: Option<String>,
}

pub fn publish_kv(transport: &MemoryTransport, channel: &str, key: &str, value: &str) -> Sequence {
    let pair = KvPair {
        key: key.to_string(),
        value: value.to_string(),
    };
    transport
        .publish(channel, &serde_json::to_vec(&pair).unwrap())
        .unwrap()
}

pub fn publish_op(transport: &MemoryTransport, channel: &str, op: &KvOp) -> Sequence {
    transport
        .publish(channel, &serde_json::to_vec(op).unwrap())
        .unwrap()
}

/// Last write wins per key.
pub fn kv_update(store: &dyn Store, msg: &Message) {
    let pair: KvPair = serde_json::from_slice(msg.data()).unwrap();
    store.set(pair.key.as_bytes(), pair.value.as_bytes()).unwrap();
}

/// Applies a [`KvOp`]; deleting an absent key is a no-op.
pub fn op_update(store: &dyn Store, msg: &Message) {
    let op: KvOp = serde_json::from_slice(msg.data()).unwrap();
    match op.value {
        Some(value) => store.set(op.key.as_bytes(), value.as_bytes()).unwrap(),
        None => match store.del(op.key.as_bytes()) {
            Ok(()) | Err(TableError::NotFound) => {}
            Err(e) => panic!("unexpected delete error: {e}"),
        },
    }
}

pub fn kv_table(transport: &MemoryTransport, config: TableConfig) -> Table {
    Table::new(Arc::new(transport.clone()), config).with_update_fn(kv_update)
}

/// Block until the table has applied `sequence`.
pub fn wait_for_position(table: &Table, sequence: Sequence) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while table.position() < sequence {
        assert!(
            Instant::now() < deadline,
            "timed out at {:?} waiting for {:?}",
            table.position(),
            sequence
        );
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn expect_value(table: &Table, key: &str, expected: &str) {
    let actual = table.get(key.as_bytes()).unwrap();
    assert_eq!(String::from_utf8(actual).unwrap(), expected);
}

pub fn expect_nothing(table: &Table, key: &str) {
    match table.get(key.as_bytes()) {
        Err(TableError::NotFound) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(v) => panic!("expected nothing, got {:?}", String::from_utf8_lossy(&v)),
    }
}
