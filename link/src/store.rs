//! Latest-value store for bound status variables.
//!
//! One entry per [`RequestAddress`]: the latest value plus a broadcast
//! channel that fans every `notify` out to listeners. Entries are created
//! lazily by whichever comes first, a listener or a `notify` frame, and live
//! until [`BindingStore::reset`].

use crate::models::RequestAddress;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Values a listener may fall behind by before it starts skipping.
pub const LISTENER_CAPACITY: usize = 256;

#[derive(Debug)]
struct Entry {
    latest: Option<JsonValue>,
    tx: broadcast::Sender<JsonValue>,
}

impl Entry {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(LISTENER_CAPACITY);
        Self { latest: None, tx }
    }
}

/// Latest known value per status variable.
#[derive(Debug, Default)]
pub struct BindingStore {
    entries: Mutex<HashMap<RequestAddress, Entry>>,
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestAddress, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to values of `address`.
    ///
    /// The listener first yields the latest value (`None` when nothing has
    /// been received yet), then every later notification in arrival order.
    pub fn listen(&self, address: &RequestAddress) -> ValueListener {
        let mut entries = self.lock();
        let entry = entries.entry(address.clone()).or_insert_with(Entry::new);
        ValueListener {
            address: address.clone(),
            replay: Some(entry.latest.clone()),
            rx: entry.tx.subscribe(),
        }
    }

    /// Latest value of `address`, `None` when absent.
    pub fn value(&self, address: &RequestAddress) -> Option<JsonValue> {
        self.lock().get(address).and_then(|entry| entry.latest.clone())
    }

    /// Publish a new value for `address`, creating the entry if needed.
    pub fn notify(&self, address: &RequestAddress, value: JsonValue) {
        let mut entries = self.lock();
        let entry = entries.entry(address.clone()).or_insert_with(Entry::new);
        log::debug!(
            "[place-link] [NOTIFY] {}, {}, {} changed: {:?} -> {}",
            address.sys,
            address.module_id(),
            address.name,
            entry.latest.as_ref(),
            value
        );
        entry.latest = Some(value.clone());
        // No listeners is fine; the value is still kept for replay.
        let _ = entry.tx.send(value);
    }

    /// Number of tracked status variables.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry. Existing listeners reach end of stream.
    pub fn reset(&self) {
        self.lock().clear();
    }
}

/// Value stream of one status variable, returned by [`BindingStore::listen`].
#[derive(Debug)]
pub struct ValueListener {
    address: RequestAddress,
    replay: Option<Option<JsonValue>>,
    rx: broadcast::Receiver<JsonValue>,
}

impl ValueListener {
    pub fn address(&self) -> &RequestAddress {
        &self.address
    }

    /// Receive the next value.
    ///
    /// The first call returns the value current at subscription time.
    /// Returns `None` once the store has been reset.
    pub async fn next(&mut self) -> Option<Option<JsonValue>> {
        if let Some(current) = self.replay.take() {
            return Some(current);
        }
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(Some(value)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "[place-link] Listener for {} fell behind, skipped {} value(s)",
                        self.address,
                        skipped
                    );
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive values until one matches `predicate` and return it.
    ///
    /// Returns `None` if the stream ends first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&Option<JsonValue>) -> bool,
    ) -> Option<Option<JsonValue>> {
        while let Some(value) = self.next().await {
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }
}
