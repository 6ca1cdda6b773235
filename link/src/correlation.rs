//! Correlation of outbound commands with their responses.
//!
//! Every in-flight command is keyed by a signature built from its content
//! and the current dedup time bucket, so identical requests issued close
//! together share one network round trip. Responses are matched back by wire
//! id. Each entry is settled exactly once, whichever comes first of
//! response, timeout or [`RequestTable::clear`].

use crate::error::{PlaceLinkError, Result};
use crate::models::CommandRequest;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Receives the outcome of a registered request.
pub type ResponseReceiver = oneshot::Receiver<Result<JsonValue>>;

struct PendingRequest {
    seq: u64,
    id: u64,
    waiters: Vec<oneshot::Sender<Result<JsonValue>>>,
    timeout: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn settle(self, outcome: Result<JsonValue>) {
        if let Some(handle) = self.timeout {
            handle.abort();
        }
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[derive(Default)]
struct TableState {
    entries: HashMap<String, PendingRequest>,
    next_seq: u64,
}

/// Outcome of [`RequestTable::register`].
pub struct Registration {
    /// Resolves with the shared outcome of the request.
    pub receiver: ResponseReceiver,
    /// `Some(seq)` when this call created the entry and is responsible for
    /// delivering the frame. `None` when it joined an in-flight request.
    pub created: Option<u64>,
}

/// Table of in-flight requests, at most one per signature.
#[derive(Clone, Default)]
pub struct RequestTable {
    state: Arc<Mutex<TableState>>,
}

impl std::fmt::Debug for RequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTable")
            .field("pending", &self.len())
            .finish()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Signature of `request` within the dedup window containing `now_ms`.
    ///
    /// Built from command, address, JSON-encoded args and the time bucket;
    /// the wire id is not part of it. A zero window drops the bucket
    /// component.
    pub fn signature_at(request: &CommandRequest, window: Duration, now_ms: u64) -> String {
        let args = match &request.args {
            Some(args) => serde_json::to_string(args).unwrap_or_default(),
            None => String::new(),
        };
        let window_ms = window.as_millis() as u64;
        let bucket = if window_ms == 0 { 0 } else { now_ms / window_ms };
        format!(
            "{}|{}|{}|{}|{}|{}",
            request.cmd,
            request.address.sys,
            request.address.module_id(),
            request.address.name,
            args,
            bucket
        )
    }

    /// Signature of `request` at the current time.
    pub fn signature(request: &CommandRequest, window: Duration) -> String {
        Self::signature_at(request, window, now_ms())
    }

    /// Join the pending request for `signature`, or create it with wire id
    /// `id` when there is none.
    pub fn register(&self, signature: &str, id: u64) -> Registration {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(signature) {
            entry.waiters.push(tx);
            return Registration {
                receiver: rx,
                created: None,
            };
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.entries.insert(
            signature.to_string(),
            PendingRequest {
                seq,
                id,
                waiters: vec![tx],
                timeout: None,
            },
        );
        Registration {
            receiver: rx,
            created: Some(seq),
        }
    }

    /// Reject the entry created as `seq` with a timeout after `timeout`.
    ///
    /// The timer is bound to `seq`, so it never touches a later entry that
    /// reuses the same signature.
    pub fn arm_timeout(&self, signature: &str, seq: u64, timeout: Duration) {
        let table = self.clone();
        let key = signature.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(&key, seq);
        });

        let mut state = self.lock();
        match state.entries.get_mut(signature) {
            Some(entry) if entry.seq == seq => entry.timeout = Some(handle),
            _ => handle.abort(),
        }
    }

    fn expire(&self, signature: &str, seq: u64) {
        let entry = {
            let mut state = self.lock();
            match state.entries.get(signature) {
                Some(entry) if entry.seq == seq => state.entries.remove(signature),
                _ => None,
            }
        };
        if let Some(mut entry) = entry {
            log::debug!(
                "[place-link] Request {} timed out ({})",
                entry.id,
                signature
            );
            // Settling from inside the timer task; the handle is this task.
            entry.timeout = None;
            entry.settle(Err(PlaceLinkError::TimeoutError));
        }
    }

    /// Whether the entry created as `seq` is still pending.
    pub fn is_pending(&self, signature: &str, seq: u64) -> bool {
        self.lock()
            .entries
            .get(signature)
            .map_or(false, |entry| entry.seq == seq)
    }

    fn take_by_id(&self, id: u64) -> Option<PendingRequest> {
        let mut state = self.lock();
        let key = state
            .entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(key, _)| key.clone())?;
        state.entries.remove(&key)
    }

    /// Settle the request with wire id `id` successfully.
    ///
    /// Returns `false` for unknown ids (late or duplicate responses).
    pub fn resolve(&self, id: u64, value: JsonValue) -> bool {
        match self.take_by_id(id) {
            Some(entry) => {
                entry.settle(Ok(value));
                true
            },
            None => false,
        }
    }

    /// Settle the request with wire id `id` with an error.
    ///
    /// Returns `false` for unknown ids.
    pub fn reject(&self, id: u64, error: PlaceLinkError) -> bool {
        match self.take_by_id(id) {
            Some(entry) => {
                entry.settle(Err(error));
                true
            },
            None => false,
        }
    }

    /// Fail every pending request with [`PlaceLinkError::ConnectionLost`].
    pub fn clear(&self) {
        let drained: Vec<PendingRequest> = {
            let mut state = self.lock();
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            log::debug!("[place-link] Clearing {} pending request(s)", drained.len());
        }
        for entry in drained {
            entry.settle(Err(PlaceLinkError::ConnectionLost));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
