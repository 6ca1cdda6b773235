//! Command dispatch: `bind`, `unbind`, `exec`, `debug` and `ignore`.
//!
//! Each command gets a fresh wire id, is registered in the
//! [`RequestTable`] (joining an identical in-flight request when there is
//! one) and is delivered by a small task that waits for the socket.

use crate::{
    connection::Transport,
    correlation::RequestTable,
    error::{PlaceLinkError, Result},
    models::{CommandKind, CommandRequest, RequestAddress},
    timeouts::PlaceLinkTimeouts,
};
use serde_json::Value as JsonValue;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

/// Sends commands over the shared [`Transport`] and awaits their responses.
#[derive(Debug)]
pub struct CommandDispatcher {
    transport: Arc<Transport>,
    table: RequestTable,
    next_id: AtomicU64,
    dedup_window: Duration,
    send_retry_interval: Duration,
    request_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<Transport>, table: RequestTable, timeouts: &PlaceLinkTimeouts) -> Self {
        Self {
            transport,
            table,
            next_id: AtomicU64::new(0),
            dedup_window: timeouts.dedup_window,
            send_retry_interval: timeouts.send_retry_interval,
            request_timeout: timeouts.request_timeout,
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Start receiving `notify` frames for `address`.
    pub async fn bind(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.bind_with_timeout(address, None).await
    }

    pub async fn bind_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.send(CommandKind::Bind, address, None, timeout).await
    }

    /// Stop receiving `notify` frames for `address`.
    pub async fn unbind(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.unbind_with_timeout(address, None).await
    }

    pub async fn unbind_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.send(CommandKind::Unbind, address, None, timeout).await
    }

    /// Execute method `address.name` with `args`, failing after the default
    /// request timeout.
    pub async fn execute(&self, address: &RequestAddress, args: Vec<JsonValue>) -> Result<JsonValue> {
        self.execute_with_timeout(address, args, Some(self.request_timeout))
            .await
    }

    /// Execute with an explicit timeout (`None` waits indefinitely).
    pub async fn execute_with_timeout(
        &self,
        address: &RequestAddress,
        args: Vec<JsonValue>,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.send(CommandKind::Exec, address, Some(args), timeout)
            .await
    }

    /// Start streaming debug output of the module at `address`.
    pub async fn debug(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.debug_with_timeout(address, None).await
    }

    pub async fn debug_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.send(CommandKind::Debug, address, None, timeout).await
    }

    /// Stop streaming debug output of the module at `address`.
    pub async fn ignore(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.ignore_with_timeout(address, None).await
    }

    pub async fn ignore_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.send(CommandKind::Ignore, address, None, timeout).await
    }

    /// Issue `cmd` and wait for its outcome.
    pub async fn send(
        &self,
        cmd: CommandKind,
        address: &RequestAddress,
        args: Option<Vec<JsonValue>>,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut request = CommandRequest::new(id, cmd, address.clone());
        request.args = args;

        let signature = RequestTable::signature(&request, self.dedup_window);
        let registration = self.table.register(&signature, id);

        match registration.created {
            Some(seq) => {
                log::debug!(
                    "[place-link] [{}]({}) {}, {}, {}{}",
                    cmd.as_str().to_uppercase(),
                    id,
                    address.sys,
                    address.module_id(),
                    address.name,
                    request
                        .args
                        .as_ref()
                        .map(|args| format!(" {:?}", args))
                        .unwrap_or_default()
                );
                match serde_json::to_string(&request) {
                    Ok(payload) => {
                        if let Some(timeout) = timeout {
                            self.table.arm_timeout(&signature, seq, timeout);
                        }
                        tokio::spawn(deliver(
                            self.transport.clone(),
                            self.table.clone(),
                            signature,
                            seq,
                            id,
                            payload,
                            self.send_retry_interval,
                        ));
                    },
                    Err(e) => {
                        self.table.reject(id, e.into());
                    },
                }
            },
            None => {
                log::trace!("[place-link] Joined in-flight request {}", signature);
            },
        }

        registration.receiver.await.map_err(|_| {
            PlaceLinkError::InternalError("Request dropped without a response".to_string())
        })?
    }
}

/// Write `payload` once the socket is open, for as long as the request
/// created as `seq` is pending.
async fn deliver(
    transport: Arc<Transport>,
    table: RequestTable,
    signature: String,
    seq: u64,
    id: u64,
    payload: String,
    retry_interval: Duration,
) {
    loop {
        if !table.is_pending(&signature, seq) {
            return;
        }

        if transport.is_connected() {
            match transport.send(&payload) {
                Ok(()) => return,
                Err(e) => log::debug!("[place-link] Send of request {} failed: {}", id, e),
            }
        } else if !transport.is_connecting() {
            match transport.connect().await {
                Ok(()) => continue,
                Err(e @ PlaceLinkError::ConnectExhausted { .. }) => {
                    table.reject(id, e);
                    return;
                },
                Err(e) => log::debug!("[place-link] Connect for request {} failed: {}", id, e),
            }
        }

        tokio::time::sleep(retry_interval).await;
    }
}
