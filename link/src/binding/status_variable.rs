//! Reference-counted binding to one status variable.
//!
//! Any number of consumers may bind the same variable; the network `bind`
//! goes out once, and the network `unbind` only when the last consumer
//! lets go. When the connection drops, the live count is parked as
//! "stale" and restored with a single re-bind once it comes back.

use crate::{
    dispatcher::CommandDispatcher,
    error::Result,
    models::{RequestAddress, SessionSync},
    store::{BindingStore, ValueListener},
};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Network operation in flight for a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOp {
    #[default]
    None,
    Binding,
    Unbinding,
}

/// Snapshot of a binding's counters.
///
/// `active` and `stale` are never both non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingCounts {
    /// Consumers currently bound on a live connection
    pub active: u32,
    /// Consumers waiting to be re-bound after a reconnect
    pub stale: u32,
    pub pending: PendingOp,
}

impl BindingCounts {
    /// Book a successful network unbind of the last binding. The session
    /// may have ended while the unbind was in flight, parking that binding
    /// as stale.
    fn release_last(&mut self) {
        if self.active > 0 {
            self.active -= 1;
        } else {
            self.stale = self.stale.saturating_sub(1);
        }
    }
}

struct VariableInner {
    address: RequestAddress,
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<BindingStore>,
    rebind_delay: Duration,
    counts: Mutex<BindingCounts>,
    /// Serializes every transition that involves a network call
    transition: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for VariableInner {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = watcher.take() {
            handle.abort();
        }
    }
}

impl VariableInner {
    fn counts(&self) -> MutexGuard<'_, BindingCounts> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_stale(&self) {
        let mut counts = self.counts();
        if counts.active > 0 {
            log::debug!("[place-link] Setting binding as stale: {}", self.address);
            counts.stale = counts.active;
            counts.active = 0;
        }
    }

    async fn rebind(&self) {
        let _transition = self.transition.lock().await;
        {
            let mut counts = self.counts();
            if counts.stale == 0 || counts.active > 0 {
                return;
            }
            counts.pending = PendingOp::Binding;
        }
        log::debug!("[place-link] Re-binding to status variable: {}", self.address);
        let result = self.dispatcher.bind(&self.address).await;
        let mut counts = self.counts();
        counts.pending = PendingOp::None;
        match result {
            Ok(_) => {
                counts.active = counts.stale;
                counts.stale = 0;
            },
            Err(e) => log::warn!("[place-link] Re-bind of {} failed: {}", self.address, e),
        }
    }
}

/// Follow the connection: park bindings when a session ends, re-bind them
/// `rebind_delay` after the next one opens.
///
/// Session ends are read from the sync stream as well as the status stream,
/// so a drop and reconnect that coalesce into one status change are still
/// seen.
async fn watch_connection(
    inner: Weak<VariableInner>,
    mut status: watch::Receiver<bool>,
    mut sync: watch::Receiver<SessionSync>,
) {
    loop {
        let mut session_ended = tokio::select! {
            changed = sync.changed() => {
                if changed.is_err() {
                    return;
                }
                true
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
                false
            }
        };
        if sync.has_changed().unwrap_or(false) {
            sync.borrow_and_update();
            session_ended = true;
        }
        let connected = *status.borrow_and_update();

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if session_ended || !connected {
            inner.mark_stale();
        }
        if !connected || inner.counts().stale == 0 {
            continue;
        }
        tokio::time::sleep(inner.rebind_delay).await;
        if *status.borrow() {
            inner.rebind().await;
        }
    }
}

/// Handle to one status variable of a module.
///
/// Clones share the same counters.
#[derive(Clone)]
pub struct VariableBinding {
    inner: Arc<VariableInner>,
}

impl fmt::Debug for VariableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableBinding")
            .field("address", &self.inner.address)
            .field("counts", &self.counts())
            .finish()
    }
}

impl VariableBinding {
    pub(crate) fn new(
        address: RequestAddress,
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<BindingStore>,
        rebind_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                address,
                dispatcher,
                store,
                rebind_delay,
                counts: Mutex::new(BindingCounts::default()),
                transition: tokio::sync::Mutex::new(()),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Status variable name.
    pub fn name(&self) -> &str {
        &self.inner.address.name
    }

    pub fn address(&self) -> &RequestAddress {
        &self.inner.address
    }

    pub fn counts(&self) -> BindingCounts {
        *self.inner.counts()
    }

    /// Number of live bindings.
    pub fn count(&self) -> u32 {
        self.counts().active
    }

    /// Latest known value.
    pub fn value(&self) -> Option<JsonValue> {
        self.inner.store.value(&self.inner.address)
    }

    /// Value stream (replays the latest value).
    pub fn listen(&self) -> ValueListener {
        self.inner.store.listen(&self.inner.address)
    }

    fn ensure_watcher(&self) {
        let mut watcher = self.inner.watcher.lock().unwrap_or_else(|e| e.into_inner());
        if watcher.is_none() {
            let transport = self.inner.dispatcher.transport();
            let inner = Arc::downgrade(&self.inner);
            *watcher = Some(tokio::spawn(watch_connection(
                inner,
                transport.status(),
                transport.sync(),
            )));
        }
    }

    fn guard(&self) -> BindingGuard {
        BindingGuard {
            binding: Some(self.clone()),
        }
    }

    /// Bind the variable and return the guard that releases this binding.
    ///
    /// Only the first binding (or a binding while stale) goes to the
    /// network; concurrent calls wait for that single request.
    pub async fn bind(&self) -> Result<BindingGuard> {
        self.bind_with_timeout(None).await
    }

    /// [`bind`](Self::bind) with a bound on the network request (`None`
    /// waits indefinitely). A timed-out bind leaves the counts untouched.
    pub async fn bind_with_timeout(&self, timeout: Option<Duration>) -> Result<BindingGuard> {
        self.ensure_watcher();
        {
            let mut counts = self.inner.counts();
            if counts.active > 0 && counts.pending == PendingOp::None {
                counts.active += 1;
                return Ok(self.guard());
            }
        }

        let _transition = self.inner.transition.lock().await;
        {
            let mut counts = self.inner.counts();
            if counts.active > 0 {
                counts.active += 1;
                return Ok(self.guard());
            }
            counts.pending = PendingOp::Binding;
        }

        let result = self
            .inner
            .dispatcher
            .bind_with_timeout(&self.inner.address, timeout)
            .await;
        let mut counts = self.inner.counts();
        counts.pending = PendingOp::None;
        result?;
        counts.active = counts.stale + 1;
        counts.stale = 0;
        Ok(self.guard())
    }

    /// Release one binding. The network unbind is sent when the last live
    /// binding goes away.
    pub async fn unbind(&self) -> Result<()> {
        self.unbind_with_timeout(None).await
    }

    /// [`unbind`](Self::unbind) with a bound on the network request.
    pub async fn unbind_with_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        {
            let mut counts = self.inner.counts();
            if counts.active > 1 && counts.pending == PendingOp::None {
                counts.active -= 1;
                return Ok(());
            }
        }

        let _transition = self.inner.transition.lock().await;
        {
            let mut counts = self.inner.counts();
            match counts.active {
                0 => {
                    counts.stale = counts.stale.saturating_sub(1);
                    return Ok(());
                },
                1 => counts.pending = PendingOp::Unbinding,
                _ => {
                    counts.active -= 1;
                    return Ok(());
                },
            }
        }

        let result = self
            .inner
            .dispatcher
            .unbind_with_timeout(&self.inner.address, timeout)
            .await;
        let mut counts = self.inner.counts();
        counts.pending = PendingOp::None;
        result?;
        counts.release_last();
        Ok(())
    }
}

/// Releases one binding of a [`VariableBinding`].
///
/// Call [`release`](Self::release) to wait for the unbind. Dropping the
/// guard releases in the background.
#[must_use = "dropping the guard releases the binding"]
pub struct BindingGuard {
    binding: Option<VariableBinding>,
}

impl fmt::Debug for BindingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingGuard")
            .field("address", &self.binding.as_ref().map(|b| b.address().to_string()))
            .finish()
    }
}

impl BindingGuard {
    pub async fn release(mut self) -> Result<()> {
        match self.binding.take() {
            Some(binding) => binding.unbind().await,
            None => Ok(()),
        }
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = binding.unbind().await {
                        log::warn!("[place-link] Unbind of {} failed: {}", binding.address(), e);
                    }
                });
            },
            Err(_) => {
                log::warn!(
                    "[place-link] Binding guard for {} dropped outside a runtime; unbind skipped",
                    binding.address()
                );
            },
        }
    }
}
