use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::{Condvar, Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::config::PluginConfiguration;
use crate::helpers::lastfm::ScrobbleApi;

/// Process-wide state of the scrobbler plugin.
///
/// Created once when the host starts the plugin and torn down at shutdown.
/// Handlers reach it through the registry instead of a global.
pub struct PluginState {
    /// Current configuration snapshot; replaced wholesale on updates
    config: RwLock<Arc<PluginConfiguration>>,

    api: Arc<dyn ScrobbleApi>,

    /// Caps simultaneous in-flight requests to Last.fm
    request_gate: Arc<Semaphore>,

    runtime: Handle,

    pending: Arc<PendingCalls>,
}

/// Accepted calls that have not finished yet, queued or in flight
#[derive(Default)]
struct PendingCalls {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Marks one accepted call as pending until dropped
pub struct PendingCall {
    pending: Arc<PendingCalls>,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let mut count = self.pending.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.pending.idle.notify_all();
        }
    }
}

impl PluginState {
    /// Create the state. The request gate is sized from the configuration and
    /// keeps that size until the plugin is restarted.
    pub fn new(config: PluginConfiguration, api: Arc<dyn ScrobbleApi>, runtime: Handle) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        debug!("Request gate allows {} concurrent Last.fm requests", permits);

        Self {
            config: RwLock::new(Arc::new(config)),
            api,
            request_gate: Arc::new(Semaphore::new(permits)),
            runtime,
            pending: Arc::new(PendingCalls::default()),
        }
    }

    pub fn config(&self) -> Arc<PluginConfiguration> {
        self.config.read().clone()
    }

    /// Swap in a new configuration and return the previous one
    pub fn replace_config(&self, config: PluginConfiguration) -> Arc<PluginConfiguration> {
        let mut guard = self.config.write();
        std::mem::replace(&mut *guard, Arc::new(config))
    }

    pub fn api(&self) -> Arc<dyn ScrobbleApi> {
        Arc::clone(&self.api)
    }

    pub fn request_gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.request_gate)
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Register an accepted call. It counts as pending until the guard is dropped.
    pub fn begin_call(&self) -> PendingCall {
        *self.pending.count.lock() += 1;
        PendingCall { pending: Arc::clone(&self.pending) }
    }

    pub fn pending_calls(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Time to allow for the pending backlog: one request timeout per round
    /// of `max_concurrent_requests` calls.
    pub fn drain_budget(&self) -> Duration {
        let config = self.config();
        let permits = config.max_concurrent_requests.max(1);
        let rounds = self.pending_calls().div_ceil(permits).max(1);
        Duration::from_secs((config.request_timeout_secs + 1) * rounds as u64)
    }

    /// Block until every pending call has finished or `timeout` passes.
    /// Returns true if nothing is left pending.
    pub fn drain(&self, timeout: Duration) -> bool {
        let mut count = self.pending.count.lock();
        if *count > 0 {
            debug!("Waiting for {} pending Last.fm calls", *count);
            self.pending.idle.wait_while_for(&mut count, |count| *count > 0, timeout);
        }
        *count == 0
    }

    /// Stop accepting new requests. Calls already holding a permit run to completion.
    pub fn close(&self) {
        if !self.request_gate.is_closed() {
            info!("Closing Last.fm request gate");
            self.request_gate.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.request_gate.is_closed()
    }
}
