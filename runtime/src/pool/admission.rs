//! Counting admission for in-flight fetches: one global ceiling shared by
//! every source plus a per-host sub-limit.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permit pair held for the duration of one network call.
pub struct AdmissionPermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Global and per-host semaphores.
pub struct AdmissionPool {
    global: Arc<Semaphore>,
    hosts: DashMap<String, Arc<Semaphore>>,
    max_global: usize,
    per_host: usize,
    active: Arc<AtomicUsize>,
}

impl AdmissionPool {
    /// Create a pool with `max_global` total slots and `per_host` slots per host.
    pub fn new(max_global: usize, per_host: usize) -> Self {
        let max_global = max_global.max(1);
        Self {
            global: Arc::new(Semaphore::new(max_global)),
            hosts: DashMap::new(),
            max_global,
            per_host: per_host.clamp(1, max_global),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        if let Some(s) = self.hosts.get(host) {
            return Arc::clone(s.value());
        }
        let entry = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)));
        Arc::clone(entry.value())
    }

    /// Wait for a slot for `host`.
    ///
    /// The host permit is taken first so a host at its sub-limit never
    /// sits on a global slot while it waits.
    pub async fn acquire(&self, host: &str) -> anyhow::Result<AdmissionPermit> {
        let host_permit = self
            .host_semaphore(host)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("host semaphore closed: {}", e))?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("global semaphore closed: {}", e))?;

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(AdmissionPermit {
            _host: host_permit,
            _global: global_permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of permits currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_global(&self) -> usize {
        self.max_global
    }

    pub fn per_host(&self) -> usize {
        self.per_host
    }

    /// Free global slots.
    pub fn available(&self) -> usize {
        self.global.available_permits()
    }
}
