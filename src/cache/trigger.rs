//! Cache trigger service.
//!
//! Write and read paths hand populate/invalidate commands to a bounded queue and move on.
//! A single worker applies them in FIFO order, so an invalidation followed by a
//! repopulation of the same key lands in that order.
//!
//! Read-path fills are conditional: they carry the key generation seen before the live
//! load, and the worker discards them if an invalidation was applied in the meantime.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::TtlCache;
use super::{METRIC_CACHE_ENTRIES, METRIC_CACHE_EVENT_DROPPED, METRIC_CACHE_FILL_DISCARDED};

#[derive(Debug)]
pub enum CacheCommand {
    Store {
        key: String,
        payload: Bytes,
        ttl: Duration,
        /// `Some` for read-path fills; applied only while the key is still at this generation.
        generation: Option<u64>,
    },
    Invalidate {
        key: String,
    },
    /// Resolved once every command queued ahead of it has been applied.
    Flush(oneshot::Sender<()>),
}

impl CacheCommand {
    fn key(&self) -> Option<&str> {
        match self {
            Self::Store { key, .. } | Self::Invalidate { key } => Some(key.as_str()),
            Self::Flush(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Store { .. } => "store",
            Self::Invalidate { .. } => "invalidate",
            Self::Flush(_) => "flush",
        }
    }
}

/// Non-blocking handle for scheduling cache work.
#[derive(Clone, Debug)]
pub struct CacheTrigger {
    enabled: bool,
    ttl: Duration,
    sender: mpsc::Sender<CacheCommand>,
}

/// Consumer side of a [`CacheTrigger`]; owns the queue receiver.
pub struct CacheWorker {
    store: Arc<TtlCache>,
    receiver: mpsc::Receiver<CacheCommand>,
    sweep_interval: Duration,
}

impl CacheTrigger {
    /// Create a trigger and its worker without starting the worker.
    pub fn channel(config: &CacheConfig, store: Arc<TtlCache>) -> (Self, CacheWorker) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity_non_zero());
        let trigger = Self {
            enabled: config.enabled,
            ttl: config.ttl(),
            sender,
        };
        let worker = CacheWorker {
            store,
            receiver,
            sweep_interval: config.sweep_interval(),
        };
        (trigger, worker)
    }

    /// Create a trigger and spawn its worker on the current runtime.
    pub fn start(config: &CacheConfig, store: Arc<TtlCache>) -> (Self, JoinHandle<()>) {
        let (trigger, worker) = Self::channel(config, store);
        (trigger, worker.spawn())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Populate `key` with `payload` for the configured TTL.
    pub fn store(&self, key: &CacheKey, payload: Bytes) {
        self.dispatch(CacheCommand::Store {
            key: key.render(),
            payload,
            ttl: self.ttl,
            generation: None,
        });
    }

    /// Populate `key` with a value loaded after observing `generation`.
    ///
    /// Dropped by the worker if `key` was invalidated after that observation.
    pub fn fill(&self, key: &CacheKey, payload: Bytes, generation: u64) {
        self.dispatch(CacheCommand::Store {
            key: key.render(),
            payload,
            ttl: self.ttl,
            generation: Some(generation),
        });
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.dispatch(CacheCommand::Invalidate { key: key.render() });
    }

    /// Wait until everything queued before this call has been applied.
    ///
    /// Returns immediately when the cache is disabled or the worker has stopped.
    pub async fn flush(&self) {
        if !self.enabled {
            return;
        }
        let (done, wait) = oneshot::channel();
        if self.sender.send(CacheCommand::Flush(done)).await.is_err() {
            debug!("Cache flush skipped: worker stopped");
            return;
        }
        let _ = wait.await;
    }

    fn dispatch(&self, command: CacheCommand) {
        if !self.enabled {
            debug!(
                command = command.kind(),
                cache_key = command.key().unwrap_or(""),
                "Cache command skipped: cache disabled"
            );
            return;
        }

        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                counter!(METRIC_CACHE_EVENT_DROPPED).increment(1);
                warn!(
                    command = command.kind(),
                    cache_key = command.key().unwrap_or(""),
                    "Cache command dropped: queue full"
                );
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                debug!(
                    command = command.kind(),
                    cache_key = command.key().unwrap_or(""),
                    "Cache command dropped: worker stopped"
                );
            }
        }
    }
}

impl CacheWorker {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Apply commands until every trigger has been dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await;

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        debug!("Cache worker stopped");
    }

    fn apply(&self, command: CacheCommand) {
        match command {
            CacheCommand::Store {
                key,
                payload,
                ttl,
                generation: None,
            } => {
                debug!(cache_key = %key, bytes = payload.len(), "Cache entry stored");
                self.store.set_with_ttl(key, payload, ttl);
            }
            CacheCommand::Store {
                key,
                payload,
                ttl,
                generation: Some(generation),
            } => {
                let bytes = payload.len();
                if self
                    .store
                    .set_if_generation(key.as_str(), payload, ttl, generation)
                {
                    debug!(cache_key = %key, bytes, "Cache entry filled");
                } else {
                    counter!(METRIC_CACHE_FILL_DISCARDED).increment(1);
                    debug!(cache_key = %key, generation, "Stale cache fill discarded");
                }
            }
            CacheCommand::Invalidate { key } => {
                debug!(cache_key = %key, "Cache entry invalidated");
                self.store.remove(&key);
            }
            CacheCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn sweep(&self) {
        let purged = self.store.purge_expired();
        let remaining = self.store.len();
        gauge!(METRIC_CACHE_ENTRIES).set(remaining as f64);
        if purged > 0 {
            debug!(purged, remaining, "Expired cache entries purged");
        }
    }
}
