//! Dispatch engine: bounded queue, fixed worker pool, idle polling.
//!
//! Ingestion enqueues event ids onto a bounded channel; `try_send` keeps
//! the request path non-blocking, and overflow is shed to the store —
//! events stay pending and the idle poller claims them later. The poller
//! also picks up operator retries and events left pending by a crash.

use std::{sync::Arc, time::Duration};

use sluice_core::{Clock, EventId};
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::WebhookDispatcher,
    error::{IntegrationError, Result},
    storage::DispatchStore,
};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,
    /// Bounded queue capacity between ingestion and workers.
    pub queue_capacity: usize,
    /// Events claimed from the store per idle poll.
    pub batch_size: usize,
    /// How long an idle worker waits before polling the store.
    pub poll_interval: Duration,
    /// Maximum time to wait for workers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Engine counters for monitoring.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Workers currently running.
    pub active_workers: usize,
    /// Events handed to the dispatcher since startup.
    pub events_processed: u64,
    /// Enqueue attempts rejected because the queue was full.
    pub queue_rejections: u64,
}

/// Producer handle for the bounded dispatch queue.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<EventId>,
    stats: Arc<RwLock<EngineStats>>,
}

impl DispatchQueue {
    /// Offers an event id to the workers without blocking.
    ///
    /// Returns `false` when the queue is full or the engine is gone; the
    /// event remains pending in the store and the poller will claim it.
    pub async fn enqueue(&self, id: EventId) -> bool {
        match self.tx.try_send(id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event_id = %id, "dispatch queue full, leaving event for poller");
                self.stats.write().await.queue_rejections += 1;
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event_id = %id, "dispatch queue closed, leaving event for poller");
                false
            },
        }
    }
}

/// Supervises the dispatch worker pool.
pub struct DispatchEngine {
    dispatcher: Arc<WebhookDispatcher>,
    store: Arc<dyn DispatchStore>,
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    queue_rx: Option<mpsc::Receiver<EventId>>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl DispatchEngine {
    /// Creates the engine and its queue handle.
    pub fn new(
        dispatcher: Arc<WebhookDispatcher>,
        store: Arc<dyn DispatchStore>,
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let queue = DispatchQueue { tx, stats: stats.clone() };
        let engine = Self {
            dispatcher,
            store,
            config,
            clock,
            queue_rx: Some(rx),
            stats,
            cancellation: CancellationToken::new(),
            worker_handles: Vec::new(),
        };
        (engine, queue)
    }

    /// Spawns the configured number of workers.
    ///
    /// Idempotent only in the sense that the queue receiver is consumed
    /// by the first call; later calls are rejected.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        let rx = self
            .queue_rx
            .take()
            .ok_or_else(|| IntegrationError::configuration("workers already spawned"))?;
        let rx = Arc::new(Mutex::new(rx));

        info!(worker_count = self.config.worker_count, "spawning dispatch workers");
        self.stats.write().await.active_workers = self.config.worker_count;

        for worker_id in 0..self.config.worker_count {
            let worker = Worker {
                id: worker_id,
                queue: rx.clone(),
                dispatcher: self.dispatcher.clone(),
                store: self.store.clone(),
                config: self.config.clone(),
                clock: self.clock.clone(),
                stats: self.stats.clone(),
                cancellation: self.cancellation.clone(),
            };
            self.worker_handles.push(tokio::spawn(async move {
                info!(worker_id = worker.id, "dispatch worker starting");
                worker.run().await;
                info!(worker_id = worker.id, "dispatch worker stopped");
            }));
        }

        Ok(())
    }

    /// Current engine counters.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Signals workers to stop and waits within the shutdown budget.
    pub async fn shutdown(mut self) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_s = self.config.shutdown_timeout.as_secs(),
            "shutting down dispatch engine"
        );
        self.cancellation.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let stats = self.stats.clone();
        let join_all = async move {
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    error!(worker_id, error = %join_error, "dispatch worker panicked");
                }
            }
            stats.write().await.active_workers = 0;
        };

        match tokio::time::timeout(self.config.shutdown_timeout, join_all).await {
            Ok(()) => {
                info!("dispatch engine shutdown complete");
                Ok(())
            },
            Err(_) => {
                error!("dispatch worker shutdown timed out");
                Err(IntegrationError::ShutdownTimeout(self.config.shutdown_timeout))
            },
        }
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|h| !h.is_finished()).count();
        if active > 0 && !self.cancellation.is_cancelled() {
            warn!(active_workers = active, "dispatch engine dropped without shutdown, cancelling workers");
            self.cancellation.cancel();
        }
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<EventId>>>,
    dispatcher: Arc<WebhookDispatcher>,
    store: Arc<dyn DispatchStore>,
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation: CancellationToken,
}

impl Worker {
    async fn run(&self) {
        loop {
            if self.cancellation.is_cancelled() {
                break;
            }

            tokio::select! {
                () = self.cancellation.cancelled() => break,
                received = async { self.queue.lock().await.recv().await } => {
                    match received {
                        Some(event_id) => self.process_queued(event_id).await,
                        // Queue closed: producers are gone, fall back to polling
                        // until cancellation.
                        None => {
                            self.poll_store().await;
                            self.clock.sleep(self.config.poll_interval).await;
                        },
                    }
                },
                () = self.clock.sleep(self.config.poll_interval) => {
                    self.poll_store().await;
                },
            }
        }
    }

    async fn process_queued(&self, event_id: EventId) {
        debug!(worker_id = self.id, event_id = %event_id, "processing queued event");
        if let Err(e) = self.dispatcher.process_event(event_id).await {
            error!(worker_id = self.id, event_id = %event_id, error = %e, "event processing failed");
        }
        self.stats.write().await.events_processed += 1;
    }

    async fn poll_store(&self) {
        let events = match self.store.claim_pending_batch(self.config.batch_size).await {
            Ok(events) => events,
            Err(e) => {
                error!(worker_id = self.id, error = %e, "failed to claim pending events");
                return;
            },
        };

        if !events.is_empty() {
            debug!(worker_id = self.id, claimed = events.len(), "claimed pending events from store");
        }

        for event in events {
            if self.cancellation.is_cancelled() {
                break;
            }
            let event_id = event.id;
            if let Err(e) = self.dispatcher.deliver_claimed(event).await {
                error!(worker_id = self.id, event_id = %event_id, error = %e, "event processing failed");
            }
            self.stats.write().await.events_processed += 1;
        }
    }
}
