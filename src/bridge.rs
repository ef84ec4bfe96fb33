use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    latch::{EdgeLatch, EdgeSignal},
    results::{ClassificationResult, RankedLabel, ResultError, ResultStore},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

struct Published {
    store: ResultStore,
    latch: EdgeLatch,
}

/// Hands classification results from the scheduler to the polling consumer.
///
/// Store and latch live behind one lock: a publish replaces the store and
/// raises the latch in the same critical section, so a poll that reads true
/// always sees the matching result.
pub struct ResultBridge {
    inner: Mutex<Published>,
}

impl ResultBridge {
    pub fn new(latch: EdgeLatch) -> Self {
        Self {
            inner: Mutex::new(Published {
                store: ResultStore::new(),
                latch,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, results: ClassificationResult) {
        let mut guard = self.lock();
        guard.store.replace(results);
        guard.latch.set();
    }

    pub fn poll(&self) -> bool {
        self.lock().latch.poll()
    }

    pub fn signal(&self) -> EdgeSignal {
        self.lock().latch.signal()
    }

    pub fn get(&self, rank: usize) -> Result<RankedLabel, ResultError> {
        self.lock().store.get(rank)
    }

    pub fn label(&self, rank: usize) -> Result<String, ResultError> {
        self.lock().store.label(rank)
    }

    pub fn confidence(&self, rank: usize) -> Result<f64, ResultError> {
        self.lock().store.confidence(rank)
    }

    pub fn latest(&self) -> Option<Arc<ClassificationResult>> {
        self.lock().store.latest()
    }

    /// Applies an overdue latch reset without waiting for the next poll.
    pub fn sweep(&self) -> bool {
        self.lock().latch.expire_at(Instant::now())
    }

    /// One recurring ticker applies latch resets, instead of a timer per poll.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("latch sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if bridge.sweep() {
                            log_debug!("latch reset applied by sweeper");
                        }
                    }
                }
            }
        })
    }
}
