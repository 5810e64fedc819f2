//! Unique-work scheduling for indexing passes.
//!
//! Each work name has at most one queued request and at most one running pass.
//! `Replace` supersedes a queued request that has not started yet; a running
//! pass is never cancelled and the replacement runs after it. `Keep` leaves an
//! existing queued or running request alone.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::{PassOutcome, PassRunner};
use crate::error::{Error, Result};

pub const ONE_TIME_WORK: &str = "memo_indexer_onetime";
pub const PERIODIC_WORK: &str = "memo_indexer_periodic";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    Replace,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub is_manual: bool,
    pub initial_delay: Duration,
    /// Re-run every interval after the first pass
    pub repeat_interval: Option<Duration>,
}

impl IndexRequest {
    pub fn one_time(delay: Duration) -> Self {
        Self {
            is_manual: false,
            initial_delay: delay,
            repeat_interval: None,
        }
    }

    pub fn manual() -> Self {
        Self {
            is_manual: true,
            initial_delay: Duration::ZERO,
            repeat_interval: None,
        }
    }

    /// First pass right away, then every interval.
    pub fn periodic(interval: Duration) -> Self {
        Self {
            is_manual: false,
            initial_delay: Duration::ZERO,
            repeat_interval: Some(interval),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
}

/// Coarse status of the one-time work, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl From<Option<WorkState>> for IndexingStatus {
    fn from(state: Option<WorkState>) -> Self {
        match state {
            Some(WorkState::Running) => IndexingStatus::Running,
            Some(WorkState::Succeeded) => IndexingStatus::Succeeded,
            Some(WorkState::Failed) => IndexingStatus::Failed,
            Some(WorkState::Enqueued) | None => IndexingStatus::Idle,
        }
    }
}

struct WorkSlot {
    generation: u64,
    queued: bool,
    running: bool,
    state: Option<WorkState>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl WorkSlot {
    fn new() -> Self {
        Self {
            generation: 0,
            queued: false,
            running: false,
            state: None,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

struct SchedulerInner {
    runner: Arc<dyn PassRunner>,
    runtime: Handle,
    retry_backoff: Duration,
    retry_backoff_max: Duration,
    slots: Mutex<HashMap<String, WorkSlot>>,
    status: watch::Sender<IndexingStatus>,
}

#[derive(Clone)]
pub struct IndexScheduler {
    inner: Arc<SchedulerInner>,
}

impl IndexScheduler {
    /// Must be called from within a tokio runtime; passes run on that runtime.
    pub fn new(runner: Arc<dyn PassRunner>, retry_backoff: Duration, retry_backoff_max: Duration) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Other(format!("index scheduler needs a tokio runtime: {}", e)))?;
        let (status, _) = watch::channel(IndexingStatus::Idle);
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                runner,
                runtime,
                retry_backoff,
                retry_backoff_max: retry_backoff_max.max(retry_backoff),
                slots: Mutex::new(HashMap::new()),
                status,
            }),
        })
    }

    /// Queue `request` under `name`. Returns whether it was queued.
    ///
    /// Never suspends; the pass itself runs on a spawned task.
    pub fn enqueue_unique(&self, name: &str, policy: ExistingWorkPolicy, request: IndexRequest) -> Result<bool> {
        let generation = {
            let mut slots = self.inner.lock_slots()?;
            let slot = slots.entry(name.to_string()).or_insert_with(WorkSlot::new);

            if policy == ExistingWorkPolicy::Keep && (slot.queued || slot.running) {
                log::debug!("[IndexScheduler] {} already scheduled, keeping existing work", name);
                return Ok(false);
            }
            if slot.queued {
                log::debug!("[IndexScheduler] Replacing queued request for {}", name);
            }

            slot.generation += 1;
            slot.queued = true;
            // a running pass keeps reporting Running until it finishes
            if !slot.running {
                self.inner.set_state(name, slot, WorkState::Enqueued);
            }
            slot.generation
        };

        let inner = self.inner.clone();
        let name = name.to_string();
        self.inner
            .runtime
            .spawn(async move { inner.drive(name, generation, request).await });
        Ok(true)
    }

    /// The one-shot startup pass plus the periodic pass.
    pub fn register_startup(&self, startup_delay: Duration, interval: Duration) -> Result<()> {
        self.enqueue_unique(ONE_TIME_WORK, ExistingWorkPolicy::Replace, IndexRequest::one_time(startup_delay))?;
        self.enqueue_unique(PERIODIC_WORK, ExistingWorkPolicy::Keep, IndexRequest::periodic(interval))?;
        log::info!(
            "[IndexScheduler] Registered startup pass in {:?} and periodic pass every {:?}",
            startup_delay,
            interval
        );
        Ok(())
    }

    /// User-requested reindex; runs even while the app is in the foreground.
    pub fn trigger_manual(&self) -> Result<bool> {
        self.enqueue_unique(ONE_TIME_WORK, ExistingWorkPolicy::Replace, IndexRequest::manual())
    }

    pub fn work_state(&self, name: &str) -> Option<WorkState> {
        self.inner
            .lock_slots()
            .ok()
            .and_then(|slots| slots.get(name).and_then(|slot| slot.state))
    }

    pub fn status(&self) -> IndexingStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IndexingStatus> {
        self.inner.status.subscribe()
    }
}

impl SchedulerInner {
    fn lock_slots(&self) -> Result<MutexGuard<'_, HashMap<String, WorkSlot>>> {
        self.slots
            .lock()
            .map_err(|_| Error::Other("index scheduler lock poisoned".to_string()))
    }

    fn set_state(&self, name: &str, slot: &mut WorkSlot, state: WorkState) {
        slot.state = Some(state);
        if name == ONE_TIME_WORK {
            self.status.send_replace(IndexingStatus::from(Some(state)));
        }
    }

    /// Run lock for `name` if `generation` is still the latest request.
    fn current_run_lock(&self, name: &str, generation: u64) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let slots = self.lock_slots().ok()?;
        slots
            .get(name)
            .filter(|slot| slot.generation == generation)
            .map(|slot| slot.run_lock.clone())
    }

    /// Mark the pass as started; `false` if the request was superseded meanwhile.
    fn claim(&self, name: &str, generation: u64) -> bool {
        let Ok(mut slots) = self.lock_slots() else {
            return false;
        };
        match slots.get_mut(name) {
            Some(slot) if slot.generation == generation => {
                slot.queued = false;
                slot.running = true;
                self.set_state(name, slot, WorkState::Running);
                true
            }
            _ => false,
        }
    }

    /// Record the pass result; returns whether `generation` should run again.
    ///
    /// A newer request queued during the pass is published as Enqueued instead.
    fn finish(&self, name: &str, generation: u64, state: WorkState, again: bool) -> bool {
        let Ok(mut slots) = self.lock_slots() else {
            return false;
        };
        let Some(slot) = slots.get_mut(name) else {
            return false;
        };
        slot.running = false;
        let current = slot.generation == generation;
        if current && again {
            slot.queued = true;
        }
        let state = if !current && slot.queued { WorkState::Enqueued } else { state };
        self.set_state(name, slot, state);
        current && again
    }

    async fn drive(self: Arc<Self>, name: String, generation: u64, request: IndexRequest) {
        let mut delay = request.initial_delay;
        let mut backoff = self.retry_backoff;

        loop {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            let Some(run_lock) = self.current_run_lock(&name, generation) else {
                log::debug!("[IndexScheduler] Request for {} was superseded", name);
                return;
            };
            let _running = run_lock.lock_owned().await;
            if !self.claim(&name, generation) {
                log::debug!("[IndexScheduler] Request for {} was superseded", name);
                return;
            }

            log::info!("[IndexScheduler] Starting {} (manual: {})", name, request.is_manual);
            let outcome = self.runner.run_pass(request.is_manual).await;

            let next_delay = match &outcome {
                PassOutcome::Success(_) => {
                    backoff = self.retry_backoff;
                    let again = request.repeat_interval.is_some();
                    self.finish(&name, generation, WorkState::Succeeded, again)
                        .then_some(request.repeat_interval)
                        .flatten()
                }
                PassOutcome::Failure { message } => {
                    log::error!("[IndexScheduler] {} failed: {}", name, message);
                    let again = request.repeat_interval.is_some();
                    self.finish(&name, generation, WorkState::Failed, again)
                        .then_some(request.repeat_interval)
                        .flatten()
                }
                PassOutcome::Retry { reason } => {
                    let wait = backoff;
                    backoff = (backoff * 2).min(self.retry_backoff_max);
                    log::warn!("[IndexScheduler] {} will retry in {:?}: {}", name, wait, reason);
                    self.finish(&name, generation, WorkState::Enqueued, true)
                        .then_some(wait)
                }
            };

            match next_delay {
                Some(next) => delay = next,
                None => return,
            }
        }
    }
}
