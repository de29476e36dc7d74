//! # Controller
//!
//! Event-driven dispatch loop for one reconciler.
//!
//! Targets arrive from three sources: the seeds given at construction, the
//! trigger stream (watch events) and requeue timers. A [`WorkQueue`] keeps one
//! pass per target in flight; distinct targets run concurrently on a `JoinSet`
//! up to the configured limit. Every finished pass schedules the next one:
//! `RequeueAfter(d)` after `d`, anything else after the sync period. A newer
//! schedule for a target replaces the older one.

use super::queue::WorkQueue;
use crate::controller::reconciler::{ReconcileError, ReconcileResult, Reconciler, TargetRef};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, error, info, warn};

/// A reconcile function the dispatch loop can drive
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(&self, target: &TargetRef, cancel: &CancellationToken) -> ReconcileResult;
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, target: &TargetRef, cancel: &CancellationToken) -> ReconcileResult {
        Reconciler::reconcile(self, target, cancel).await
    }
}

/// Something the manager starts and stops
///
/// `start` returns once `cancel` fires and in-flight work has drained.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, cancel: CancellationToken) -> Result<()>;
}

pub struct Controller {
    name: String,
    reconciler: Arc<dyn Reconcile>,
    triggers: Mutex<Option<BoxStream<'static, TargetRef>>>,
    seeds: Vec<TargetRef>,
    sync_period: Duration,
    max_concurrent: usize,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("seeds", &self.seeds)
            .field("sync_period", &self.sync_period)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl Controller {
    #[must_use]
    pub fn new(name: &str, reconciler: Arc<dyn Reconcile>, sync_period: Duration) -> Self {
        Self {
            name: name.to_string(),
            reconciler,
            triggers: Mutex::new(None),
            seeds: Vec::new(),
            sync_period,
            max_concurrent: 1,
        }
    }

    /// Stream of targets to reconcile on change
    #[must_use]
    pub fn with_triggers(self, triggers: BoxStream<'static, TargetRef>) -> Self {
        Self {
            triggers: Mutex::new(Some(triggers)),
            ..self
        }
    }

    /// Target reconciled as soon as the controller starts
    #[must_use]
    pub fn with_target(mut self, target: TargetRef) -> Self {
        self.seeds.push(target);
        self
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    fn next_delay(&self, result: &ReconcileResult) -> Option<Duration> {
        match result {
            ReconcileResult::RequeueAfter(delay) => Some(*delay),
            ReconcileResult::Failed(ReconcileError::Cancelled) => None,
            ReconcileResult::Success | ReconcileResult::Failed(_) => Some(self.sync_period),
        }
    }
}

/// Requeue timers, at most one per target
struct Timers {
    queue: DelayQueue<TargetRef>,
    keys: HashMap<TargetRef, delay_queue::Key>,
}

impl Timers {
    fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    fn schedule(&mut self, target: TargetRef, delay: Duration) {
        if let Some(key) = self.keys.get(&target) {
            self.queue.reset(key, delay);
        } else {
            let key = self.queue.insert(target.clone(), delay);
            self.keys.insert(target, key);
        }
    }

    fn expired(&mut self, expired: delay_queue::Expired<TargetRef>) -> TargetRef {
        let target = expired.into_inner();
        self.keys.remove(&target);
        target
    }
}

#[async_trait]
impl Runnable for Controller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let taken = self
            .triggers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let (mut triggers, mut triggers_open) = match taken {
            Some(triggers) => (triggers, true),
            None if self.seeds.is_empty() => {
                anyhow::bail!("controller {} has no triggers or targets", self.name)
            }
            None => (futures::stream::pending().boxed(), false),
        };

        // Passes see shutdown as soon as it fires, and teardown if the loop is dropped
        let work_cancel = cancel.child_token();
        let _cancel_work_on_drop = work_cancel.clone().drop_guard();

        let mut queue = WorkQueue::new();
        for seed in &self.seeds {
            queue.push(seed.clone());
        }
        let mut timers = Timers::new();
        let mut workers: JoinSet<ReconcileResult> = JoinSet::new();
        let mut in_flight: HashMap<Id, TargetRef> = HashMap::new();

        info!(controller = %self.name, sync_period_secs = self.sync_period.as_secs(), "Controller started");

        loop {
            while workers.len() < self.max_concurrent {
                let Some(target) = queue.pop() else {
                    break;
                };
                debug!(controller = %self.name, target_ref = %target, "Dispatching reconciliation");
                let reconciler = self.reconciler.clone();
                let token = work_cancel.child_token();
                let task_target = target.clone();
                let handle = workers
                    .spawn(async move { reconciler.reconcile(&task_target, &token).await });
                in_flight.insert(handle.id(), target);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = workers.join_next_with_id() => {
                    let Some((target, result)) = completed(&mut in_flight, joined) else {
                        continue;
                    };
                    if let Some(delay) = self.next_delay(&result) {
                        timers.schedule(target.clone(), delay);
                    }
                    if queue.done(&target) {
                        debug!(controller = %self.name, target_ref = %target, "Target changed during reconciliation, requeued");
                    }
                }
                Some(expired) = timers.queue.next() => {
                    let target = timers.expired(expired);
                    debug!(controller = %self.name, target_ref = %target, "Requeue timer fired");
                    queue.push(target);
                }
                trigger = triggers.next(), if triggers_open => match trigger {
                    Some(target) => queue.push(target),
                    None => {
                        warn!(controller = %self.name, "Trigger stream ended, continuing on timers only");
                        triggers_open = false;
                    }
                },
            }
        }

        info!(
            controller = %self.name,
            in_flight = workers.len(),
            "Controller stopping, waiting for in-flight reconciliations"
        );
        while let Some(joined) = workers.join_next_with_id().await {
            if let Some((target, result)) = completed(&mut in_flight, joined) {
                debug!(controller = %self.name, target_ref = %target, result = ?result, "Drained reconciliation");
            }
        }
        info!(controller = %self.name, "Controller stopped");

        Ok(())
    }
}

/// Resolve a finished task to its target and result
///
/// A panicked pass is reported as a failure so the target is rescheduled.
fn completed(
    in_flight: &mut HashMap<Id, TargetRef>,
    joined: Result<(Id, ReconcileResult), JoinError>,
) -> Option<(TargetRef, ReconcileResult)> {
    match joined {
        Ok((id, result)) => in_flight.remove(&id).map(|target| (target, result)),
        Err(e) => {
            let target = in_flight.remove(&e.id())?;
            error!(target_ref = %target, error = %e, "Reconciliation task failed");
            Some((
                target.clone(),
                ReconcileResult::Failed(ReconcileError::TaskFailed(e.to_string())),
            ))
        }
    }
}
