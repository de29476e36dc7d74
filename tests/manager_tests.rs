//! Runtime host tests
//!
//! Scheduling, sync period and shutdown behaviour of the controller and manager.
//! Time is paused so sync periods and grace periods elapse instantly.

mod common;

use async_trait::async_trait;
use common::{NAMESPACE, ScriptedUpstream, cluster_with_token, config, options};
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uxp_bootstrapper::cluster::InMemoryCluster;
use uxp_bootstrapper::config::ControllerConfig;
use uxp_bootstrapper::constants::{
    CONTROL_PLANE_TOKEN_KEY, CONTROL_PLANE_TOKEN_SECRET, IDENTITY_CONFIG_MAP, PUBLIC_CERTS_SECRET,
};
use uxp_bootstrapper::controller::reconciler::{ReconcileResult, TargetRef};
use uxp_bootstrapper::runtime::{
    BOOTSTRAP_CONTROLLER, Controller, Manager, ManagerError, Reconcile, Runnable, assemble,
};

/// Records how many passes run per target and how many overlap
#[derive(Debug, Default)]
struct Probe {
    state: Mutex<ProbeState>,
    work: Duration,
}

#[derive(Debug, Default)]
struct ProbeState {
    running: HashMap<TargetRef, usize>,
    passes: HashMap<TargetRef, usize>,
    max_per_target: usize,
    max_total: usize,
}

impl Probe {
    fn taking(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            ..Self::default()
        })
    }

    fn passes(&self, target: &TargetRef) -> usize {
        self.state.lock().unwrap().passes.get(target).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Reconcile for Probe {
    async fn reconcile(&self, target: &TargetRef, _cancel: &CancellationToken) -> ReconcileResult {
        {
            let mut state = self.state.lock().unwrap();
            let running = state.running.entry(target.clone()).or_default();
            *running += 1;
            let per_target = *running;
            *state.passes.entry(target.clone()).or_default() += 1;
            let total = state.running.values().sum();
            state.max_per_target = state.max_per_target.max(per_target);
            state.max_total = state.max_total.max(total);
        }
        tokio::time::sleep(self.work).await;
        *self
            .state
            .lock()
            .unwrap()
            .running
            .get_mut(target)
            .unwrap() -= 1;
        ReconcileResult::Success
    }
}

/// Runnable that fails as soon as it starts
#[derive(Debug)]
struct Broken;

#[async_trait]
impl Runnable for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        anyhow::bail!("watch could not be established")
    }
}

fn grace(secs: u64) -> ControllerConfig {
    ControllerConfig {
        shutdown_grace_period_secs: secs,
        ..config()
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_pass_per_target_at_a_time() {
    let a = TargetRef::new(NAMESPACE, "a");
    let b = TargetRef::new(NAMESPACE, "b");
    let probe = Probe::taking(Duration::from_secs(5));
    let (triggers, trigger_stream) = mpsc::unbounded();

    let controller = Controller::new("probe", probe.clone(), Duration::from_secs(600))
        .with_target(a.clone())
        .with_target(b.clone())
        .with_triggers(trigger_stream.boxed())
        .with_max_concurrent(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { controller.start(cancel).await }
    });

    // Both seeds are in flight; pile up changes for `a`
    tokio::time::sleep(Duration::from_secs(1)).await;
    for _ in 0..3 {
        triggers.unbounded_send(a.clone()).unwrap();
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let state = probe.state.lock().unwrap();
    assert_eq!(state.max_per_target, 1);
    assert_eq!(state.max_total, 2);
    drop(state);
    // Changes seen during a pass collapse into one follow-up pass
    assert_eq!(probe.passes(&a), 2);
    assert_eq!(probe.passes(&b), 1);
}

#[tokio::test(start_paused = true)]
async fn test_requeue_after_is_honoured() {
    #[derive(Debug, Default)]
    struct Flaky {
        passes: Mutex<usize>,
    }

    #[async_trait]
    impl Reconcile for Flaky {
        async fn reconcile(&self, _: &TargetRef, _: &CancellationToken) -> ReconcileResult {
            let mut passes = self.passes.lock().unwrap();
            *passes += 1;
            if *passes == 1 {
                ReconcileResult::RequeueAfter(Duration::from_secs(5))
            } else {
                ReconcileResult::Success
            }
        }
    }

    let flaky = Arc::new(Flaky::default());
    let controller = Controller::new("flaky", flaky.clone(), Duration::from_secs(600))
        .with_target(TargetRef::bootstrap(NAMESPACE));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { controller.start(cancel).await }
    });

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(*flaky.passes.lock().unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(*flaky.passes.lock().unwrap(), 2);
    // Success schedules the next pass at the sync period
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(*flaky.passes.lock().unwrap(), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sync_period_forces_reconciliation() {
    let cluster = cluster_with_token();
    let upstream = ScriptedUpstream::healthy();
    let ready = Arc::new(AtomicBool::new(false));
    let manager = assemble(
        &options(),
        &config(),
        Arc::new(cluster.clone()),
        upstream.clone(),
        ready.clone(),
    )
    .unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(manager.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(ready.load(Ordering::Relaxed));
    assert!(cluster.secret(PUBLIC_CERTS_SECRET).is_some());
    let settled = upstream.calls();

    // Nothing changes in the cluster, so nothing happens until the sync period
    tokio::time::sleep(Duration::from_secs(540)).await;
    assert_eq!(upstream.calls(), settled);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(upstream.calls() > settled);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert!(!ready.load(Ordering::Relaxed));
}

#[tokio::test(start_paused = true)]
async fn test_watch_event_triggers_reconciliation() {
    let cluster = InMemoryCluster::new(NAMESPACE);
    let upstream = ScriptedUpstream::healthy();
    let manager = assemble(
        &options(),
        &config(),
        Arc::new(cluster.clone()),
        upstream.clone(),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(manager.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(cluster.config_map(IDENTITY_CONFIG_MAP).is_some());
    assert!(cluster.secret(PUBLIC_CERTS_SECRET).is_none());
    assert_eq!(upstream.calls(), 0);

    // The token arrives long before the next sync
    cluster.put_secret(
        CONTROL_PLANE_TOKEN_SECRET,
        &[(CONTROL_PLANE_TOKEN_KEY, common::TOKEN)],
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(upstream.calls() >= 1);
    assert!(cluster.secret(PUBLIC_CERTS_SECRET).is_some());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_pass() {
    let cluster = cluster_with_token();
    // Reads that take longer than the grace period, but honour cancellation
    cluster.set_read_delay(Some(Duration::from_secs(120)));
    let manager = assemble(
        &options(),
        &grace(30),
        Arc::new(cluster.clone()),
        ScriptedUpstream::healthy(),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(manager.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let signalled = tokio::time::Instant::now();
    shutdown.cancel();

    handle.await.unwrap().unwrap();
    assert!(signalled.elapsed() < Duration::from_secs(30));
    assert_eq!(cluster.writes(), 0);
}

/// Reconcile that sleeps through cancellation
fn stubborn_manager(work: Duration) -> (Manager, Arc<Probe>) {
    let probe = Probe::taking(work);
    let mut manager = Manager::new(Duration::from_secs(30));
    manager
        .register(
            Controller::new("stubborn", probe.clone(), Duration::from_secs(600))
                .with_target(TargetRef::bootstrap(NAMESPACE)),
        )
        .unwrap();
    (manager, probe)
}

#[tokio::test(start_paused = true)]
async fn test_pass_ignoring_cancellation_finishes_within_grace_period() {
    let (manager, probe) = stubborn_manager(Duration::from_secs(2));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(manager.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();

    handle.await.unwrap().unwrap();
    let running: usize = probe.state.lock().unwrap().running.values().sum();
    assert_eq!(running, 0);
    assert_eq!(probe.passes(&TargetRef::bootstrap(NAMESPACE)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_times_out_after_grace_period() {
    let (manager, _probe) = stubborn_manager(Duration::from_secs(60));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(manager.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();

    let result = handle.await.unwrap();
    assert!(
        matches!(result, Err(ManagerError::ShutdownTimeout(d)) if d == Duration::from_secs(30)),
        "got {result:?}"
    );
}

#[tokio::test]
async fn test_duplicate_controller_is_rejected() {
    let mut manager = Manager::new(Duration::from_secs(30));
    let probe = Probe::taking(Duration::ZERO);
    manager
        .register(Controller::new(BOOTSTRAP_CONTROLLER, probe.clone(), Duration::from_secs(600)))
        .unwrap();

    let error = manager
        .register(Controller::new(BOOTSTRAP_CONTROLLER, probe, Duration::from_secs(600)))
        .unwrap_err();

    assert!(matches!(error, ManagerError::DuplicateController(name) if name == "bootstrap"));
}

#[tokio::test]
async fn test_manager_without_controllers_fails() {
    let result = Manager::new(Duration::from_secs(30))
        .run(CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ManagerError::NoControllers)));
}

#[tokio::test(start_paused = true)]
async fn test_failing_controller_stops_manager() {
    let probe = Probe::taking(Duration::from_secs(1));
    let mut manager = Manager::new(Duration::from_secs(30));
    manager.register(Broken).unwrap();
    manager
        .register(
            Controller::new("probe", probe, Duration::from_secs(600))
                .with_target(TargetRef::bootstrap(NAMESPACE)),
        )
        .unwrap();

    let shutdown = CancellationToken::new();
    let result = manager.run(shutdown.clone()).await;

    assert!(
        matches!(&result, Err(ManagerError::ControllerFailed { name, .. }) if name == "broken"),
        "got {result:?}"
    );
    assert!(shutdown.is_cancelled());
}
