//! End-to-end scenarios exercising [`workcell::core::manager::UnifiedManager`]
//! as a whole: pool scaling under load, progress milestones, timeout/retry
//! sequencing, priority preemption, and auto-restart alerting.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use workcell::config::manager::ManagerConfig;
use workcell::config::pool::{PoolConfig, RuntimeKind};
use workcell::core::dispatcher::SubmitOptions;
use workcell::core::executor::{ProgressSink, WorkerExecError, WorkerExecutor};
use workcell::core::manager::UnifiedManager;
use workcell::core::monitor::{AlertRule, Comparison, MetricKind, MonitorEvent};
use workcell::core::task::{Priority, RetryPolicy, TaskOutcome};
use workcell::Mutex;
use workcell::util::CapabilityTag;

#[derive(Serialize, Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

#[derive(Serialize, Deserialize)]
struct FactorialArgs {
    n: u64,
}

/// `calc` worker source for scenarios S1/S2: dispatches on operation name,
/// reporting progress milestones for `factorial`.
struct Calc;

#[async_trait]
impl WorkerExecutor for Calc {
    async fn execute(
        &self,
        operation: &str,
        payload: Vec<u8>,
        progress: &ProgressSink,
    ) -> Result<Vec<u8>, WorkerExecError> {
        match operation {
            "add" => {
                let args: AddArgs =
                    serde_json::from_slice(&payload).map_err(|e| WorkerExecError::fatal(e.to_string()))?;
                Ok((args.a + args.b).to_string().into_bytes())
            }
            "factorial" => {
                let args: FactorialArgs =
                    serde_json::from_slice(&payload).map_err(|e| WorkerExecError::fatal(e.to_string()))?;
                let mut acc: u128 = 1;
                for i in 1..=args.n {
                    acc *= u128::from(i);
                    let milestone = ((i * 100) / args.n.max(1)) as u8;
                    if milestone % 5 == 0 {
                        progress.report(milestone);
                    }
                }
                Ok(acc.to_string().into_bytes())
            }
            other => Err(WorkerExecError::fatal(format!("unknown operation {other}"))),
        }
    }
}

/// S1: a pool scales from 1 to 2 workers to serve 3 concurrent NORMAL
/// tasks, then shrinks back to `min_workers` once they settle.
#[tokio::test]
async fn s1_pool_scales_under_concurrent_load_and_shrinks_back() {
    let manager = UnifiedManager::new(ManagerConfig::default());
    let tag = CapabilityTag::new("calc");
    let mut config = PoolConfig::new(tag.clone());
    config.min_workers = 1;
    config.max_workers = 2;
    config.idle_timeout = Duration::from_millis(50);
    config.runtime = RuntimeKind::Task;
    manager
        .factory()
        .register_custom_worker_source(tag.clone(), Arc::new(Calc), config)
        .expect("register");
    manager.initialize().expect("initialize");

    let dispatcher = manager.dispatcher();
    let inputs = [(1, 2), (3, 4), (5, 6)];
    let mut ids = Vec::new();
    for (a, b) in inputs {
        let payload = serde_json::to_vec(&AddArgs { a, b }).unwrap();
        let opts = SubmitOptions { worker_type: Some(tag.clone()), ..SubmitOptions::default() };
        ids.push(dispatcher.submit_task("add", payload, opts).expect("submit"));
    }

    let mut results = Vec::new();
    for id in ids {
        let outcome = dispatcher.await_task(id).await.expect("await task");
        match outcome {
            TaskOutcome::Completed(payload) => results.push(String::from_utf8(payload).unwrap()),
            other => panic!("expected completion, got {other:?}"),
        }
    }
    assert_eq!(results, vec!["3", "7", "11"]);

    let pool = manager.factory().get_pool(&tag).expect("pool built");
    for _ in 0..40 {
        if pool.snapshot().worker_count == config.min_workers {
            break;
        }
        pool.evict_idle();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pool.snapshot().worker_count, config.min_workers);

    manager.shutdown().await;
}

/// S2: `factorial(5)` reports progress at 20/40/60/80/100 percent
/// milestones (5 equal steps) and completes with `120`.
#[tokio::test]
async fn s2_factorial_reports_progress_milestones_and_completes() {
    let manager = UnifiedManager::new(ManagerConfig::default());
    let tag = CapabilityTag::new("calc");
    manager.register_worker_source(tag.clone(), Arc::new(Calc)).expect("register");
    manager.initialize().expect("initialize");

    let mut events = manager.events().subscribe();
    let dispatcher = manager.dispatcher();
    let payload = serde_json::to_vec(&FactorialArgs { n: 5 }).unwrap();
    let opts = SubmitOptions { worker_type: Some(tag), ..SubmitOptions::default() };
    let id = dispatcher.submit_task("factorial", payload, opts).expect("submit");

    let mut milestones = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event within budget")
            .expect("event bus still open");
        if event.task_id != id {
            continue;
        }
        match event.kind {
            workcell::core::events::TaskEventKind::Progress(pct) => milestones.push(pct),
            workcell::core::events::TaskEventKind::Completed => break,
            workcell::core::events::TaskEventKind::Failed(msg) => panic!("task failed: {msg}"),
            _ => {}
        }
    }
    assert_eq!(milestones, vec![20, 40, 60, 80, 100]);

    let outcome = dispatcher.await_task(id).await.expect("await task");
    assert!(matches!(outcome, TaskOutcome::Completed(p) if p == b"120"));

    manager.shutdown().await;
}

struct NeverResponds {
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl WorkerExecutor for NeverResponds {
    async fn execute(&self, _op: &str, _payload: Vec<u8>, _progress: &ProgressSink) -> Result<Vec<u8>, WorkerExecError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Vec::new())
    }
}

/// S3: a worker body that never replies is timed out twice under a
/// 2-attempt retry budget, and both attempts force a worker restart before
/// the task finally settles as `TimedOut`.
#[tokio::test]
async fn s3_stuck_worker_times_out_retries_once_then_fails() {
    let manager = UnifiedManager::new(ManagerConfig::default());
    let tag = CapabilityTag::new("stuck");
    let attempts = Arc::new(AtomicU32::new(0));
    let mut config = PoolConfig::new(tag.clone());
    config.min_workers = 1;
    config.max_workers = 1;
    config.runtime = RuntimeKind::Task;
    manager
        .factory()
        .register_custom_worker_source(
            tag.clone(),
            Arc::new(NeverResponds { attempts: Arc::clone(&attempts) }),
            config,
        )
        .expect("register");
    manager.initialize().expect("initialize");

    let pool = manager.factory().get_pool(&tag).expect("pool built");
    let restarts_before: u32 = pool.worker_handles().iter().map(|w| w.restart_count).sum();

    let dispatcher = manager.dispatcher();
    let opts = SubmitOptions {
        timeout: Some(Duration::from_millis(60)),
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(20),
            backoff_ceiling: Duration::from_millis(20),
        },
        worker_type: Some(tag),
        ..SubmitOptions::default()
    };
    let id = dispatcher.submit_task("run", Vec::new(), opts).expect("submit");

    let outcome = tokio::time::timeout(Duration::from_secs(3), dispatcher.await_task(id))
        .await
        .expect("dispatcher settles within budget")
        .expect("await task");

    assert!(matches!(outcome, TaskOutcome::TimedOut));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let restarts_after: u32 = pool.worker_handles().iter().map(|w| w.restart_count).sum();
    assert_eq!(restarts_after - restarts_before, 2);

    manager.shutdown().await;
}

/// Records the order operations start executing, holding every call after
/// the first on a gate until the test releases it — long enough to queue
/// several more tasks behind a saturated pool.
struct GateExecutor {
    order: Arc<Mutex<Vec<String>>>,
    gate: Arc<Notify>,
    released: std::sync::atomic::AtomicUsize,
    concurrency: usize,
}

#[async_trait]
impl WorkerExecutor for GateExecutor {
    async fn execute(&self, _op: &str, payload: Vec<u8>, _progress: &ProgressSink) -> Result<Vec<u8>, WorkerExecError> {
        let label = String::from_utf8(payload).unwrap();
        self.order.lock().push(label.clone());
        let slot = self.released.fetch_add(1, Ordering::SeqCst);
        if slot < self.concurrency {
            self.gate.notified().await;
        }
        Ok(label.into_bytes())
    }
}

/// S5: saturate a 2-worker pool with 4 LOW-priority tasks, then submit one
/// CRITICAL task. Expected: CRITICAL runs next after the first slot frees,
/// ahead of the remaining LOWs regardless of their submission order.
#[tokio::test]
async fn s5_critical_task_preempts_queued_low_priority_tasks() {
    let tag = CapabilityTag::new("image");
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Notify::new());
    let executor: Arc<dyn WorkerExecutor> = Arc::new(GateExecutor {
        order: Arc::clone(&order),
        gate: Arc::clone(&gate),
        released: std::sync::atomic::AtomicUsize::new(0),
        concurrency: 2,
    });

    let manager = UnifiedManager::new(ManagerConfig::default());
    let mut config = PoolConfig::new(tag.clone());
    config.min_workers = 2;
    config.max_workers = 2;
    config.runtime = RuntimeKind::Task;
    manager
        .factory()
        .register_custom_worker_source(tag.clone(), executor, config)
        .expect("register");
    manager.initialize().expect("initialize");

    let dispatcher = manager.dispatcher();
    // Both workers are now Idle; the first two submissions occupy them and
    // block on the gate, so everything after queues.
    for label in ["low-a", "low-b"] {
        let opts = SubmitOptions { priority: Priority::Low, worker_type: Some(tag.clone()), ..SubmitOptions::default() };
        dispatcher.submit_task("run", label.as_bytes().to_vec(), opts).expect("submit");
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    for label in ["low-c", "low-d"] {
        let opts = SubmitOptions { priority: Priority::Low, worker_type: Some(tag.clone()), ..SubmitOptions::default() };
        dispatcher.submit_task("run", label.as_bytes().to_vec(), opts).expect("submit");
    }
    let critical_opts = SubmitOptions { priority: Priority::Critical, worker_type: Some(tag.clone()), ..SubmitOptions::default() };
    dispatcher.submit_task("run", b"critical".to_vec(), critical_opts).expect("submit critical");

    gate.notify_waiters();
    gate.notify_one();
    gate.notify_one();
    gate.notify_one();
    gate.notify_one();
    gate.notify_one();

    for _ in 0..200 {
        if order.lock().len() == 5 {
            break;
        }
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let order = order.lock().clone();
    assert_eq!(order.len(), 5);
    assert_eq!(&order[..2], &["low-a", "low-b"]);
    assert_eq!(order[2], "critical");

    manager.shutdown().await;
}

struct FlakyThird {
    calls: AtomicU32,
}

#[async_trait]
impl WorkerExecutor for FlakyThird {
    async fn execute(&self, _op: &str, payload: Vec<u8>, _progress: &ProgressSink) -> Result<Vec<u8>, WorkerExecError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 3 == 0 {
            Err(WorkerExecError::transient("simulated failure on every third call"))
        } else {
            Ok(payload)
        }
    }
}

/// S6: with `autoRestart` enabled and a worker failing every third task,
/// 9 submissions should raise at least one `workerNeedsRestart` alert and
/// leave the pool within its configured worker bounds.
#[tokio::test]
async fn s6_auto_restart_flags_a_repeatedly_failing_worker() {
    let manager = UnifiedManager::new(ManagerConfig::default());
    let tag = CapabilityTag::new("flaky");
    let mut config = PoolConfig::new(tag.clone());
    config.min_workers = 1;
    config.max_workers = 1;
    config.runtime = RuntimeKind::Task;
    manager
        .factory()
        .register_custom_worker_source(
            tag.clone(),
            Arc::new(FlakyThird { calls: AtomicU32::new(0) }),
            config.clone(),
        )
        .expect("register");
    manager.initialize().expect("initialize");

    manager.monitor().set_auto_restart(true);
    manager.monitor().add_rule(AlertRule {
        name: "flaky-failure-rate".into(),
        tag: Some(tag.clone()),
        metric: MetricKind::FailureRate,
        threshold: 0.1,
        comparison: Comparison::GreaterThan,
    });
    let mut alerts = manager.monitor().subscribe();

    let dispatcher = manager.dispatcher();
    let opts = SubmitOptions {
        retry: RetryPolicy { max_attempts: 1, ..RetryPolicy::default() },
        worker_type: Some(tag.clone()),
        ..SubmitOptions::default()
    };
    for i in 0..9 {
        let id = dispatcher.submit_task("run", vec![i], opts.clone()).expect("submit");
        let _ = dispatcher.await_task(id).await;
    }

    manager.monitor().tick();

    let mut saw_restart_alert = false;
    while let Ok(event) = alerts.try_recv() {
        if matches!(event, MonitorEvent::WorkerNeedsRestart { .. }) {
            saw_restart_alert = true;
        }
    }
    assert!(saw_restart_alert, "expected at least one workerNeedsRestart alert");

    let pool = manager.factory().get_pool(&tag).expect("pool built");
    let worker_count = pool.snapshot().worker_count;
    assert!(worker_count >= config.min_workers && worker_count <= config.max_workers);

    manager.shutdown().await;
}
