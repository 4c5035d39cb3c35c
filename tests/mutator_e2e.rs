use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use isolock::{
    DirectAccess, EngineAccessPolicy, EngineLock, LockError, LockedAccess, MutatorConfig,
    MutatorContext, SharedRecord,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> MutatorConfig {
    MutatorConfig {
        period: Duration::from_millis(5),
        ..MutatorConfig::default()
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

/// Runs the worker until at least `min_wakes` mutations completed, stops it,
/// and returns the final completed count.
fn run_worker_for(ctx: &MutatorContext, record: &Arc<SharedRecord>, min_wakes: u64) -> u64 {
    ctx.start(Arc::clone(record)).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        ctx.completed_mutations() >= min_wakes
    }));
    ctx.stop();
    ctx.completed_mutations()
}

#[test]
fn synchronous_single_thread_correctness() {
    init_tracing();

    let ctx = MutatorContext::with_policy(DirectAccess, MutatorConfig::default());
    let record = Arc::new(SharedRecord::with_field("x", 10.0));
    ctx.setup(Arc::clone(&record));

    for k in 1..=20u32 {
        ctx.mutate().unwrap();
        assert_eq!(record.get("x"), 10.0 + 42.0 * f64::from(k));
    }
}

#[test]
fn lock_guarded_background_is_exact() {
    init_tracing();

    // Worker wakes are awaited through the completed counter rather than
    // wall-clock sleeps; after stop() the count is final, so the field must
    // equal increment * count exactly for every target.
    for min_wakes in [1u64, 10, 100] {
        let ctx = MutatorContext::with_config(fast_config());
        let record = Arc::new(SharedRecord::new());

        let completed = run_worker_for(&ctx, &record, min_wakes);
        assert!(completed >= min_wakes);
        assert_eq!(record.get("x"), 42.0 * completed as f64);
    }
}

#[test]
fn zero_wakes_leave_the_record_untouched() {
    init_tracing();

    // A long period plus an immediate stop covers the N = 0 case.
    let ctx = MutatorContext::with_config(MutatorConfig {
        period: Duration::from_secs(60),
        ..MutatorConfig::default()
    });
    let record = Arc::new(SharedRecord::new());

    ctx.start(Arc::clone(&record)).unwrap();
    ctx.stop();

    assert_eq!(ctx.completed_mutations(), 0);
    assert_eq!(record.get("x"), 0.0);
    assert!(!record.contains_field("x"));
}

#[test]
fn worker_and_host_mutations_serialize_exactly() {
    init_tracing();

    let ctx = MutatorContext::with_config(fast_config());
    let record = Arc::new(SharedRecord::new());
    ctx.start(Arc::clone(&record)).unwrap();

    // Host-thread entry point racing the worker; both go through the same
    // engine lock, so no update may be lost.
    let host_calls = 50u64;
    for _ in 0..host_calls {
        ctx.mutate().unwrap();
    }

    assert!(wait_until(Duration::from_secs(30), || {
        ctx.completed_mutations() >= 10
    }));
    ctx.stop();

    let total = ctx.completed_mutations() + host_calls;
    assert_eq!(record.get("x"), 42.0 * total as f64);
}

#[test]
fn locked_policy_critical_sections_never_overlap() {
    init_tracing();

    let policy = Arc::new(LockedAccess::new());
    let in_section = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let policy = Arc::clone(&policy);
        let in_section = Arc::clone(&in_section);
        let overlaps = Arc::clone(&overlaps);
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                policy.with_engine(|| {
                    if in_section.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    // Artificial delay so an overlapping window would be seen.
                    thread::sleep(Duration::from_micros(200));
                    in_section.store(false, Ordering::SeqCst);
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

/// One unsynchronized read-modify-write pass, with a yield widening the
/// window between the read and the write.
fn racy_increments(record: &SharedRecord, iterations: u64) {
    for _ in 0..iterations {
        let current = record.get("x");
        thread::yield_now();
        record.set("x", current + 42.0);
    }
}

#[test]
fn unsynchronized_threads_lose_updates() {
    init_tracing();

    // Negative test documenting the hazard: the loss rate is nondeterministic,
    // so we retry trials until a loss shows up instead of asserting a rate.
    let iterations = 5_000u64;
    let expected = 42.0 * (2 * iterations) as f64;

    let mut observed_loss = false;
    for _ in 0..10 {
        let record = Arc::new(SharedRecord::new());

        let a = {
            let record = Arc::clone(&record);
            thread::spawn(move || racy_increments(&record, iterations))
        };
        let b = {
            let record = Arc::clone(&record);
            thread::spawn(move || racy_increments(&record, iterations))
        };
        a.join().unwrap();
        b.join().unwrap();

        let final_value = record.get("x");
        // Increments can only be lost, never invented.
        assert!(final_value <= expected);
        if final_value < expected {
            observed_loss = true;
            break;
        }
    }

    assert!(
        observed_loss,
        "two unsynchronized threads never lost an update across all trials"
    );
}

#[test]
fn same_harness_is_exact_under_the_shared_lock() {
    init_tracing();

    // Same harness as the negative test, but every read-modify-write is
    // bracketed by the shared engine lock: the total is exact.
    let iterations = 2_000u64;
    let policy = Arc::new(LockedAccess::new());
    let record = Arc::new(SharedRecord::new());

    let mut handles = Vec::new();
    for _ in 0..2 {
        let policy = Arc::clone(&policy);
        let record = Arc::clone(&record);
        handles.push(thread::spawn(move || {
            for _ in 0..iterations {
                policy.with_engine(|| {
                    let current = record.get("x");
                    thread::yield_now();
                    record.set("x", current + 42.0);
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(record.get("x"), 42.0 * (2 * iterations) as f64);
}

#[test]
fn restart_redirects_mutations_to_the_new_record() {
    init_tracing();

    let ctx = MutatorContext::with_config(fast_config());
    let first = Arc::new(SharedRecord::new());
    let second = Arc::new(SharedRecord::new());

    ctx.start(Arc::clone(&first)).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        ctx.completed_mutations() >= 1
    }));

    // start() joins the old worker before registering the replacement, so
    // the first record's value is final from here on.
    ctx.start(Arc::clone(&second)).unwrap();
    let first_final = first.get("x");

    assert!(wait_until(Duration::from_secs(30), || {
        ctx.completed_mutations() >= 5
    }));
    ctx.stop();

    assert_eq!(first.get("x"), first_final);
    assert_eq!(second.get("x"), 42.0 * ctx.completed_mutations() as f64);
}

#[test]
fn missing_field_defaults_to_zero_before_increment() {
    init_tracing();

    let ctx = MutatorContext::new();
    let record = Arc::new(SharedRecord::new());
    ctx.setup(Arc::clone(&record));

    let value = ctx.mutate().unwrap();
    assert_eq!(value, 42.0);
    assert_eq!(record.get("x"), 42.0);
}

#[test]
fn lock_timeout_observed_across_threads() {
    init_tracing();

    let lock = Arc::new(EngineLock::new());
    let release = Arc::new(AtomicBool::new(false));

    let holder = {
        let lock = Arc::clone(&lock);
        let release = Arc::clone(&release);
        thread::spawn(move || {
            let _guard = lock.enter();
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    assert!(wait_until(Duration::from_secs(5), || lock.is_held()));

    let err = lock.enter_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, LockError::Timeout { duration_ms: 20 }));
    assert!(lock.try_enter().is_none());

    release.store(true, Ordering::SeqCst);
    holder.join().unwrap();

    let _guard = lock
        .enter_timeout(Duration::from_millis(500))
        .expect("lock acquirable after the holder exits");
}

#[test]
fn dropping_the_context_stops_the_worker() {
    init_tracing();

    let ctx = MutatorContext::with_config(fast_config());
    let record = Arc::new(SharedRecord::new());
    ctx.start(Arc::clone(&record)).unwrap();

    assert!(wait_until(Duration::from_secs(30), || {
        ctx.completed_mutations() >= 1
    }));

    let status = ctx.worker_status().unwrap();
    drop(ctx);

    // The worker joined during drop; the count and the field are final.
    let completed = status.completed_mutations();
    assert_eq!(record.get("x"), 42.0 * completed as f64);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(status.completed_mutations(), completed);
}
