//! Background mutator worker.
//!
//! The worker runs on a dedicated named thread and wakes on a fixed period.
//! Each wake performs exactly one read-modify-write against the currently
//! registered record, bracketed by whatever exclusivity the configured
//! access policy provides; no engine access ever happens outside that
//! bracket. A stop signal is observed at the top of every cycle, so the
//! thread is cancellable and joinable instead of detached.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::mutator::{increment_field, MutatorConfig};
use crate::policy::EngineAccessPolicy;
use crate::record::RecordHandle;

/// Observable phase of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for the next wake (or the stop signal).
    Sleeping = 0,
    /// Wake fired; waiting to enter the engine.
    AcquiringLock = 1,
    /// Inside the critical section, mutating the record.
    InCriticalSection = 2,
    /// Stop signal observed; the loop has exited.
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::AcquiringLock,
            2 => Self::InCriticalSection,
            3 => Self::Stopped,
            _ => Self::Sleeping,
        }
    }
}

/// Shared view of a running worker: current phase and wake counters.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    state: AtomicU8,
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl WorkerStatus {
    /// Current loop phase. May be stale by the time the caller reads it.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of wakes that completed a mutation.
    #[must_use]
    pub fn completed_mutations(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of wakes skipped because no record was registered.
    #[must_use]
    pub fn skipped_wakes(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Handle to the background mutator thread.
///
/// Dropping the handle stops and joins the thread; the worker never outlives
/// its owner as a detached loop.
#[derive(Debug)]
pub struct MutatorWorker {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
    status: Arc<WorkerStatus>,
}

impl MutatorWorker {
    /// Spawns the worker thread.
    ///
    /// The worker looks the record up through `handle` on every wake, so a
    /// later re-registration redirects subsequent mutations to the new
    /// record.
    ///
    /// Most callers go through
    /// [`MutatorContext::start`](crate::mutator::MutatorContext::start)
    /// instead of spawning a worker directly.
    pub fn spawn<P: EngineAccessPolicy>(
        handle: Arc<RecordHandle>,
        policy: Arc<P>,
        config: MutatorConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let status = Arc::new(WorkerStatus::default());

        let thread_status = Arc::clone(&status);
        let join = thread::Builder::new()
            .name("isolock-mutator".to_string())
            .spawn(move || run_loop(handle, policy, config, thread_status, stop_rx))
            .expect("failed to spawn isolock mutator worker");

        Self {
            stop_tx,
            join: Some(join),
            status,
        }
    }

    /// Shared status of the worker loop.
    #[must_use]
    pub fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Signals the loop to stop and joins the thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            // Err here means the loop already exited and dropped its receiver.
            let _ = self.stop_tx.send(());
            if join.join().is_err() {
                warn!("mutator worker thread panicked");
            }
        }
    }
}

impl Drop for MutatorWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<P: EngineAccessPolicy>(
    handle: Arc<RecordHandle>,
    policy: Arc<P>,
    config: MutatorConfig,
    status: Arc<WorkerStatus>,
    stop_rx: Receiver<()>,
) {
    debug!(
        period_ms = config.period.as_millis() as u64,
        field_key = %config.field_key,
        increment = config.increment,
        "mutator worker started"
    );

    let ticker = tick(config.period);
    loop {
        status.set_state(WorkerState::Sleeping);
        select! {
            // Both an explicit signal and a dropped sender stop the loop.
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                status.set_state(WorkerState::AcquiringLock);
                let applied = policy.with_engine(|| {
                    status.set_state(WorkerState::InCriticalSection);
                    handle
                        .current()
                        .map(|record| increment_field(&record, &config.field_key, config.increment))
                });
                match applied {
                    Some(value) => {
                        status.completed.fetch_add(1, Ordering::SeqCst);
                        trace!(value, "mutation applied");
                    }
                    None => {
                        status.skipped.fetch_add(1, Ordering::SeqCst);
                        warn!("wake skipped: no record registered");
                    }
                }
            }
        }
    }

    status.set_state(WorkerState::Stopped);
    debug!("mutator worker stopped");
}
