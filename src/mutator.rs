//! Mutation operation, configuration, and the hosting context.
//!
//! [`MutatorContext`] keeps the long-lived state explicit instead of
//! module-global: each context owns its record handle, its access policy,
//! and its optional background worker, and exposes the host-facing entry
//! points `setup`, `mutate`, `start`, and `stop`. Several independent
//! contexts can coexist in one process, which is what makes the protocol
//! testable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IsolockError, IsolockResult, MutateError};
use crate::policy::{EngineAccessPolicy, LockedAccess};
use crate::record::{RecordHandle, SharedRecord};
use crate::worker::{MutatorWorker, WorkerStatus};

/// Field mutated when no other key is configured.
pub const DEFAULT_FIELD_KEY: &str = "x";

/// Default amount added per mutation.
pub const DEFAULT_INCREMENT: f64 = 42.0;

/// Default wake period of the background worker.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);

/// Mutator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutatorConfig {
    /// Key of the numeric field to mutate.
    pub field_key: String,
    /// Amount added per mutation.
    pub increment: f64,
    /// Wake period of the background worker.
    pub period: Duration,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            field_key: DEFAULT_FIELD_KEY.to_string(),
            increment: DEFAULT_INCREMENT,
            period: DEFAULT_PERIOD,
        }
    }
}

/// Performs one read-modify-write against `record` and returns the written
/// value.
///
/// An absent field reads as `0.0` before the increment. The sequence is a
/// logical atomic step only if no concurrent actor can interleave between
/// the read and the write; providing that guarantee is the caller's job,
/// not this function's.
pub fn increment_field(record: &SharedRecord, key: &str, increment: f64) -> f64 {
    let current = record.get(key);
    let next = current + increment;
    record.set(key, next);
    next
}

/// Hosting context owning one record handle, one access policy, and at most
/// one background worker.
///
/// The default policy is [`LockedAccess`]: the synchronous [`mutate`] entry
/// point and the background worker both serialize through the same engine
/// lock, so they may legitimately run concurrently. Building a context with
/// [`DirectAccess`](crate::policy::DirectAccess) opts out of that guarantee
/// and is only correct while a single actor touches the record.
///
/// [`mutate`]: MutatorContext::mutate
#[derive(Debug)]
pub struct MutatorContext<P: EngineAccessPolicy = LockedAccess> {
    handle: Arc<RecordHandle>,
    policy: Arc<P>,
    config: MutatorConfig,
    worker: Mutex<Option<MutatorWorker>>,
}

impl MutatorContext<LockedAccess> {
    /// Creates a lock-guarded context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MutatorConfig::default())
    }

    /// Creates a lock-guarded context with a custom configuration.
    #[must_use]
    pub fn with_config(config: MutatorConfig) -> Self {
        Self::with_policy(LockedAccess::new(), config)
    }
}

impl Default for MutatorContext<LockedAccess> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: EngineAccessPolicy> MutatorContext<P> {
    /// Creates a context with an explicit access policy.
    #[must_use]
    pub fn with_policy(policy: P, config: MutatorConfig) -> Self {
        Self {
            handle: Arc::new(RecordHandle::new()),
            policy: Arc::new(policy),
            config,
            worker: Mutex::new(None),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &MutatorConfig {
        &self.config
    }

    /// The access policy shared by every entry point of this context.
    #[must_use]
    pub fn policy(&self) -> &Arc<P> {
        &self.policy
    }

    /// Registers the shared record, replacing any previous registration.
    ///
    /// Must be called (directly or via [`start`](Self::start)) before
    /// [`mutate`](Self::mutate).
    pub fn setup(&self, record: Arc<SharedRecord>) {
        self.handle.register(record);
    }

    /// The currently registered record, if any.
    #[must_use]
    pub fn current_record(&self) -> Option<Arc<SharedRecord>> {
        self.handle.current()
    }

    /// Performs one mutation on the calling thread and returns the written
    /// value.
    ///
    /// Runs under the context's access policy, so with [`LockedAccess`] it
    /// is safe to call while the background worker is running.
    ///
    /// # Errors
    ///
    /// Returns [`MutateError::Unregistered`] if no record was registered.
    pub fn mutate(&self) -> IsolockResult<f64> {
        self.policy.with_engine(|| {
            let record = self
                .handle
                .current()
                .ok_or(IsolockError::Mutate(MutateError::Unregistered))?;
            Ok(increment_field(
                &record,
                &self.config.field_key,
                self.config.increment,
            ))
        })
    }

    /// Registers the record and launches the background worker.
    ///
    /// Returns immediately; the worker then wakes once per configured
    /// period. Calling `start` while a worker is running stops and joins the
    /// old worker before spawning the replacement, so at most one worker
    /// mutates per context.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the worker slot lock is poisoned.
    pub fn start(&self, record: Arc<SharedRecord>) -> IsolockResult<()> {
        let mut slot = self
            .worker
            .lock()
            .map_err(|_| IsolockError::internal("worker slot lock poisoned"))?;

        // Join the old worker before the new record becomes visible, so a
        // replaced worker can never mutate its successor's record.
        if let Some(mut old) = slot.take() {
            debug!("replacing running mutator worker");
            old.stop();
        }
        self.handle.register(record);

        *slot = Some(MutatorWorker::spawn(
            Arc::clone(&self.handle),
            Arc::clone(&self.policy),
            self.config.clone(),
        ));
        Ok(())
    }

    /// Stops the background worker and joins its thread. Idempotent; a
    /// no-op if no worker was ever started.
    ///
    /// Counters remain readable after the stop.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.worker.lock() {
            if let Some(worker) = slot.as_mut() {
                worker.stop();
            }
        }
    }

    /// Status of the most recently started worker, if any.
    #[must_use]
    pub fn worker_status(&self) -> Option<Arc<WorkerStatus>> {
        self.worker
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(MutatorWorker::status))
    }

    /// Number of background mutations completed by the current worker.
    ///
    /// Zero if no worker was ever started.
    #[must_use]
    pub fn completed_mutations(&self) -> u64 {
        self.worker_status()
            .map_or(0, |status| status.completed_mutations())
    }
}
