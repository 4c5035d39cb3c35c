//! Engine access strategies.
//!
//! Two interchangeable policies decide how a critical section reaches the
//! engine: [`DirectAccess`] runs it bare, [`LockedAccess`] brackets it with
//! the engine lock. The choice is made explicitly by whoever builds the
//! context — the two are never mixed implicitly.
//!
//! `DirectAccess` is correct only while a single actor touches the engine
//! (the pure synchronous case). Pairing it with a background worker loses
//! updates by construction; that pairing exists to document the hazard, not
//! to be deployed.

use std::sync::Arc;

use crate::engine::EngineLock;

/// Strategy for entering the engine around a critical section.
pub trait EngineAccessPolicy: Send + Sync + 'static {
    /// Runs `critical_section` under whatever exclusivity this policy
    /// provides.
    fn with_engine<T>(&self, critical_section: impl FnOnce() -> T) -> T;
}

/// No synchronization: the critical section runs on the calling thread with
/// no exclusivity guarantee beyond what the caller already has.
///
/// Safe when the host dispatch model guarantees the calling thread is the
/// only one permitted to touch the engine. Unsafe (lost updates) as soon as
/// a second actor appears.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectAccess;

impl EngineAccessPolicy for DirectAccess {
    fn with_engine<T>(&self, critical_section: impl FnOnce() -> T) -> T {
        critical_section()
    }
}

/// Serializes every critical section through a shared [`EngineLock`].
///
/// All actors holding a clone of the same policy are strictly ordered; N
/// completed read-modify-write operations from value `v0` deterministically
/// end at `v0 + N * increment`, whatever the thread interleaving.
#[derive(Debug, Clone)]
pub struct LockedAccess {
    lock: Arc<EngineLock>,
}

impl LockedAccess {
    /// Creates a policy with its own fresh engine lock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock(Arc::new(EngineLock::new()))
    }

    /// Creates a policy sharing an existing engine lock.
    ///
    /// Every actor that may race on the same engine must be built from the
    /// same lock.
    #[must_use]
    pub fn with_lock(lock: Arc<EngineLock>) -> Self {
        Self { lock }
    }

    /// Returns the underlying engine lock.
    #[must_use]
    pub fn lock(&self) -> &Arc<EngineLock> {
        &self.lock
    }
}

impl Default for LockedAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineAccessPolicy for LockedAccess {
    fn with_engine<T>(&self, critical_section: impl FnOnce() -> T) -> T {
        let _guard = self.lock.enter();
        critical_section()
    }
}
