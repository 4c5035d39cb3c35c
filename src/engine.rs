//! Mutual exclusion for engine entry.
//!
//! The engine's execution context may only be entered by one thread at a
//! time. [`EngineLock`] enforces that invariant with a single entry token
//! passed through a bounded channel of capacity one: acquiring the lock means
//! receiving the token, releasing it means sending the token back. The
//! channel gives us blocking, non-blocking, and timed acquisition with one
//! primitive, and the token travels inside an [`EngineGuard`] so release
//! happens on every exit path, panics included.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::debug;

use crate::error::LockError;

/// The single entry permit. Exactly zero or one exists per lock.
#[derive(Debug)]
struct EntryToken;

/// Mutual-exclusion primitive guarding "currently entered" status of the
/// engine.
///
/// Blocked acquirers are woken in the order the channel hands out messages,
/// which in practice keeps any one waiter from starving indefinitely.
#[derive(Debug)]
pub struct EngineLock {
    token_tx: Sender<EntryToken>,
    token_rx: Receiver<EntryToken>,
}

impl EngineLock {
    /// Creates an unlocked engine lock.
    #[must_use]
    pub fn new() -> Self {
        let (token_tx, token_rx) = bounded::<EntryToken>(1);
        token_tx
            .send(EntryToken)
            .expect("freshly created token channel rejected the entry token");
        Self { token_tx, token_rx }
    }

    /// Blocks until the entry token is free, then enters the engine.
    ///
    /// Blocking is unbounded; use [`enter_timeout`](Self::enter_timeout) when
    /// liveness matters. The returned guard exits the engine when dropped.
    pub fn enter(&self) -> EngineGuard<'_> {
        debug!("waiting for engine entry token");
        let token = self
            .token_rx
            .recv()
            .expect("engine lock token channel closed while lock alive");
        debug!("engine entered");
        EngineGuard {
            lock: self,
            token: Some(token),
        }
    }

    /// Attempts to enter the engine without blocking.
    ///
    /// Returns `None` if another thread currently holds the token.
    #[must_use]
    pub fn try_enter(&self) -> Option<EngineGuard<'_>> {
        match self.token_rx.try_recv() {
            Ok(token) => {
                debug!("engine entered");
                Some(EngineGuard {
                    lock: self,
                    token: Some(token),
                })
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks for at most `timeout` waiting to enter the engine.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the token is not released within
    /// the window, or [`LockError::Closed`] if the token channel is gone.
    pub fn enter_timeout(&self, timeout: Duration) -> Result<EngineGuard<'_>, LockError> {
        debug!(timeout_ms = timeout.as_millis() as u64, "waiting for engine entry token");
        match self.token_rx.recv_timeout(timeout) {
            Ok(token) => {
                debug!("engine entered");
                Ok(EngineGuard {
                    lock: self,
                    token: Some(token),
                })
            }
            Err(RecvTimeoutError::Timeout) => Err(LockError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LockError::Closed),
        }
    }

    /// Returns true if some thread currently holds the entry token.
    ///
    /// Diagnostic only: the answer may be stale by the time the caller
    /// observes it.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.token_rx.is_empty()
    }
}

impl Default for EngineLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the holding thread has entered the engine.
///
/// Dropping the guard exits the engine and returns the entry token, so a
/// panic inside the critical section cannot leak the lock.
#[must_use = "the engine is exited as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EngineGuard<'a> {
    lock: &'a EngineLock,
    token: Option<EntryToken>,
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            // Capacity one and the token was out, so the send cannot block.
            let _ = self.lock.token_tx.send(token);
            debug!("engine exited");
        }
    }
}
