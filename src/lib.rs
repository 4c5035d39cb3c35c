//! # isolock - Lock-guarded mutation of engine-owned state
//!
//! isolock implements the synchronization discipline that lets background
//! worker threads safely mutate state owned by a single-threaded execution
//! engine. The engine's context may only be entered by one thread at a time;
//! the hard part is not the mutation (incrementing a numeric field) but the
//! enter/exit protocol that makes the mutation safe from a second thread.
//!
//! ## Core Concepts
//!
//! - **SharedRecord**: the engine-owned key-value object whose field is
//!   repeatedly incremented
//! - **RecordHandle**: the process-lived slot tracking the currently
//!   registered record
//! - **EngineLock**: the single entry token guarding "currently entered"
//!   status of the engine
//! - **EngineAccessPolicy**: interchangeable strategies — direct
//!   (unsynchronized) or lock-guarded — around every engine access
//! - **MutatorContext**: the hosting context exposing `setup`, `mutate`,
//!   `start`, and `stop`
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use isolock::{MutatorContext, SharedRecord};
//!
//! let ctx = MutatorContext::new();
//! let record = Arc::new(SharedRecord::new());
//!
//! ctx.setup(Arc::clone(&record));
//! ctx.mutate().unwrap();
//! assert_eq!(record.get("x"), 42.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod error;
pub mod mutator;
pub mod policy;
pub mod record;
pub mod worker;

// Re-export primary types at crate root for convenience
pub use engine::{EngineGuard, EngineLock};
pub use error::{IsolockError, IsolockResult, LockError, MutateError};
pub use mutator::{
    increment_field, MutatorConfig, MutatorContext, DEFAULT_FIELD_KEY, DEFAULT_INCREMENT,
    DEFAULT_PERIOD,
};
pub use policy::{DirectAccess, EngineAccessPolicy, LockedAccess};
pub use record::{RecordHandle, SharedRecord};
pub use worker::{MutatorWorker, WorkerState, WorkerStatus};
