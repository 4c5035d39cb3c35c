//! The engine-owned shared record and the process-lived handle to it.
//!
//! A [`SharedRecord`] models a mutable key-value object living in the
//! engine's managed heap: numeric fields addressed by string keys, with the
//! engine-default read of `0.0` for keys that were never set. Individual
//! `get`/`set` calls are memory-safe from any thread, but a read-modify-write
//! sequence is only atomic if the caller serializes it — see
//! [`crate::engine::EngineLock`].
//!
//! A [`RecordHandle`] is the long-lived registration slot: it tracks at most
//! one record at a time and lives for the lifetime of the hosting context.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A mutable record with numeric fields, owned by the engine.
///
/// The record never destroys itself; it is shared by reference
/// (`Arc<SharedRecord>`) and outlives every handle that points at it.
#[derive(Debug, Default)]
pub struct SharedRecord {
    fields: RwLock<HashMap<String, f64>>,
}

impl SharedRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record with a single field preset.
    #[must_use]
    pub fn with_field(key: impl Into<String>, value: f64) -> Self {
        let record = Self::new();
        record.set(key, value);
        record
    }

    /// Reads a field.
    ///
    /// A key that was never set reads as `0.0`, matching the engine's
    /// default for missing properties.
    #[must_use]
    pub fn get(&self, key: &str) -> f64 {
        self.fields
            .read()
            .map(|fields| fields.get(key).copied().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    /// Writes a field, inserting it if absent.
    pub fn set(&self, key: impl Into<String>, value: f64) {
        if let Ok(mut fields) = self.fields.write() {
            fields.insert(key.into(), value);
        }
    }

    /// Returns true if the field has been explicitly set.
    #[must_use]
    pub fn contains_field(&self, key: &str) -> bool {
        self.fields
            .read()
            .map(|fields| fields.contains_key(key))
            .unwrap_or(false)
    }

    /// Returns a point-in-time copy of all fields.
    ///
    /// The copy is decoupled from the live record and safe to serialize or
    /// inspect without holding anything.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.fields
            .read()
            .map(|fields| fields.clone())
            .unwrap_or_default()
    }
}

/// The long-lived slot tracking the currently registered record.
///
/// At most one record is tracked; re-registration replaces the previous
/// reference (last write wins). The handle holds a shared reference, never
/// exclusive ownership — the engine side of the `Arc` keeps the record alive
/// regardless of what the handle does.
#[derive(Debug, Default)]
pub struct RecordHandle {
    slot: RwLock<Option<Arc<SharedRecord>>>,
}

impl RecordHandle {
    /// Creates an empty, unregistered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record, replacing any previous registration.
    pub fn register(&self, record: Arc<SharedRecord>) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(record);
        }
    }

    /// Returns the currently registered record, or `None` if no record was
    /// ever registered.
    #[must_use]
    pub fn current(&self) -> Option<Arc<SharedRecord>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    /// Returns true if a record is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.current().is_some()
    }
}
