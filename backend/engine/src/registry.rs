//! Concurrency-safe store of in-flight and recently-terminal call
//! state, the single owner of mutable call records.
//!
//! Each entry pairs a mutation gate (serializing read-modify-write
//! cycles for one call) with a committed snapshot that readers take
//! without waiting on in-progress mutations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use callbridge_core::{CallError, CallId, CallState, Result};

struct Entry {
    gate: Mutex<()>,
    snapshot: RwLock<CallState>,
}

/// Result of registering a call. An idempotency key already held by a
/// live entry yields the existing call instead of a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Duplicate(CallId),
}

#[derive(Default)]
pub struct CallRegistry {
    entries: RwLock<HashMap<CallId, Arc<Entry>>>,
    by_idempotency_key: RwLock<HashMap<String, CallId>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted call. The call id must be unused.
    /// The idempotency key is checked and reserved under the same write
    /// lock, so two racing creates with one key collapse to one entry.
    pub fn create(&self, state: CallState) -> Result<CreateOutcome> {
        let mut entries = write(&self.entries);
        if entries.contains_key(&state.call_id) {
            return Err(CallError::Internal(format!(
                "call id collision: {}",
                state.call_id
            )));
        }
        if let Some(key) = &state.idempotency_key {
            let mut keys = write(&self.by_idempotency_key);
            if let Some(existing) = keys.get(key) {
                if entries.contains_key(existing) {
                    return Ok(CreateOutcome::Duplicate(existing.clone()));
                }
            }
            keys.insert(key.clone(), state.call_id.clone());
        }
        entries.insert(
            state.call_id.clone(),
            Arc::new(Entry {
                gate: Mutex::new(()),
                snapshot: RwLock::new(state),
            }),
        );
        Ok(CreateOutcome::Created)
    }

    /// Last committed snapshot for a call. Never waits on a mutation in
    /// progress.
    pub fn get(&self, call_id: &str) -> Option<CallState> {
        let entry = read(&self.entries).get(call_id).cloned()?;
        let state = read(&entry.snapshot).clone();
        Some(state)
    }

    /// Existing call for an idempotency key, if it has not been evicted.
    pub fn find_by_idempotency_key(&self, key: &str) -> Option<CallState> {
        let call_id = read(&self.by_idempotency_key).get(key).cloned()?;
        self.get(&call_id)
    }

    /// Reverse lookup from a gateway-assigned call identifier.
    pub fn find_by_telephony_ref(&self, telephony_ref: &str) -> Option<CallId> {
        let entries = read(&self.entries);
        entries.iter().find_map(|(call_id, entry)| {
            let state = read(&entry.snapshot);
            (state.telephony_ref.as_deref() == Some(telephony_ref)).then(|| call_id.clone())
        })
    }

    /// Atomic read-modify-write for one call. Mutations for the same
    /// call are serialized; different calls proceed in parallel. The
    /// snapshot is committed only after `f` returns, so readers never
    /// observe a half-applied mutation.
    pub async fn mutate<R>(
        &self,
        call_id: &str,
        f: impl FnOnce(&mut CallState) -> R,
    ) -> Result<(CallState, R)> {
        let entry = read(&self.entries)
            .get(call_id)
            .cloned()
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;
        let _guard = entry.gate.lock().await;
        let mut working = read(&entry.snapshot).clone();
        let out = f(&mut working);
        *write(&entry.snapshot) = working.clone();
        Ok((working, out))
    }

    /// Drop terminal entries whose last transition is older than the
    /// retention window. Non-terminal calls are never evicted.
    pub fn evict_older_than(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        let mut evicted: Vec<(CallId, Option<String>)> = Vec::new();
        {
            let entries = read(&self.entries);
            for (call_id, entry) in entries.iter() {
                let state = read(&entry.snapshot);
                if state.status.is_terminal() && state.last_transition_at < cutoff {
                    evicted.push((call_id.clone(), state.idempotency_key.clone()));
                }
            }
        }
        if evicted.is_empty() {
            return 0;
        }
        let mut entries = write(&self.entries);
        let mut keys = write(&self.by_idempotency_key);
        for (call_id, idempotency_key) in &evicted {
            entries.remove(call_id);
            if let Some(key) = idempotency_key {
                if keys.get(key) == Some(call_id) {
                    keys.remove(key);
                }
            }
        }
        debug!(count = evicted.len(), "evicted terminal call state");
        evicted.len()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
