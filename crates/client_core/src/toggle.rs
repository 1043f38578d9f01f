//! Optimistic toggle state: per-key records, the in-flight guard, and rollback.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{ConfirmationAction, ToggleError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub trait StoreKey: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}

/// What a view should render for one key.
///
/// `display_state` equals `committed_state` whenever `pending` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleRecord {
    pub committed_state: bool,
    pub display_state: bool,
    pub pending: bool,
    pub counter: Option<u64>,
}

impl ToggleRecord {
    fn idle(state: bool, counter: Option<u64>) -> Self {
        Self {
            committed_state: state,
            display_state: state,
            pending: false,
            counter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleEvent<K> {
    Seeded { key: K, record: ToggleRecord },
    Applied { key: K, record: ToggleRecord },
    Committed { key: K, record: ToggleRecord },
    RolledBack { key: K, record: ToggleRecord },
}

impl<K> ToggleEvent<K> {
    pub fn key(&self) -> &K {
        match self {
            ToggleEvent::Seeded { key, .. }
            | ToggleEvent::Applied { key, .. }
            | ToggleEvent::Committed { key, .. }
            | ToggleEvent::RolledBack { key, .. } => key,
        }
    }

    pub fn record(&self) -> &ToggleRecord {
        match self {
            ToggleEvent::Seeded { record, .. }
            | ToggleEvent::Applied { record, .. }
            | ToggleEvent::Committed { record, .. }
            | ToggleEvent::RolledBack { record, .. } => record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Applied,
    /// A toggle was in flight; the in-flight optimistic value was kept.
    SkippedPending,
}

#[derive(Debug, Clone, Copy)]
struct RollbackPoint {
    display_state: bool,
    counter: Option<u64>,
}

#[derive(Debug)]
struct Slot {
    record: ToggleRecord,
    rollback: Option<RollbackPoint>,
}

struct StoreInner<K> {
    records: Mutex<HashMap<K, Slot>>,
    events: broadcast::Sender<ToggleEvent<K>>,
}

pub struct ToggleStore<K> {
    inner: Arc<StoreInner<K>>,
}

impl<K> Clone for ToggleStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: StoreKey> Default for ToggleStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoreKey> ToggleStore<K> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                records: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<K, Slot>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ToggleEvent<K>) {
        // No subscribers is the common case outside of views.
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToggleEvent<K>> {
        self.inner.events.subscribe()
    }

    pub fn seed(&self, key: K, state: bool, counter: Option<u64>) -> SeedOutcome {
        let mut records = self.lock_records();
        if let Some(slot) = records.get(&key) {
            if slot.record.pending {
                debug!(key = %key, state, "seed skipped; toggle in flight");
                return SeedOutcome::SkippedPending;
            }
        }

        let counter = counter.or_else(|| records.get(&key).and_then(|slot| slot.record.counter));
        let record = ToggleRecord::idle(state, counter);
        records.insert(
            key.clone(),
            Slot {
                record,
                rollback: None,
            },
        );
        self.publish(ToggleEvent::Seeded { key, record });
        SeedOutcome::Applied
    }

    pub fn record(&self, key: &K) -> Option<ToggleRecord> {
        self.lock_records().get(key).map(|slot| slot.record)
    }

    pub fn display_state(&self, key: &K) -> Option<bool> {
        self.record(key).map(|record| record.display_state)
    }

    pub fn committed_state(&self, key: &K) -> Option<bool> {
        self.record(key).map(|record| record.committed_state)
    }

    pub fn counter(&self, key: &K) -> Option<u64> {
        self.record(key).and_then(|record| record.counter)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.record(key).is_some_and(|record| record.pending)
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut records = self.lock_records();
        match records.get(key) {
            Some(slot) if !slot.record.pending => {
                records.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self) -> usize {
        let mut records = self.lock_records();
        let before = records.len();
        records.retain(|_, slot| slot.record.pending);
        before - records.len()
    }

    fn begin(&self, key: K, current_state: bool) -> Result<PendingToggle<K>, ToggleError> {
        let mut records = self.lock_records();
        let slot = records.entry(key.clone()).or_insert_with(|| Slot {
            record: ToggleRecord::idle(current_state, None),
            rollback: None,
        });

        if slot.record.pending {
            debug!(key = %key, "toggle rejected; another toggle is in flight");
            return Err(ToggleError::Concurrent {
                key: key.to_string(),
            });
        }

        if slot.record.display_state != current_state {
            debug!(
                key = %key,
                stored = slot.record.display_state,
                current_state,
                "toggle requested from a state the store did not show; rebasing"
            );
            slot.record.committed_state = current_state;
            slot.record.display_state = current_state;
        }

        let proposed = !current_state;
        slot.rollback = Some(RollbackPoint {
            display_state: slot.record.display_state,
            counter: slot.record.counter,
        });
        slot.record.pending = true;
        slot.record.display_state = proposed;
        slot.record.counter = slot.record.counter.map(|count| {
            if proposed {
                count.saturating_add(1)
            } else {
                count.saturating_sub(1)
            }
        });

        let record = slot.record;
        self.publish(ToggleEvent::Applied {
            key: key.clone(),
            record,
        });
        drop(records);

        Ok(PendingToggle {
            store: self.clone(),
            key,
            proposed,
            settled: false,
        })
    }

    fn settle(&self, key: &K, confirmed: bool) {
        let mut records = self.lock_records();
        let Some(slot) = records.get_mut(key) else {
            warn!(key = %key, "settling toggle for a record that no longer exists");
            return;
        };
        let Some(rollback) = slot.rollback.take() else {
            warn!(key = %key, "settling toggle that was not pending");
            return;
        };

        slot.record.pending = false;
        if confirmed {
            slot.record.committed_state = slot.record.display_state;
        } else {
            slot.record.display_state = rollback.display_state;
            slot.record.counter = rollback.counter;
        }

        let record = slot.record;
        let key = key.clone();
        self.publish(if confirmed {
            ToggleEvent::Committed { key, record }
        } else {
            ToggleEvent::RolledBack { key, record }
        });
    }
}

/// Ownership of one in-flight toggle. Dropping it unsettled rolls the key back.
struct PendingToggle<K: StoreKey> {
    store: ToggleStore<K>,
    key: K,
    proposed: bool,
    settled: bool,
}

impl<K: StoreKey> PendingToggle<K> {
    fn commit(mut self) {
        self.settled = true;
        self.store.settle(&self.key, true);
    }

    fn rollback(mut self) {
        self.settled = true;
        self.store.settle(&self.key, false);
    }
}

impl<K: StoreKey> Drop for PendingToggle<K> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(key = %self.key, "toggle abandoned before confirmation settled; rolling back");
            self.store.settle(&self.key, false);
        }
    }
}

pub struct OptimisticActionController<K: StoreKey> {
    store: ToggleStore<K>,
    confirmation: Arc<dyn ConfirmationAction<K>>,
}

impl<K: StoreKey> Clone for OptimisticActionController<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            confirmation: Arc::clone(&self.confirmation),
        }
    }
}

impl<K: StoreKey> OptimisticActionController<K> {
    pub fn new(store: ToggleStore<K>, confirmation: Arc<dyn ConfirmationAction<K>>) -> Self {
        Self {
            store,
            confirmation,
        }
    }

    pub fn store(&self) -> &ToggleStore<K> {
        &self.store
    }

    pub fn seed(&self, key: K, state: bool, counter: Option<u64>) -> SeedOutcome {
        self.store.seed(key, state, counter)
    }

    /// Flips `key` away from `current_state`.
    ///
    /// The optimistic mutation happens before this returns; the returned future
    /// only awaits the remote confirmation. A second toggle on the same key while
    /// one is in flight resolves to [`ToggleError::Concurrent`] without touching
    /// the record. On failure the record is already reverted when the error is
    /// returned.
    ///
    /// An idle record that shows something other than `current_state` is rebased
    /// onto it first. The counter is not rebased and moves from its stored value.
    pub fn toggle(
        &self,
        key: K,
        current_state: bool,
    ) -> BoxFuture<'static, Result<bool, ToggleError>> {
        let pending = match self.store.begin(key.clone(), current_state) {
            Ok(pending) => pending,
            Err(err) => return future::ready(Err(err)).boxed(),
        };
        let confirmation = Arc::clone(&self.confirmation);

        async move {
            let proposed = pending.proposed;
            match confirmation.confirm(&key, proposed).await {
                Ok(()) => {
                    pending.commit();
                    debug!(key = %key, state = proposed, "toggle confirmed");
                    Ok(proposed)
                }
                Err(source) => {
                    pending.rollback();
                    Err(ToggleError::Failed {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
        .boxed()
    }

    pub fn toggle_displayed(&self, key: K) -> BoxFuture<'static, Result<bool, ToggleError>> {
        let current_state = self.store.display_state(&key).unwrap_or(false);
        self.toggle(key, current_state)
    }
}

#[cfg(test)]
#[path = "tests/toggle_tests.rs"]
mod tests;
