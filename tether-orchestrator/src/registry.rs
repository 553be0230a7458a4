//! Concurrent store of live task records

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_core::{OrchestratorError, TaskId};

use crate::record::RemoteTaskRecord;

/// Live records keyed by task id. Cloning shares the same map.
///
/// Iteration helpers return owned `Arc`s so callers never hold a shard
/// lock while they lock a record or mutate the map.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    records: Arc<DashMap<TaskId, Arc<RemoteTaskRecord>>>,
    // Registered records plus slots reserved by in-flight inserts
    occupied: Arc<AtomicUsize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Arc<RemoteTaskRecord>) -> Result<(), OrchestratorError> {
        self.insert_bounded(record, usize::MAX)
    }

    /// Insert unless `limit` records are already registered. The slot is
    /// reserved before the map is touched, so concurrent inserts cannot
    /// overshoot the limit.
    pub fn insert_bounded(&self, record: Arc<RemoteTaskRecord>, limit: usize) -> Result<(), OrchestratorError> {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map_err(|_| OrchestratorError::CapacityExceeded { limit })?;

        match self.records.entry(record.task_id().clone()) {
            Entry::Occupied(entry) => {
                self.occupied.fetch_sub(1, Ordering::AcqRel);
                Err(OrchestratorError::DuplicateTask(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Arc<RemoteTaskRecord>> {
        self.records.get(task_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove `record`, but only if it is still the one registered under its id
    pub fn remove(&self, record: &Arc<RemoteTaskRecord>) -> bool {
        let removed = self
            .records
            .remove_if(record.task_id(), |_, current| Arc::ptr_eq(current, record))
            .is_some();
        if removed {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn records(&self) -> Vec<Arc<RemoteTaskRecord>> {
        self.records.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Other live tasks of the same process instance
    pub fn siblings(&self, process_instance_id: &str, exclude: &TaskId) -> Vec<Arc<RemoteTaskRecord>> {
        self.records
            .iter()
            .filter(|entry| {
                entry.key() != exclude && entry.value().process_instance_id() == process_instance_id
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Empty the registry, handing back what was in it
    pub fn drain(&self) -> Vec<Arc<RemoteTaskRecord>> {
        let records = self.records();
        for record in &records {
            self.remove(record);
        }
        records
    }
}
