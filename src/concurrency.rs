//! Keyed async locks for scoring writes.

use crate::types::{AssessmentInstanceId, InstanceQuestionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key, created on first use.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-instance-question and per-assessment-instance locks.
#[derive(Default)]
pub struct InstanceLockManager {
    instance_questions: KeyedLocks<InstanceQuestionId>,
    assessment_instances: KeyedLocks<AssessmentInstanceId>,
}

impl InstanceLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_instance_question(&self, id: InstanceQuestionId) -> OwnedMutexGuard<()> {
        self.instance_questions.lock(&id).await
    }

    pub async fn lock_assessment_instance(&self, id: AssessmentInstanceId) -> OwnedMutexGuard<()> {
        self.assessment_instances.lock(&id).await
    }

    pub fn prune(&self) {
        self.instance_questions.prune();
        self.assessment_instances.prune();
    }

    /// Live lock entries across both maps.
    pub fn len(&self) -> usize {
        self.instance_questions.len() + self.assessment_instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
