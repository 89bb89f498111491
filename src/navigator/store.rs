//! Persistence seam for learner tracking state.
//!
//! The navigator never decides a storage format. `Navigator::save` drains its
//! dirty set into [`ActivityRecord`]s and hands them to an [`ActivityStore`].

use crate::activity::{Activity, ActivityId, LearningDataModel};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Tracking state of one activity, as handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub persistence_id: Uuid,
    pub activity_id: ActivityId,
    pub key: String,
    pub data_model: LearningDataModel,
}

impl ActivityRecord {
    /// Snapshot `activity`. It must already carry a persistence id.
    pub(crate) fn snapshot(activity: &Activity, persistence_id: Uuid) -> Self {
        Self {
            persistence_id,
            activity_id: activity.id(),
            key: activity.key().to_string(),
            data_model: activity.data_model().clone(),
        }
    }
}

/// Persistence collaborator for dirty activities.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Write every record in one unit. An empty slice is a no-op.
    async fn save_activities(&self, records: &[ActivityRecord]) -> Result<()>;

    async fn load_activity(&self, persistence_id: Uuid) -> Result<Option<ActivityRecord>>;
}

// ── MemoryStore ──

/// In-memory store for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Uuid, ActivityRecord>>,
    /// Number of non-empty batches written.
    batches: RwLock<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn batches(&self) -> usize {
        *self.batches.read().await
    }

    /// Every stored record, ordered by activity id.
    pub async fn records(&self) -> Vec<ActivityRecord> {
        let mut records: Vec<_> = self.inner.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.activity_id);
        records
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn save_activities(&self, records: &[ActivityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut store = self.inner.write().await;
        for record in records {
            store.insert(record.persistence_id, record.clone());
        }
        *self.batches.write().await += 1;
        Ok(())
    }

    async fn load_activity(&self, persistence_id: Uuid) -> Result<Option<ActivityRecord>> {
        Ok(self.inner.read().await.get(&persistence_id).cloned())
    }
}
