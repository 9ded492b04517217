//! In-memory run store.
//!
//! Implements `RunStore` without any I/O. Used by the engine's tests and by
//! ephemeral deployments that do not need runs to survive a restart. Event
//! insertion order is the append order of the backing vector, which doubles
//! as the tie-break for equal timestamps.

use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;
use weft_types::error::RepositoryError;
use weft_types::run::{RunEventType, RunStatus, WorkflowRun, WorkflowRunEvent};

use super::run::RunStore;

/// DashMap/Vec backed implementation of `RunStore`.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: DashMap<Uuid, WorkflowRun>,
    events: Mutex<Vec<WorkflowRunEvent>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently stored.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

impl RunStore for MemoryRunStore {
    async fn create_run(
        &self,
        workflow_id: Uuid,
        draft_version_id: Option<Uuid>,
        initial_context: &Value,
    ) -> Result<WorkflowRun, RepositoryError> {
        let run = WorkflowRun {
            id: Uuid::now_v7(),
            workflow_id,
            draft_version_id,
            status: RunStatus::Running,
            current_node_id: None,
            context: initial_context.clone(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.get(id).map(|r| r.clone()))
    }

    async fn get_runs_by_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .iter()
            .filter(|r| r.workflow_id == *workflow_id)
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut run = self.runs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        run.status = status;
        run.error = error.map(String::from);
        if status.is_terminal() {
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_run_context(
        &self,
        id: &Uuid,
        context: &Value,
        current_node_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut run = self.runs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        run.context = context.clone();
        if let Some(node_id) = current_node_id {
            run.current_node_id = Some(node_id.to_string());
        }
        Ok(())
    }

    async fn add_event(
        &self,
        run_id: &Uuid,
        event_type: RunEventType,
        payload: Option<Value>,
        emitter: Option<&str>,
    ) -> Result<WorkflowRunEvent, RepositoryError> {
        if !self.runs.contains_key(run_id) {
            return Err(RepositoryError::NotFound);
        }
        let event = WorkflowRunEvent {
            id: Uuid::now_v7(),
            run_id: *run_id,
            timestamp: Utc::now(),
            event_type,
            payload,
            emitter: emitter.map(String::from),
        };
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(event)
    }

    async fn get_run_events(
        &self,
        run_id: &Uuid,
    ) -> Result<Vec<WorkflowRunEvent>, RepositoryError> {
        let mut events: Vec<WorkflowRunEvent> = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.run_id == *run_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn delete_run(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let existed = self.runs.remove(id).is_some();
        if existed {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|e| e.run_id != *id);
        }
        Ok(existed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_run() -> (MemoryRunStore, WorkflowRun) {
        let store = MemoryRunStore::new();
        let run = store
            .create_run(Uuid::now_v7(), None, &json!({"variables": {}}))
            .await
            .unwrap();
        (store, run)
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let (store, run) = store_with_run().await;
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        let fetched = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, run.id);
        assert!(store.get_run(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runs_by_workflow_newest_first() {
        let store = MemoryRunStore::new();
        let workflow_id = Uuid::now_v7();
        let first = store
            .create_run(workflow_id, None, &json!({}))
            .await
            .unwrap();
        let second = store
            .create_run(workflow_id, None, &json!({}))
            .await
            .unwrap();
        store.create_run(Uuid::now_v7(), None, &json!({})).await.unwrap();

        let runs = store.get_runs_by_workflow(&workflow_id).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }

    #[tokio::test]
    async fn test_status_update_sets_completed_at_only_when_terminal() {
        let (store, run) = store_with_run().await;

        store
            .update_run_status(&run.id, RunStatus::Paused, None)
            .await
            .unwrap();
        let paused = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        assert!(paused.completed_at.is_none());

        store
            .update_run_status(&run.id, RunStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let failed = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_status_update_unknown_run_fails() {
        let store = MemoryRunStore::new();
        let err = store
            .update_run_status(&Uuid::now_v7(), RunStatus::Paused, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_context_update_is_full_overwrite() {
        let (store, run) = store_with_run().await;
        store
            .update_run_context(&run.id, &json!({"variables": {"x": 1}}), Some("node-a"))
            .await
            .unwrap();

        let updated = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(updated.context, json!({"variables": {"x": 1}}));
        assert_eq!(updated.current_node_id.as_deref(), Some("node-a"));

        // Omitting the pointer leaves it untouched.
        store
            .update_run_context(&run.id, &json!({}), None)
            .await
            .unwrap();
        let updated = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(updated.context, json!({}));
        assert_eq!(updated.current_node_id.as_deref(), Some("node-a"));
    }

    #[tokio::test]
    async fn test_events_preserve_insertion_order() {
        let (store, run) = store_with_run().await;
        for event_type in [
            RunEventType::WorkflowStarted,
            RunEventType::NodeEntered,
            RunEventType::NodeExited,
            RunEventType::WorkflowCompleted,
        ] {
            store
                .add_event(&run.id, event_type, None, Some("engine"))
                .await
                .unwrap();
        }

        let events = store.get_run_events(&run.id).await.unwrap();
        let types: Vec<RunEventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                RunEventType::WorkflowStarted,
                RunEventType::NodeEntered,
                RunEventType::NodeExited,
                RunEventType::WorkflowCompleted,
            ]
        );
        // Timestamps are non-decreasing.
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_add_event_unknown_run_fails() {
        let store = MemoryRunStore::new();
        let err = store
            .add_event(&Uuid::now_v7(), RunEventType::WorkflowStarted, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_run_cascades_to_events() {
        let (store, run) = store_with_run().await;
        store
            .add_event(&run.id, RunEventType::WorkflowStarted, None, None)
            .await
            .unwrap();

        assert!(store.delete_run(&run.id).await.unwrap());
        assert!(store.get_run(&run.id).await.unwrap().is_none());
        assert!(store.get_run_events(&run.id).await.unwrap().is_empty());

        // Deleting again reports absence.
        assert!(!store.delete_run(&run.id).await.unwrap());
    }
}
