//! SQLite run store implementation.
//!
//! Implements `RunStore` from `weft-core` using sqlx with split read/write
//! pools. Run context and event payloads are stored as JSON blobs; event
//! rows carry an autoincrement `seq` so equal timestamps keep insertion
//! order.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;
use weft_core::repository::run::RunStore;
use weft_types::error::RepositoryError;
use weft_types::run::{RunEventType, RunStatus, WorkflowRun, WorkflowRunEvent};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunStore`.
pub struct SqliteRunStore {
    pool: DatabasePool,
}

impl SqliteRunStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    workflow_id: String,
    draft_version_id: Option<String>,
    status: String,
    current_node_id: Option<String>,
    context: String,
    started_at: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            draft_version_id: row.try_get("draft_version_id")?,
            status: row.try_get("status")?,
            current_node_id: row.try_get("current_node_id")?,
            context: row.try_get("context")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error: row.try_get("error")?,
        })
    }

    fn into_run(self) -> Result<WorkflowRun, RepositoryError> {
        let id = parse_uuid(&self.id)?;
        let workflow_id = parse_uuid(&self.workflow_id)?;
        let draft_version_id = self
            .draft_version_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?;

        let status: RunStatus = self
            .status
            .parse()
            .map_err(|_| RepositoryError::Query(format!("invalid run status: {}", self.status)))?;

        let context: Value = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        let started_at = parse_datetime(&self.started_at)?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;

        Ok(WorkflowRun {
            id,
            workflow_id,
            draft_version_id,
            status,
            current_node_id: self.current_node_id,
            context,
            started_at,
            completed_at,
            error: self.error,
        })
    }
}

struct EventRow {
    id: String,
    run_id: String,
    event_type: String,
    payload: Option<String>,
    emitter: Option<String>,
    timestamp: String,
}

impl EventRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            emitter: row.try_get("emitter")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_event(self) -> Result<WorkflowRunEvent, RepositoryError> {
        let id = parse_uuid(&self.id)?;
        let run_id = parse_uuid(&self.run_id)?;
        let event_type: RunEventType = self.event_type.parse().map_err(|_| {
            RepositoryError::Query(format!("invalid event type: {}", self.event_type))
        })?;

        let payload = self
            .payload
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid event payload: {e}")))
            })
            .transpose()?;

        Ok(WorkflowRunEvent {
            id,
            run_id,
            timestamp: parse_datetime(&self.timestamp)?,
            event_type,
            payload,
            emitter: self.emitter,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// RunStore impl
// ---------------------------------------------------------------------------

impl RunStore for SqliteRunStore {
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

        let context_str = serde_json::to_string(&run.context)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflow_runs
               (id, workflow_id, draft_version_id, status, current_node_id,
                context, started_at, completed_at, error)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.draft_version_id.map(|id| id.to_string()))
        .bind(run.status.as_str())
        .bind(&run.current_node_id)
        .bind(&context_str)
        .bind(format_datetime(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .bind(&run.error)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(run)
    }

    async fn get_run(&self, id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = RunRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn get_runs_by_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_runs WHERE workflow_id = ? ORDER BY started_at DESC",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = RunRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            runs.push(r.into_run()?);
        }
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        // completed_at is set only on terminal transitions; COALESCE keeps
        // any earlier terminal timestamp.
        let completed_at = if status.is_terminal() {
            Some(format_datetime(&Utc::now()))
        } else {
            None
        };

        let result = sqlx::query(
            "UPDATE workflow_runs SET status = ?, error = ?, completed_at = COALESCE(?, completed_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&completed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_run_context(
        &self,
        id: &Uuid,
        context: &Value,
        current_node_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let context_str =
            serde_json::to_string(context).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = if let Some(node_id) = current_node_id {
            sqlx::query("UPDATE workflow_runs SET context = ?, current_node_id = ? WHERE id = ?")
                .bind(&context_str)
                .bind(node_id)
                .bind(id.to_string())
                .execute(&self.pool.writer)
                .await
        } else {
            sqlx::query("UPDATE workflow_runs SET context = ? WHERE id = ?")
                .bind(&context_str)
                .bind(id.to_string())
                .execute(&self.pool.writer)
                .await
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
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
        let event = WorkflowRunEvent {
            id: Uuid::now_v7(),
            run_id: *run_id,
            timestamp: Utc::now(),
            event_type,
            payload,
            emitter: emitter.map(String::from),
        };

        let payload_str = event
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflow_run_events
               (id, run_id, event_type, payload, emitter, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.run_id.to_string())
        .bind(event.event_type.as_str())
        .bind(&payload_str)
        .bind(&event.emitter)
        .bind(format_datetime(&event.timestamp))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            // FK violation means the run does not exist.
            if e.to_string().contains("FOREIGN KEY") {
                RepositoryError::NotFound
            } else {
                RepositoryError::Query(e.to_string())
            }
        })?;

        Ok(event)
    }

    async fn get_run_events(
        &self,
        run_id: &Uuid,
    ) -> Result<Vec<WorkflowRunEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_run_events WHERE run_id = ? ORDER BY timestamp ASC, seq ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = EventRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            events.push(r.into_event()?);
        }
        Ok(events)
    }

    async fn delete_run(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        // Events cascade via the foreign key.
        let result = sqlx::query("DELETE FROM workflow_runs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> (tempfile::TempDir, SqliteRunStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("runs.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteRunStore::new(pool))
    }

    #[tokio::test]
    async fn test_create_and_get_run_roundtrip() {
        let (_dir, store) = test_store().await;
        let workflow_id = Uuid::now_v7();
        let draft_id = Uuid::now_v7();

        let run = store
            .create_run(
                workflow_id,
                Some(draft_id),
                &json!({"variables": {"x": 1}, "history": []}),
            )
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);

        let fetched = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.workflow_id, workflow_id);
        assert_eq!(fetched.draft_version_id, Some(draft_id));
        assert_eq!(fetched.context["variables"]["x"], json!(1));
        assert!(fetched.completed_at.is_none());

        assert!(store.get_run(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_runs_by_workflow() {
        let (_dir, store) = test_store().await;
        let workflow_id = Uuid::now_v7();
        store.create_run(workflow_id, None, &json!({})).await.unwrap();
        store.create_run(workflow_id, None, &json!({})).await.unwrap();
        store
            .create_run(Uuid::now_v7(), None, &json!({}))
            .await
            .unwrap();

        let runs = store.get_runs_by_workflow(&workflow_id).await.unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[tokio::test]
    async fn test_status_update_completed_at_rules() {
        let (_dir, store) = test_store().await;
        let run = store
            .create_run(Uuid::now_v7(), None, &json!({}))
            .await
            .unwrap();

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

        let err = store
            .update_run_status(&Uuid::now_v7(), RunStatus::Paused, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_context_update_overwrites() {
        let (_dir, store) = test_store().await;
        let run = store
            .create_run(Uuid::now_v7(), None, &json!({"variables": {}}))
            .await
            .unwrap();

        store
            .update_run_context(&run.id, &json!({"variables": {"x": 5}}), Some("node-a"))
            .await
            .unwrap();
        let updated = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(updated.context, json!({"variables": {"x": 5}}));
        assert_eq!(updated.current_node_id.as_deref(), Some("node-a"));

        store
            .update_run_context(&run.id, &json!({}), None)
            .await
            .unwrap();
        let updated = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(updated.context, json!({}));
        assert_eq!(updated.current_node_id.as_deref(), Some("node-a"));
    }

    #[tokio::test]
    async fn test_events_append_and_order() {
        let (_dir, store) = test_store().await;
        let run = store
            .create_run(Uuid::now_v7(), None, &json!({}))
            .await
            .unwrap();

        for (event_type, payload) in [
            (RunEventType::WorkflowStarted, Some(json!({"workflow_name": "wf"}))),
            (RunEventType::NodeEntered, Some(json!({"node_id": "start"}))),
            (RunEventType::NodeExited, None),
            (RunEventType::WorkflowCompleted, None),
        ] {
            store
                .add_event(&run.id, event_type, payload, Some("engine"))
                .await
                .unwrap();
        }

        let events = store.get_run_events(&run.id).await.unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type, RunEventType::WorkflowStarted);
        assert_eq!(
            events[0].payload.as_ref().unwrap()["workflow_name"],
            json!("wf")
        );
        assert_eq!(events[3].event_type, RunEventType::WorkflowCompleted);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_add_event_unknown_run_fails() {
        let (_dir, store) = test_store().await;
        let err = store
            .add_event(&Uuid::now_v7(), RunEventType::WorkflowStarted, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_run_cascades_to_events() {
        let (_dir, store) = test_store().await;
        let run = store
            .create_run(Uuid::now_v7(), None, &json!({}))
            .await
            .unwrap();
        store
            .add_event(&run.id, RunEventType::WorkflowStarted, None, None)
            .await
            .unwrap();

        assert!(store.delete_run(&run.id).await.unwrap());
        assert!(store.get_run(&run.id).await.unwrap().is_none());
        assert!(store.get_run_events(&run.id).await.unwrap().is_empty());
        assert!(!store.delete_run(&run.id).await.unwrap());
    }
}
