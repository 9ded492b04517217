//! Run store trait definition.
//!
//! Defines the storage interface for workflow runs and their append-only
//! event log. The infrastructure layer (weft-infra) implements this trait
//! with SQLite persistence; `MemoryRunStore` implements it in-process.
//!
//! Uses native async fn in traits (RPITIT, Rust 2024 edition, no async_trait
//! macro).

use serde_json::Value;
use uuid::Uuid;
use weft_types::error::RepositoryError;
use weft_types::run::{RunEventType, RunStatus, WorkflowRun, WorkflowRunEvent};

/// Repository trait for run persistence.
///
/// Covers two entity families:
/// - **Runs:** create/update/query workflow execution records.
/// - **Events:** append-only progress log, ordered by timestamp ascending
///   with insertion order preserved for ties.
pub trait RunStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a new run record with status `running` and a server-assigned
    /// id and start timestamp.
    fn create_run(
        &self,
        workflow_id: Uuid,
        draft_version_id: Option<Uuid>,
        initial_context: &Value,
    ) -> impl std::future::Future<Output = Result<WorkflowRun, RepositoryError>> + Send;

    /// Get a run by its id.
    fn get_run(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// List runs for a workflow, newest first.
    fn get_runs_by_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    /// Update a run's status and error message.
    ///
    /// Sets `completed_at` iff the new status is terminal (`completed` or
    /// `failed`); otherwise the field is left untouched.
    fn update_run_status(
        &self,
        id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Overwrite a run's serialized context, and its position pointer when
    /// `current_node_id` is given. This is a full overwrite, not a patch.
    fn update_run_context(
        &self,
        id: &Uuid,
        context: &Value,
        current_node_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append one immutable event row with a server-assigned timestamp and
    /// return it.
    fn add_event(
        &self,
        run_id: &Uuid,
        event_type: RunEventType,
        payload: Option<Value>,
        emitter: Option<&str>,
    ) -> impl std::future::Future<Output = Result<WorkflowRunEvent, RepositoryError>> + Send;

    /// List a run's events in ascending timestamp order, stable for equal
    /// timestamps by insertion order.
    fn get_run_events(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRunEvent>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Administrative
    // -----------------------------------------------------------------------

    /// Cascade-delete a run and its events. Returns `true` if it existed.
    /// Not used by normal execution.
    fn delete_run(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
