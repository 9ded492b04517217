//! Workflow run and event types.
//!
//! A `WorkflowRun` is a durable, resumable execution of a draft, tracked by
//! status and a serialized context. `WorkflowRunEvent` rows form the
//! append-only audit stream broadcast to subscribers and persisted alongside
//! the run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Stable string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// A single durable execution of a workflow draft.
///
/// Created by the execution engine, mutated only by it, and deleted only by
/// administrative cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run id.
    pub id: Uuid,
    /// The workflow this run belongs to.
    pub workflow_id: Uuid,
    /// The exact draft snapshot that was executed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_version_id: Option<Uuid>,
    /// Current run status.
    pub status: RunStatus,
    /// Position pointer: the node the traversal is at (or will re-enter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    /// Serialized run context (variables, history, metadata).
    pub context: Value,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state (None while running or paused).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Run events
// ---------------------------------------------------------------------------

/// Type tag of a run progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunEventType {
    WorkflowStarted,
    NodeEntered,
    NodeExited,
    ActionExecuted,
    ActionFailed,
    WorkflowCompleted,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowFailed,
}

impl RunEventType {
    /// Stable string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventType::WorkflowStarted => "workflow-started",
            RunEventType::NodeEntered => "node-entered",
            RunEventType::NodeExited => "node-exited",
            RunEventType::ActionExecuted => "action-executed",
            RunEventType::ActionFailed => "action-failed",
            RunEventType::WorkflowCompleted => "workflow-completed",
            RunEventType::WorkflowPaused => "workflow-paused",
            RunEventType::WorkflowResumed => "workflow-resumed",
            RunEventType::WorkflowFailed => "workflow-failed",
        }
    }
}

impl fmt::Display for RunEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow-started" => Ok(RunEventType::WorkflowStarted),
            "node-entered" => Ok(RunEventType::NodeEntered),
            "node-exited" => Ok(RunEventType::NodeExited),
            "action-executed" => Ok(RunEventType::ActionExecuted),
            "action-failed" => Ok(RunEventType::ActionFailed),
            "workflow-completed" => Ok(RunEventType::WorkflowCompleted),
            "workflow-paused" => Ok(RunEventType::WorkflowPaused),
            "workflow-resumed" => Ok(RunEventType::WorkflowResumed),
            "workflow-failed" => Ok(RunEventType::WorkflowFailed),
            other => Err(format!("invalid run event type: '{other}'")),
        }
    }
}

/// An immutable, timestamped record of run progress.
///
/// Appended by the run store with a server-assigned timestamp; never mutated.
/// Ordering is by timestamp ascending, insertion order for ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunEvent {
    /// UUIDv7 event id.
    pub id: Uuid,
    /// The run this event belongs to.
    pub run_id: Uuid,
    /// Server-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: RunEventType,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Optional label naming the component that emitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_serde_roundtrip() {
        for status in [
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let parsed: RunStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_run_status_from_str_rejects_unknown() {
        assert!("cancelled".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_workflow_run_json_roundtrip() {
        let run = WorkflowRun {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            draft_version_id: Some(Uuid::now_v7()),
            status: RunStatus::Running,
            current_node_id: Some("start".to_string()),
            context: json!({"variables": {}, "history": []}),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        let json_str = serde_json::to_string(&run).unwrap();
        let parsed: WorkflowRun = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.status, RunStatus::Running);
        assert_eq!(parsed.current_node_id.as_deref(), Some("start"));
        assert!(parsed.completed_at.is_none());
    }

    #[test]
    fn test_event_type_kebab_case_serde() {
        let json = serde_json::to_string(&RunEventType::WorkflowStarted).unwrap();
        assert_eq!(json, "\"workflow-started\"");
        let json = serde_json::to_string(&RunEventType::NodeEntered).unwrap();
        assert_eq!(json, "\"node-entered\"");
    }

    #[test]
    fn test_event_type_str_roundtrip() {
        for event_type in [
            RunEventType::WorkflowStarted,
            RunEventType::NodeEntered,
            RunEventType::NodeExited,
            RunEventType::ActionExecuted,
            RunEventType::ActionFailed,
            RunEventType::WorkflowCompleted,
            RunEventType::WorkflowPaused,
            RunEventType::WorkflowResumed,
            RunEventType::WorkflowFailed,
        ] {
            assert_eq!(
                event_type.as_str().parse::<RunEventType>().unwrap(),
                event_type
            );
        }
        assert!("node-skipped".parse::<RunEventType>().is_err());
    }

    #[test]
    fn test_run_event_json_roundtrip() {
        let event = WorkflowRunEvent {
            id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: RunEventType::NodeEntered,
            payload: Some(json!({"node_id": "start"})),
            emitter: Some("engine".to_string()),
        };
        let json_str = serde_json::to_string(&event).unwrap();
        assert!(json_str.contains("\"type\":\"node-entered\""));
        let parsed: WorkflowRunEvent = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.event_type, RunEventType::NodeEntered);
        assert_eq!(parsed.emitter.as_deref(), Some("engine"));
    }
}
