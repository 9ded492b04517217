//! Ephemeral workflow instance types.
//!
//! A `WorkflowInstance` is a process-lifetime lifecycle handle tracked by the
//! in-memory instance registry. It is deliberately distinct from the durable
//! `WorkflowRun` model: instances carry no context, no event stream, and are
//! lost on restart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an ephemeral instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Paused => write!(f, "paused"),
            InstanceStatus::Completed => write!(f, "completed"),
        }
    }
}

/// An ephemeral, non-persisted lifecycle handle for a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Freshly generated unique identifier (UUIDv7).
    pub id: Uuid,
    /// Name of the draft this instance was started from.
    pub workflow_name: String,
    /// Current lifecycle state.
    pub status: InstanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_status_serde_roundtrip() {
        for status in [
            InstanceStatus::Running,
            InstanceStatus::Paused,
            InstanceStatus::Completed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let parsed: InstanceStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_instance_json_roundtrip() {
        let instance = WorkflowInstance {
            id: Uuid::now_v7(),
            workflow_name: "daily-digest".to_string(),
            status: InstanceStatus::Running,
        };
        let json = serde_json::to_string(&instance).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        let parsed: WorkflowInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.workflow_name, "daily-digest");
        assert_eq!(parsed.status, InstanceStatus::Running);
    }
}
