//! Ephemeral instance registry.
//!
//! A process-lifetime tracker of workflow lifecycle states, deliberately
//! decoupled from the persisted run model: instances carry no context and no
//! event stream, and every operation is synchronous with no storage I/O.
//! Useful for lifecycle validation and tests that do not need durability.

use dashmap::DashMap;
use uuid::Uuid;
use weft_types::draft::WorkflowDraft;
use weft_types::instance::{InstanceStatus, WorkflowInstance};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from instance registry operations.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// Draft has no nodes.
    #[error("workflow draft must have at least one node")]
    EmptyDraft,

    /// No instance with this id is tracked.
    #[error("workflow instance not found: {0}")]
    NotFound(Uuid),

    /// Operation is illegal from the instance's current state.
    #[error("instance {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: Uuid,
        expected: InstanceStatus,
        actual: InstanceStatus,
    },
}

// ---------------------------------------------------------------------------
// InstanceRegistry
// ---------------------------------------------------------------------------

/// In-memory tracker of workflow instances. Lost on restart.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<Uuid, WorkflowInstance>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the draft is non-empty and track a new running instance
    /// under a freshly generated id.
    pub fn start(&self, draft: &WorkflowDraft) -> Result<WorkflowInstance, InstanceError> {
        if draft.nodes.is_empty() {
            return Err(InstanceError::EmptyDraft);
        }
        let instance = WorkflowInstance {
            id: Uuid::now_v7(),
            workflow_name: draft.name.clone(),
            status: InstanceStatus::Running,
        };
        self.instances.insert(instance.id, instance.clone());
        tracing::debug!(instance_id = %instance.id, workflow = draft.name.as_str(), "instance started");
        Ok(instance)
    }

    /// Pause a running instance.
    pub fn pause(&self, id: Uuid) -> Result<WorkflowInstance, InstanceError> {
        self.transition(id, InstanceStatus::Running, InstanceStatus::Paused)
    }

    /// Resume a paused instance.
    pub fn resume(&self, id: Uuid) -> Result<WorkflowInstance, InstanceError> {
        self.transition(id, InstanceStatus::Paused, InstanceStatus::Running)
    }

    /// Complete a running instance.
    pub fn complete(&self, id: Uuid) -> Result<WorkflowInstance, InstanceError> {
        self.transition(id, InstanceStatus::Running, InstanceStatus::Completed)
    }

    /// Look up an instance by id.
    pub fn get(&self, id: Uuid) -> Option<WorkflowInstance> {
        self.instances.get(&id).map(|i| i.clone())
    }

    /// All tracked instances, in no particular order.
    pub fn list_instances(&self) -> Vec<WorkflowInstance> {
        self.instances.iter().map(|i| i.clone()).collect()
    }

    fn transition(
        &self,
        id: Uuid,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> Result<WorkflowInstance, InstanceError> {
        let mut instance = self
            .instances
            .get_mut(&id)
            .ok_or(InstanceError::NotFound(id))?;
        if instance.status != expected {
            return Err(InstanceError::InvalidTransition {
                id,
                expected,
                actual: instance.status,
            });
        }
        instance.status = next;
        Ok(instance.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
