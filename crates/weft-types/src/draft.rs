//! Workflow draft types for Weft.
//!
//! A `WorkflowDraft` is the immutable-per-run graph snapshot submitted for
//! execution: an ordered set of nodes connected by directed transitions.
//! Drafts are created and edited externally (visual editor, YAML files, API);
//! the execution engine only reads them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Node type tag the engine interprets as the entry point of a draft.
pub const START_NODE_TYPE: &str = "start";

// ---------------------------------------------------------------------------
// Workflow Draft (graph snapshot)
// ---------------------------------------------------------------------------

/// The static graph definition submitted for execution.
///
/// The draft id doubles as the draft-version identity recorded on runs, so a
/// run can always be traced back to the exact graph snapshot that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDraft {
    /// UUIDv7 draft-version identity.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Ordered set of graph vertices.
    pub nodes: Vec<WorkflowNode>,
    /// Directed edges between nodes.
    #[serde(default)]
    pub transitions: Vec<WorkflowTransition>,
    /// Extensible metadata (editor state, custom integrations).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl WorkflowDraft {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes tagged as start nodes, in declaration order.
    pub fn start_nodes(&self) -> Vec<&WorkflowNode> {
        self.nodes.iter().filter(|n| n.is_start()).collect()
    }

    /// The first transition whose source is the given node, by declaration
    /// order. Traversal selects at most one transition per node; this is the
    /// tie-break.
    pub fn first_transition_from(&self, node_id: &str) -> Option<&WorkflowTransition> {
        self.transitions.iter().find(|t| t.source == node_id)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A graph vertex with entry and exit action lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// User-defined node id, unique within a draft.
    pub id: String,
    /// Free-form type tag. `"start"` is the only tag the engine interprets;
    /// everything else is editor vocabulary.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display label.
    pub label: String,
    /// Actions executed when the node is entered, in order.
    #[serde(default)]
    pub entry_actions: Vec<WorkflowAction>,
    /// Actions executed when the node is exited, in order.
    #[serde(default)]
    pub exit_actions: Vec<WorkflowAction>,
    /// Opaque metadata (canvas position, grouping).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl WorkflowNode {
    /// Whether this node is tagged as a start node.
    pub fn is_start(&self) -> bool {
        self.node_type == START_NODE_TYPE
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// A directed edge with an optional trigger gate and an ordered validator list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTransition {
    /// User-defined transition id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Optional gate that may suspend progress until satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TransitionTrigger>,
    /// Checks evaluated before exit actions; first failure is fatal to the run.
    #[serde(default)]
    pub validators: Vec<TransitionValidator>,
}

/// Gate on a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// Always proceeds.
    Immediate {},
    /// Proceeds only while the boolean expression evaluates true against the
    /// run's current variables; false suspends the run until resumed.
    Conditional { expression: String },
}

/// Fatal-on-failure check evaluated while leaving a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionValidator {
    /// Boolean expression over the run's variables.
    Expression { expression: String },
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A typed action attached to a node.
///
/// The type tag is deliberately an open string rather than a closed enum:
/// drafts arrive from external editors, and an action type this engine does
/// not understand must surface as an execution failure result, not a
/// deserialization error. Known tags are `llm`, `document`, `variable`, and
/// `conditional`; the executor deserializes the free-form `config` map into
/// the matching typed config struct at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAction {
    /// User-defined action id.
    pub id: String,
    /// Action type tag.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Free-form configuration payload.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, Value>,
}

impl WorkflowAction {
    /// Get a config value by key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Get a config value as a string slice.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
