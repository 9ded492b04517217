//! Draft validation and draft file operations.
//!
//! Structural validation aggregates every problem it finds into a
//! `ValidationReport` instead of failing fast, so editors can surface the
//! complete list. The engine refuses to start a run for a draft whose report
//! has errors; warnings are advisory.
//!
//! Also converts between YAML files and `WorkflowDraft`, with discovery for
//! draft files on disk.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use thiserror::Error;
use weft_types::draft::WorkflowDraft;

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// Outcome of structural draft validation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// True when no errors were found (warnings do not affect validity).
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// All errors joined into one message, for synchronous failure paths.
    pub fn aggregated_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate structural constraints on a draft.
///
/// Errors (draft is rejected):
/// - empty node set
/// - duplicate node ids
/// - transition source/target referencing unknown nodes
///
/// Warnings (draft is accepted):
/// - duplicate transition ids
/// - more than one outgoing transition from a node (only the first declared
///   is taken during traversal)
/// - nodes unreachable from the start node
pub fn validate_draft(draft: &WorkflowDraft) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if draft.nodes.is_empty() {
        errors.push("workflow draft must have at least one node".to_string());
    }

    let mut node_ids = HashSet::new();
    for node in &draft.nodes {
        if !node_ids.insert(node.id.as_str()) {
            errors.push(format!("duplicate node id: '{}'", node.id));
        }
    }

    let mut transition_ids = HashSet::new();
    let mut outgoing_seen = HashSet::new();
    for transition in &draft.transitions {
        if !transition_ids.insert(transition.id.as_str()) {
            warnings.push(format!("duplicate transition id: '{}'", transition.id));
        }
        if !node_ids.contains(transition.source.as_str()) {
            errors.push(format!(
                "transition '{}' references unknown source node '{}'",
                transition.id, transition.source
            ));
        }
        if !node_ids.contains(transition.target.as_str()) {
            errors.push(format!(
                "transition '{}' references unknown target node '{}'",
                transition.id, transition.target
            ));
        }
        if !outgoing_seen.insert(transition.source.as_str()) {
            warnings.push(format!(
                "node '{}' has multiple outgoing transitions; only the first declared is taken",
                transition.source
            ));
        }
    }

    // Reachability only makes sense on a structurally sound graph with a
    // single entry point.
    if errors.is_empty() {
        let starts = draft.start_nodes();
        if starts.len() == 1 {
            let reachable = reachable_from(draft, &starts[0].id);
            for node in &draft.nodes {
                if !reachable.contains(node.id.as_str()) {
                    warnings.push(format!(
                        "node '{}' is unreachable from the start node",
                        node.id
                    ));
                }
            }
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn reachable_from<'a>(draft: &'a WorkflowDraft, start: &'a str) -> HashSet<&'a str> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node_id) = queue.pop_front() {
        if !visited.insert(node_id) {
            continue;
        }
        for transition in draft.transitions.iter().filter(|t| t.source == node_id) {
            queue.push_back(transition.target.as_str());
        }
    }
    visited
}

// ---------------------------------------------------------------------------
// Draft files
// ---------------------------------------------------------------------------

/// Errors that can occur loading or saving draft files.
#[derive(Debug, Error)]
pub enum DraftFileError {
    /// YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure (aggregated message).
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a YAML string into a validated `WorkflowDraft`.
pub fn parse_draft_yaml(yaml: &str) -> Result<WorkflowDraft, DraftFileError> {
    let draft: WorkflowDraft =
        serde_yaml_ng::from_str(yaml).map_err(|e| DraftFileError::Parse(e.to_string()))?;
    let report = validate_draft(&draft);
    if !report.valid {
        return Err(DraftFileError::Validation(report.aggregated_message()));
    }
    Ok(draft)
}

/// Serialize a `WorkflowDraft` to a YAML string.
pub fn serialize_draft_yaml(draft: &WorkflowDraft) -> Result<String, DraftFileError> {
    serde_yaml_ng::to_string(draft).map_err(|e| DraftFileError::Parse(e.to_string()))
}

/// Load a draft from a YAML file.
pub fn load_draft_file(path: &Path) -> Result<WorkflowDraft, DraftFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_draft_yaml(&content)
}

/// Save a draft to a YAML file, creating parent directories as needed.
pub fn save_draft_file(path: &Path, draft: &WorkflowDraft) -> Result<(), DraftFileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_draft_yaml(draft)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all draft YAML files under `base_dir`.
///
/// Scans `.yaml` and `.yml` files recursively. Files that fail to parse or
/// validate are skipped with a warning; they may not be drafts at all.
pub fn discover_drafts(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDraft)>, DraftFileError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDraft)>,
) -> Result<(), DraftFileError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                match load_draft_file(&path) {
                    Ok(draft) => results.push((path, draft)),
                    Err(_) => {
                        tracing::warn!(?path, "skipping unparseable draft file");
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
