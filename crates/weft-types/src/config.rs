//! Engine configuration types for Weft.
//!
//! `EngineConfig` represents the top-level `weft.toml` that controls the
//! engine's own knobs: data directory, database URL override, the default
//! output variable for LLM actions, and the traversal step ceiling.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Weft engine.
///
/// Loaded from `~/.weft/weft.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory for the database and exported documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Explicit database URL; when unset, derived from `data_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Variable name LLM actions write their response to when the action
    /// config does not name one.
    #[serde(default = "default_output_variable")]
    pub default_output_variable: String,

    /// Upper bound on traversal iterations per run. Guards against cyclic
    /// drafts whose triggers never suspend.
    #[serde(default = "default_max_traversal_steps")]
    pub max_traversal_steps: u32,
}

fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.weft")
}

fn default_output_variable() -> String {
    "llm_response".to_string()
}

fn default_max_traversal_steps() -> u32 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            default_output_variable: default_output_variable(),
            max_traversal_steps: default_max_traversal_steps(),
        }
    }
}
