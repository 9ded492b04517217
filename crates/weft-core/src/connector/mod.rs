//! Capability ports consumed by the action executor.
//!
//! - `llm` -- `LlmConnector` trait (RPITIT) plus its object-safe box wrapper
//! - `document` -- `DocumentExporter` trait plus its box wrapper
//! - `registry` -- name-indexed connector lookup
//!
//! Concrete implementations (HTTP clients, filesystem exporters) live outside
//! this crate; the engine only consumes these boundaries.

pub mod document;
pub mod llm;
pub mod registry;
