//! Shared domain types for the Weft workflow engine.
//!
//! This crate contains the core domain types used across the Weft platform:
//! workflow drafts (the static graph), runs and their event stream, ephemeral
//! instances, LLM and document boundary types, and their associated errors.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod document;
pub mod draft;
pub mod error;
pub mod instance;
pub mod llm;
pub mod run;
