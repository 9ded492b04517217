//! Infrastructure implementations for Weft.
//!
//! Adapters behind the ports defined in `weft-core`:
//! - `sqlite` -- durable `RunStore` backed by SQLite (WAL, split pools)
//! - `document` -- filesystem document exporter
//! - `observe` -- tracing subscriber initialization

pub mod document;
pub mod observe;
pub mod sqlite;
