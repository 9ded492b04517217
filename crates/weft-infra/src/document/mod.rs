//! Document export adapters.

pub mod fs;
