//! Sandbox module containing all execution-related components.

pub mod config;
pub mod context;
pub mod executor;
pub mod io;
pub mod limits;
pub mod namespace;
pub mod redact;
pub mod serialize;
pub mod tool;
