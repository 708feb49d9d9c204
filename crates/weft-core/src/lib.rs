//! Weft Core — transport-agnostic workflow orchestration engine.
//!
//! This crate contains the domain logic for multi-step AI-agent workflows:
//! templates, executions, the context resolver, the step runner, and the
//! execution state machine. It has **no HTTP framework dependency** by
//! default, making it suitable for use in:
//!
//! - HTTP servers (via `weft-server`)
//! - CLI tools
//! - embedded/test harnesses (in-memory repository, mock invokers)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `EngineError` for use in axum
//!   handlers.

pub mod agent;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;

// Convenience re-exports
pub use db::Database;
pub use engine::{AdvanceOutcome, ExecutionEngine};
pub use error::EngineError;
