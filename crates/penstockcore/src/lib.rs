//! Core abstractions for penstock
//!
//! This crate provides the fundamental types every other component depends
//! on: step declarations and flow snapshots, the per-execution
//! [`FlowContext`], the execution-local propagation slot, and the error
//! taxonomy. It has no registry or rendering logic.

pub mod context;
mod error;
mod step;
mod value;

pub use context::FlowContext;
pub use error::{FlowError, NotFoundError};
pub use step::{normalize_predecessors, FlowSnapshot, Predecessor, StepDeclaration};
pub use value::Value;

/// Result type for penstock operations
pub type Result<T> = std::result::Result<T, FlowError>;
