//! Flow tracing and visualization
//!
//! Declare the steps of a named flow, run them with an automatically
//! propagated correlation context, and render the declared dependency
//! graph as a deterministic flowchart.
//!
//! ```rust,ignore
//! let penstock = Penstock::new();
//! let etl = penstock.flow("etl");
//! let extract = etl.entrypoint("extract").build();
//! let transform = etl.step("transform").after(&extract).build();
//!
//! extract.run(|| transform.run(|| println!("{:?}", current_correlation_id())))??;
//! print!("{}", penstock.render("etl")?);
//! ```
//!
//! The free functions at the crate root operate on a process-wide
//! [`Penstock`] returned by [`global`].

mod backend;
mod graph;
mod instrument;
mod registry;
mod render;
mod runtime;

pub use backend::{BackendKind, LoggingBackend, NoopBackend, SpanBackend, SpanHandle};
pub use graph::FlowGraph;
pub use instrument::{FlowScope, Step, StepBuilder, StepKind};
pub use registry::StepRegistry;
pub use render::{render_flowchart, DagFormat};
pub use runtime::{Penstock, RuntimeConfig};

pub use penstockcore::context::{
    self, current_context, current_correlation_id, delete_context_value, get_context_value,
    get_context_value_or, set_context_value,
};
pub use penstockcore::{
    normalize_predecessors, FlowContext, FlowError, FlowSnapshot, NotFoundError, Predecessor,
    Result, StepDeclaration, Value,
};

use once_cell::sync::Lazy;
use std::path::Path;

static GLOBAL: Lazy<Penstock> = Lazy::new(Penstock::new);

/// The process-wide instance used by the free functions.
pub fn global() -> &'static Penstock {
    &GLOBAL
}

/// Switch the process-wide backend.
pub fn configure(kind: BackendKind) {
    global().configure(kind);
}

pub fn register_entry(flow_name: impl Into<String>, step_name: impl Into<String>) -> StepBuilder {
    global().register_entry(flow_name, step_name)
}

pub fn register_step(flow_name: impl Into<String>, step_name: impl Into<String>) -> StepBuilder {
    global().register_step(flow_name, step_name)
}

pub fn flow(flow_name: impl Into<String>) -> FlowScope {
    global().flow(flow_name)
}

/// See [`Penstock::render_flow`].
pub fn render_flow(flow_name: &str, format: &str, output: Option<&Path>) -> Result<Option<String>> {
    global().render_flow(flow_name, format, output)
}
