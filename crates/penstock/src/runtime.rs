use crate::backend::{BackendKind, SpanBackend};
use crate::graph::FlowGraph;
use crate::instrument::{FlowScope, StepBuilder, StepKind};
use crate::registry::StepRegistry;
use crate::render::DagFormat;
use parking_lot::RwLock;
use penstockcore::{FlowSnapshot, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Entry point tying a step registry to a span backend.
///
/// Cheap to clone; clones share the registry and the backend slot.
#[derive(Clone)]
pub struct Penstock {
    registry: Arc<StepRegistry>,
    backend: Arc<RwLock<Arc<dyn SpanBackend>>>,
    config: RuntimeConfig,
}

impl Penstock {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(StepRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime around an existing registry
    pub fn with_registry(registry: Arc<StepRegistry>, config: RuntimeConfig) -> Self {
        let backend = config.backend.build();
        Self {
            registry,
            backend: Arc::new(RwLock::new(backend)),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Backend used by the next step invocation.
    pub fn backend(&self) -> Arc<dyn SpanBackend> {
        self.backend.read().clone()
    }

    pub fn set_backend(&self, backend: Arc<dyn SpanBackend>) {
        tracing::debug!("Switching span backend to: {}", backend.name());
        *self.backend.write() = backend;
    }

    /// Switch to one of the built-in backends.
    pub fn configure(&self, kind: BackendKind) {
        self.set_backend(kind.build());
    }

    /// Declare an entrypoint of `flow_name`.
    pub fn register_entry(
        &self,
        flow_name: impl Into<String>,
        step_name: impl Into<String>,
    ) -> StepBuilder {
        StepBuilder::new(self.clone(), flow_name, step_name, StepKind::Entrypoint)
    }

    /// Declare a regular step of `flow_name`.
    pub fn register_step(
        &self,
        flow_name: impl Into<String>,
        step_name: impl Into<String>,
    ) -> StepBuilder {
        StepBuilder::new(self.clone(), flow_name, step_name, StepKind::Step)
    }

    pub fn flow(&self, flow_name: impl Into<String>) -> FlowScope {
        FlowScope::new(self.clone(), flow_name)
    }

    pub fn get_flow(&self, flow_name: &str) -> Result<FlowSnapshot> {
        self.registry.get_flow(flow_name)
    }

    pub fn graph(&self, flow_name: &str) -> Result<FlowGraph> {
        let snapshot = self.registry.get_flow(flow_name)?;
        Ok(FlowGraph::from_snapshot(&snapshot))
    }

    /// Render `flow_name` in the configured default format.
    pub fn render(&self, flow_name: &str) -> Result<String> {
        let graph = self.graph(flow_name)?;
        Ok(self.config.default_format.render(&graph))
    }

    /// Render `flow_name` as `format`.
    ///
    /// With an `output` path the text is written there and `None` is
    /// returned; nothing is written when the flow or format is unknown.
    pub fn render_flow(
        &self,
        flow_name: &str,
        format: &str,
        output: Option<&Path>,
    ) -> Result<Option<String>> {
        let graph = self.graph(flow_name)?;
        let format: DagFormat = format.parse()?;
        let rendered = format.render(&graph);

        match output {
            Some(path) => {
                std::fs::write(path, rendered)?;
                tracing::info!(
                    "Wrote {} diagram of flow '{}' to {}",
                    format,
                    flow_name,
                    path.display()
                );
                Ok(None)
            }
            None => Ok(Some(rendered)),
        }
    }
}

impl Default for Penstock {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: BackendKind,
    pub default_format: DagFormat,
}
