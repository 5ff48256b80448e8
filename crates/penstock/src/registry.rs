use indexmap::IndexMap;
use parking_lot::RwLock;
use penstockcore::{FlowSnapshot, NotFoundError, Result, StepDeclaration};

type FlowSteps = IndexMap<String, StepDeclaration>;

/// Store of step declarations, keyed by flow name then step name.
///
/// Internally synchronized: share it behind an `Arc` and register from any
/// thread. Each registration becomes visible atomically.
pub struct StepRegistry {
    flows: RwLock<IndexMap<String, FlowSteps>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            flows: RwLock::new(IndexMap::new()),
        }
    }

    /// Register a declaration, replacing any existing one with the same
    /// `(flow_name, name)`. Predecessors are not validated.
    pub fn register(&self, declaration: StepDeclaration) {
        let (flow_name, step_name) = {
            let (flow, step) = declaration.key();
            (flow.to_string(), step.to_string())
        };

        let replaced = {
            let mut flows = self.flows.write();
            flows
                .entry(flow_name.clone())
                .or_default()
                .insert(step_name.clone(), declaration)
                .is_some()
        };

        if replaced {
            tracing::debug!("Re-registering step: {}.{}", flow_name, step_name);
        } else {
            tracing::debug!("Registering step: {}.{}", flow_name, step_name);
        }
    }

    /// Snapshot of everything registered under `flow_name` so far.
    pub fn get_flow(&self, flow_name: &str) -> Result<FlowSnapshot> {
        let flows = self.flows.read();
        let steps = flows
            .get(flow_name)
            .ok_or_else(|| NotFoundError::Flow(flow_name.to_string()))?;

        Ok(FlowSnapshot::from_declarations(
            flow_name,
            steps.values().cloned(),
        ))
    }

    pub fn contains_flow(&self, flow_name: &str) -> bool {
        self.flows.read().contains_key(flow_name)
    }

    /// All flow names, sorted.
    pub fn flow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flows.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered flows.
    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }

    /// Drop every flow. Meant for test isolation.
    pub fn clear(&self) {
        self.flows.write().clear();
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
