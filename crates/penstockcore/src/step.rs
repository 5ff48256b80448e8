use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Declaration of one step (node) of a flow.
///
/// Immutable once built; equality and hashing cover all four fields. The
/// identity key inside a registry is `(flow_name, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepDeclaration {
    name: String,
    flow_name: String,
    predecessors: Vec<String>,
    is_entrypoint: bool,
}

impl StepDeclaration {
    pub fn new<I, P>(
        flow_name: impl Into<String>,
        name: impl Into<String>,
        predecessors: I,
        is_entrypoint: bool,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Predecessor>,
    {
        Self {
            name: name.into(),
            flow_name: flow_name.into(),
            predecessors: normalize_predecessors(predecessors),
            is_entrypoint,
        }
    }

    /// An entrypoint with no predecessors.
    pub fn entrypoint(flow_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(flow_name, name, Vec::<Predecessor>::new(), true)
    }

    /// A regular step with no predecessors.
    pub fn step(flow_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(flow_name, name, Vec::<Predecessor>::new(), false)
    }

    /// Returns a copy with `predecessor` appended.
    pub fn with_predecessor(mut self, predecessor: impl Into<Predecessor>) -> Self {
        self.predecessors.push(predecessor.into().into_name());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    /// Declared "after" set, in declaration order.
    pub fn predecessors(&self) -> &[String] {
        &self.predecessors
    }

    pub fn is_entrypoint(&self) -> bool {
        self.is_entrypoint
    }

    /// `(flow_name, name)`, the identity of the declaration in a registry.
    pub fn key(&self) -> (&str, &str) {
        (&self.flow_name, &self.name)
    }
}

/// A reference to a predecessor step, normalized to its step name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predecessor(String);

impl Predecessor {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn into_name(self) -> String {
        self.0
    }
}

impl From<&str> for Predecessor {
    fn from(name: &str) -> Self {
        Predecessor(name.to_string())
    }
}

impl From<String> for Predecessor {
    fn from(name: String) -> Self {
        Predecessor(name)
    }
}

impl From<&String> for Predecessor {
    fn from(name: &String) -> Self {
        Predecessor(name.clone())
    }
}

impl From<&StepDeclaration> for Predecessor {
    fn from(declaration: &StepDeclaration) -> Self {
        Predecessor(declaration.name.clone())
    }
}

/// Normalize a mixed sequence of predecessor references element-wise,
/// preserving order.
pub fn normalize_predecessors<I, P>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = P>,
    P: Into<Predecessor>,
{
    items
        .into_iter()
        .map(|item| item.into().into_name())
        .collect()
}

/// Immutable view of every step registered under one flow name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    name: String,
    steps: IndexMap<String, StepDeclaration>,
    entrypoints: BTreeSet<String>,
}

impl FlowSnapshot {
    /// Build a snapshot from declarations in registration order. A later
    /// declaration with the same step name replaces the earlier one but
    /// keeps its original position.
    pub fn from_declarations<I>(name: impl Into<String>, declarations: I) -> Self
    where
        I: IntoIterator<Item = StepDeclaration>,
    {
        let mut steps = IndexMap::new();
        for declaration in declarations {
            steps.insert(declaration.name.clone(), declaration);
        }
        let entrypoints = steps
            .values()
            .filter(|s| s.is_entrypoint)
            .map(|s| s.name.clone())
            .collect();

        Self {
            name: name.into(),
            steps,
            entrypoints,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &IndexMap<String, StepDeclaration> {
        &self.steps
    }

    pub fn entrypoints(&self) -> &BTreeSet<String> {
        &self.entrypoints
    }

    pub fn get(&self, step: &str) -> Option<&StepDeclaration> {
        self.steps.get(step)
    }

    pub fn contains(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
