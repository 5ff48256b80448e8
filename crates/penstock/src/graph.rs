use penstockcore::{FlowError, FlowSnapshot, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Directed dependency graph derived from a flow snapshot.
///
/// Nodes are step names; an edge `p -> s` exists for every predecessor `p`
/// declared by step `s`. A predecessor that was never registered still
/// becomes a node. Every query returns names in lexicographic order, so
/// the registration order of the underlying declarations never leaks out.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    flow_name: String,
    graph: DiGraph<String, ()>,
    node_to_index: HashMap<String, NodeIndex>,
    entrypoints: BTreeSet<String>,
}

impl FlowGraph {
    pub fn from_snapshot(snapshot: &FlowSnapshot) -> Self {
        let mut graph = DiGraph::new();
        let mut node_to_index = HashMap::new();

        // Add all registered steps
        for name in snapshot.steps().keys() {
            Self::ensure_node(&mut graph, &mut node_to_index, name);
        }

        // Add edges from declared predecessors; update_edge keeps the edge
        // set free of duplicates
        for step in snapshot.steps().values() {
            let to_idx = Self::ensure_node(&mut graph, &mut node_to_index, step.name());
            for predecessor in step.predecessors() {
                let from_idx = Self::ensure_node(&mut graph, &mut node_to_index, predecessor);
                graph.update_edge(from_idx, to_idx, ());
            }
        }

        Self {
            flow_name: snapshot.name().to_string(),
            graph,
            node_to_index,
            entrypoints: snapshot.entrypoints().clone(),
        }
    }

    fn ensure_node(
        graph: &mut DiGraph<String, ()>,
        node_to_index: &mut HashMap<String, NodeIndex>,
        name: &str,
    ) -> NodeIndex {
        if let Some(idx) = node_to_index.get(name) {
            return *idx;
        }
        let idx = graph.add_node(name.to_string());
        node_to_index.insert(name.to_string(), idx);
        idx
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_to_index.contains_key(name)
    }

    /// All node names, implicit predecessors included.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.graph.node_weights().cloned().collect();
        nodes.sort();
        nodes
    }

    /// `(source, target)` pairs ordered by source, then target.
    pub fn edges(&self) -> Vec<(String, String)> {
        let edges: BTreeSet<(String, String)> = self
            .graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].clone(),
                    self.graph[edge.target()].clone(),
                )
            })
            .collect();
        edges.into_iter().collect()
    }

    /// Nodes with neither incoming nor outgoing edges.
    pub fn isolated_nodes(&self) -> Vec<String> {
        let mut isolated: Vec<String> = self
            .graph
            .node_indices()
            .filter(|idx| self.graph.neighbors_undirected(*idx).next().is_none())
            .map(|idx| self.graph[idx].clone())
            .collect();
        isolated.sort();
        isolated
    }

    pub fn entrypoints(&self) -> &BTreeSet<String> {
        &self.entrypoints
    }

    /// Direct successors of `name`; empty for unknown names.
    pub fn successors(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Direct predecessors of `name`; empty for unknown names.
    pub fn predecessors(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(idx) = self.node_to_index.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(*idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Kahn's algorithm with lexicographic tie-breaking.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        if is_cyclic_directed(&self.graph) {
            return Err(FlowError::CyclicDependency(self.flow_name.clone()));
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count();
                (idx, degree)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(String, NodeIndex)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse((self.graph[*idx].clone(), *idx)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((name, idx))) = ready.pop() {
            order.push(name);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.graph[next].clone(), next)));
                    }
                }
            }
        }

        Ok(order)
    }
}
