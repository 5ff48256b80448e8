use crate::graph::FlowGraph;
use penstockcore::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported diagram output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DagFormat {
    /// Mermaid flowchart text (`graph TD`).
    #[default]
    #[serde(alias = "mermaid")]
    Flowchart,
}

impl DagFormat {
    pub fn name(&self) -> &'static str {
        match self {
            DagFormat::Flowchart => "flowchart",
        }
    }

    pub fn render(&self, graph: &FlowGraph) -> String {
        match self {
            DagFormat::Flowchart => render_flowchart(graph),
        }
    }
}

impl FromStr for DagFormat {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flowchart" | "mermaid" => Ok(DagFormat::Flowchart),
            other => Err(FlowError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for DagFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header line, sorted edges, then sorted edgeless nodes, each on its own
/// line. Always ends with a newline.
pub fn render_flowchart(graph: &FlowGraph) -> String {
    let mut out = String::from("graph TD\n");

    for (source, target) in graph.edges() {
        out.push_str(&format!("    {} --> {}\n", source, target));
    }

    for node in graph.isolated_nodes() {
        out.push_str(&format!("    {}\n", node));
    }

    out
}
