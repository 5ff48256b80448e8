use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Unsupported format: '{0}' (expected 'flowchart' or 'mermaid')")]
    UnsupportedFormat(String),

    #[error(
        "Step '{step}' of flow '{flow}' called outside of a flow context. \
         Ensure an entrypoint has been called first."
    )]
    NotInFlowContext { step: String, flow: String },

    #[error("Cyclic dependency detected in flow '{0}'")]
    CyclicDependency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowError::NotFound(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("flow '{0}' has no registered steps")]
    Flow(String),

    #[error("context key '{0}' is not set")]
    ContextKey(String),
}
