use penstockcore::context::current_correlation_id;
use penstockcore::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Capability that brackets each step invocation with a span.
///
/// `open_span` is called exactly once per invocation, before the body
/// runs; the returned handle is dropped exactly once, after the body
/// finishes, fails, panics, or is cancelled.
pub trait SpanBackend: Send + Sync {
    /// Short identifier (e.g., "noop", "logging")
    fn name(&self) -> &str;

    fn open_span(&self, step_name: &str, flow_name: &str) -> Box<dyn SpanHandle>;
}

/// An open span. Dropping it closes the span.
pub trait SpanHandle: Send {
    /// `tracing` span the step body is entered into (sync) or instrumented
    /// with (async). Disabled by default.
    fn span(&self) -> tracing::Span {
        tracing::Span::none()
    }
}

/// Backend that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

struct NoopSpan;

impl SpanHandle for NoopSpan {}

impl SpanBackend for NoopBackend {
    fn name(&self) -> &str {
        "noop"
    }

    fn open_span(&self, _step_name: &str, _flow_name: &str) -> Box<dyn SpanHandle> {
        Box::new(NoopSpan)
    }
}

/// Backend that reports each step through `tracing`.
///
/// Every step gets an `info`-level span carrying `flow`, `step` and
/// `correlation_id` fields, a start event, and a completion event with the
/// elapsed time (an `error` event instead if the body panicked).
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBackend;

struct LoggedSpan {
    span: tracing::Span,
    flow_name: String,
    step_name: String,
    started: Instant,
}

impl SpanBackend for LoggingBackend {
    fn name(&self) -> &str {
        "logging"
    }

    fn open_span(&self, step_name: &str, flow_name: &str) -> Box<dyn SpanHandle> {
        let correlation_id = current_correlation_id().unwrap_or_default();
        let span = tracing::info_span!(
            "penstock.step",
            flow = %flow_name,
            step = %step_name,
            correlation_id = %correlation_id
        );
        span.in_scope(|| tracing::info!("Starting step: {}.{}", flow_name, step_name));

        Box::new(LoggedSpan {
            span,
            flow_name: flow_name.to_string(),
            step_name: step_name.to_string(),
            started: Instant::now(),
        })
    }
}

impl SpanHandle for LoggedSpan {
    fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

impl Drop for LoggedSpan {
    fn drop(&mut self) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let _entered = self.span.enter();
        if std::thread::panicking() {
            tracing::error!(
                "Step {}.{} panicked after {}ms",
                self.flow_name,
                self.step_name,
                duration_ms
            );
        } else {
            tracing::info!(
                "Step {}.{} completed in {}ms",
                self.flow_name,
                self.step_name,
                duration_ms
            );
        }
    }
}

/// Built-in backends selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[serde(alias = "none")]
    Noop,
    #[serde(alias = "log")]
    Logging,
}

impl BackendKind {
    pub fn build(self) -> Arc<dyn SpanBackend> {
        match self {
            BackendKind::Noop => Arc::new(NoopBackend),
            BackendKind::Logging => Arc::new(LoggingBackend),
        }
    }
}

impl FromStr for BackendKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noop" | "none" => Ok(BackendKind::Noop),
            "logging" | "log" => Ok(BackendKind::Logging),
            _ => Err(FlowError::Configuration(format!(
                "Unknown backend '{}' (expected 'noop' or 'logging')",
                s
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Noop => f.write_str("noop"),
            BackendKind::Logging => f.write_str("logging"),
        }
    }
}
