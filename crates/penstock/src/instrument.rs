//! Step wrappers: register a declaration, then bracket each invocation
//! with context management and a backend span.
//!
//! Synchronous and asynchronous bodies share one admission rule
//! ([`Step::run`] and [`Step::run_async`] differ only in how the body is
//! invoked):
//!
//! - an entrypoint always starts a fresh [`FlowContext`] and clears it when
//!   the body returns, panics, or (async) is dropped;
//! - a regular step requires an active context and never creates one.
//!
//! The two entrypoint forms end differently. [`Step::run`] activates its
//! context in the caller's slot and clears that slot when it returns, so a
//! context the caller had (even one created lazily) is gone afterwards.
//! [`Step::run_async`] runs in its own task-local scope and leaves the
//! caller's slot as it found it.

use crate::runtime::Penstock;
use futures::future::{BoxFuture, FutureExt};
use penstockcore::context::{self, current_context};
use penstockcore::{FlowContext, FlowError, FlowSnapshot, Predecessor, Result, StepDeclaration};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Entrypoint,
    Step,
}

/// Collects a step's predecessors before registering it.
#[must_use = "the step is only registered by calling build()"]
pub struct StepBuilder {
    runtime: Penstock,
    flow_name: String,
    name: String,
    kind: StepKind,
    after: Vec<Predecessor>,
}

impl StepBuilder {
    pub(crate) fn new(
        runtime: Penstock,
        flow_name: impl Into<String>,
        name: impl Into<String>,
        kind: StepKind,
    ) -> Self {
        Self {
            runtime,
            flow_name: flow_name.into(),
            name: name.into(),
            kind,
            after: Vec::new(),
        }
    }

    /// Declare a predecessor, by name or by an already-built [`Step`].
    pub fn after(mut self, predecessor: impl Into<Predecessor>) -> Self {
        self.after.push(predecessor.into());
        self
    }

    pub fn after_all<I, P>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Predecessor>,
    {
        self.after.extend(predecessors.into_iter().map(Into::into));
        self
    }

    /// Register the declaration and return the invocation handle.
    pub fn build(self) -> Step {
        let declaration = StepDeclaration::new(
            self.flow_name,
            self.name,
            self.after,
            self.kind == StepKind::Entrypoint,
        );
        self.runtime.registry().register(declaration.clone());

        Step {
            runtime: self.runtime,
            declaration: Arc::new(declaration),
        }
    }
}

enum Admission {
    /// Entrypoint: run under a brand-new context.
    Fresh,
    /// Step: run under the caller's active context.
    Joined,
}

/// Handle to a registered step.
#[derive(Clone)]
pub struct Step {
    runtime: Penstock,
    declaration: Arc<StepDeclaration>,
}

impl Step {
    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn flow_name(&self) -> &str {
        self.declaration.flow_name()
    }

    pub fn kind(&self) -> StepKind {
        if self.declaration.is_entrypoint() {
            StepKind::Entrypoint
        } else {
            StepKind::Step
        }
    }

    pub fn declaration(&self) -> &StepDeclaration {
        &self.declaration
    }

    fn admit(&self) -> Result<Admission> {
        match self.kind() {
            StepKind::Entrypoint => Ok(Admission::Fresh),
            StepKind::Step if current_context().is_some() => Ok(Admission::Joined),
            StepKind::Step => {
                tracing::warn!(
                    "Step {}.{} invoked without an active flow context",
                    self.flow_name(),
                    self.name()
                );
                Err(FlowError::NotInFlowContext {
                    step: self.name().to_string(),
                    flow: self.flow_name().to_string(),
                })
            }
        }
    }

    /// Invoke a synchronous body inside this step.
    ///
    /// Fails with [`FlowError::NotInFlowContext`] (without running `body`)
    /// when a regular step is called outside any flow.
    pub fn run<R>(&self, body: impl FnOnce() -> R) -> Result<R> {
        let admission = self.admit()?;

        // Declaration order matters: the span closes before the context
        // is cleared.
        let _context = match admission {
            Admission::Fresh => Some(context::begin(FlowContext::new())),
            Admission::Joined => None,
        };
        let handle = self.runtime.backend().open_span(self.name(), self.flow_name());
        let _entered = handle.span().entered();

        Ok(body())
    }

    /// Invoke an asynchronous body inside this step.
    ///
    /// An entrypoint's context lives in a task-local scope around the body,
    /// so it is released even if the returned future is dropped mid-flight.
    pub async fn run_async<F>(&self, body: F) -> Result<F::Output>
    where
        F: Future,
    {
        let admission = self.admit()?;
        let backend = self.runtime.backend();
        let (step_name, flow_name) = (self.name(), self.flow_name());

        let traced = async move {
            let handle = backend.open_span(step_name, flow_name);
            let output = body.instrument(handle.span()).await;
            drop(handle);
            output
        };

        let output = match admission {
            Admission::Fresh => {
                context::scope(Some(Arc::new(FlowContext::new())), traced).await
            }
            Admission::Joined => traced.await,
        };
        Ok(output)
    }

    /// Wrap a synchronous callable, keeping its single-argument calling
    /// convention (use a tuple for several arguments).
    pub fn wrap<A, R, F>(&self, f: F) -> impl Fn(A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        let step = self.clone();
        move |arg| step.run(|| f(arg))
    }

    /// Wrap a callable returning a future.
    pub fn wrap_async<A, Fut, F>(&self, f: F) -> impl Fn(A) -> BoxFuture<'static, Result<Fut::Output>>
    where
        F: Fn(A) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let step = self.clone();
        move |arg| {
            let step = step.clone();
            let body = f(arg);
            async move { step.run_async(body).await }.boxed()
        }
    }
}

impl From<&Step> for Predecessor {
    fn from(step: &Step) -> Self {
        Predecessor::from(step.name())
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("flow", &self.flow_name())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Declares steps that all belong to one flow.
#[derive(Clone)]
pub struct FlowScope {
    runtime: Penstock,
    flow_name: String,
}

impl FlowScope {
    pub(crate) fn new(runtime: Penstock, flow_name: impl Into<String>) -> Self {
        Self {
            runtime,
            flow_name: flow_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.flow_name
    }

    pub fn entrypoint(&self, step_name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(
            self.runtime.clone(),
            self.flow_name.clone(),
            step_name,
            StepKind::Entrypoint,
        )
    }

    pub fn step(&self, step_name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(
            self.runtime.clone(),
            self.flow_name.clone(),
            step_name,
            StepKind::Step,
        )
    }

    pub fn snapshot(&self) -> Result<FlowSnapshot> {
        self.runtime.get_flow(&self.flow_name)
    }

    /// Render with the runtime's default format.
    pub fn render(&self) -> Result<String> {
        self.runtime.render(&self.flow_name)
    }
}
