//! Execution-local "current context" slot.
//!
//! Three storage layers back the slot, checked in this order:
//!
//! - a tokio task-local, active for futures run through [`scope`],
//!   [`spawn`] or [`spawn_forked`] (and for async entrypoints);
//! - a table keyed by [`tokio::task::Id`], used inside any other tokio task
//!   (a raw `tokio::spawn`). Its entry follows the task across worker
//!   threads and is invisible to every other task;
//! - a thread-local, used outside tasks: plain threads and the body passed
//!   to `Runtime::block_on` (including `#[tokio::main]`).
//!
//! Tasks sharing a worker thread therefore never observe each other's
//! context. A raw task's table entry is removed by [`end`] or when the
//! guard from [`begin`] drops; a context created lazily in a raw task stays
//! in the table until that task calls [`end`], so long-lived code should run
//! such tasks through [`scope`] or [`spawn`] instead.
//!
//! Child tasks do not inherit anything implicitly: [`spawn`] hands the
//! child the same shared context, [`spawn_forked`] hands it a
//! [`FlowContext::fork`].

use super::FlowContext;
use crate::{NotFoundError, Result, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use tokio::task::{self, JoinHandle};

type Slot = RefCell<Option<Arc<FlowContext>>>;

tokio::task_local! {
    static TASK_CONTEXT: Slot;
}

thread_local! {
    static THREAD_CONTEXT: Slot = const { RefCell::new(None) };
}

static RAW_TASK_CONTEXTS: Lazy<Mutex<HashMap<task::Id, Arc<FlowContext>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

enum Storage {
    Scoped,
    RawTask(task::Id),
    Thread,
}

fn storage() -> Storage {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        Storage::Scoped
    } else if let Some(id) = task::try_id() {
        Storage::RawTask(id)
    } else {
        Storage::Thread
    }
}

fn load() -> Option<Arc<FlowContext>> {
    match storage() {
        Storage::Scoped => TASK_CONTEXT.with(|slot| slot.borrow().clone()),
        Storage::RawTask(id) => RAW_TASK_CONTEXTS.lock().get(&id).cloned(),
        Storage::Thread => THREAD_CONTEXT.with(|slot| slot.borrow().clone()),
    }
}

/// Put `context` in the current slot, returning what was there.
fn replace(context: Option<Arc<FlowContext>>) -> Option<Arc<FlowContext>> {
    match storage() {
        Storage::Scoped => TASK_CONTEXT.with(|slot| slot.replace(context)),
        Storage::RawTask(id) => {
            let mut table = RAW_TASK_CONTEXTS.lock();
            match context {
                Some(context) => table.insert(id, context),
                None => table.remove(&id),
            }
        }
        Storage::Thread => THREAD_CONTEXT.with(|slot| slot.replace(context)),
    }
}

fn load_or_insert(create: impl FnOnce() -> Arc<FlowContext>) -> (Arc<FlowContext>, bool) {
    fn in_slot(
        slot: &Slot,
        create: impl FnOnce() -> Arc<FlowContext>,
    ) -> (Arc<FlowContext>, bool) {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(ctx) => (ctx.clone(), false),
            None => {
                let ctx = create();
                *slot = Some(ctx.clone());
                (ctx, true)
            }
        }
    }

    match storage() {
        Storage::Scoped => TASK_CONTEXT.with(|slot| in_slot(slot, create)),
        Storage::RawTask(id) => {
            let mut table = RAW_TASK_CONTEXTS.lock();
            match table.get(&id) {
                Some(ctx) => (ctx.clone(), false),
                None => {
                    let ctx = create();
                    table.insert(id, ctx.clone());
                    (ctx, true)
                }
            }
        }
        Storage::Thread => THREAD_CONTEXT.with(|slot| in_slot(slot, create)),
    }
}

/// The active context of the calling execution, if any.
pub fn current_context() -> Option<Arc<FlowContext>> {
    load()
}

pub fn current_correlation_id() -> Option<String> {
    current_context().map(|ctx| ctx.correlation_id().to_string())
}

/// The active context, creating one in the current slot if none exists.
pub fn get_or_create_context() -> Arc<FlowContext> {
    let (ctx, created) = load_or_insert(|| Arc::new(FlowContext::new()));
    // Logged after the slot is released: subscribers may read the context.
    if created {
        tracing::debug!("Created flow context lazily: {}", ctx.correlation_id());
    }
    ctx
}

/// `None` when no context is active or the key is unset.
pub fn get_context_value(key: &str) -> Option<Value> {
    current_context().and_then(|ctx| ctx.get_value(key))
}

pub fn get_context_value_or(key: &str, default: impl Into<Value>) -> Value {
    get_context_value(key).unwrap_or_else(|| default.into())
}

/// Write into the active context, creating one first if necessary.
pub fn set_context_value(key: impl Into<String>, value: impl Into<Value>) {
    get_or_create_context().set_value(key, value);
}

pub fn delete_context_value(key: &str) -> Result<Value> {
    match current_context() {
        Some(ctx) => Ok(ctx.delete_value(key)?),
        None => Err(NotFoundError::ContextKey(key.to_string()).into()),
    }
}

/// Activate `context` in the current slot. The returned guard clears the
/// slot when dropped, including during unwinding.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub fn begin(context: FlowContext) -> ContextGuard {
    let context = Arc::new(context);
    tracing::trace!("Activating flow context: {}", context.correlation_id());
    replace(Some(context));
    ContextGuard {
        restore: None,
        _not_send: PhantomData,
    }
}

/// Clear the current slot back to "no context".
pub fn end() {
    replace(None);
}

/// Install an existing shared context in the current slot. Unlike
/// [`begin`], the guard restores whatever was active before.
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub fn attach(context: Arc<FlowContext>) -> ContextGuard {
    let previous = replace(Some(context));
    ContextGuard {
        restore: previous,
        _not_send: PhantomData,
    }
}

/// Run `future` with `context` as its current context, isolated from the
/// caller's slot.
pub fn scope<F>(context: Option<Arc<FlowContext>>, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    TASK_CONTEXT.scope(RefCell::new(context), future)
}

/// Spawn a tokio task sharing the caller's context: same correlation id,
/// same live metadata.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(scope(current_context(), future))
}

/// Spawn a tokio task running under a fork of the caller's context.
pub fn spawn_forked<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let forked = current_context().map(|ctx| Arc::new(ctx.fork()));
    tokio::spawn(scope(forked, future))
}

/// Spawn an OS thread sharing the caller's context.
pub fn spawn_thread<F, T>(f: F) -> std::thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let inherited = current_context();
    std::thread::spawn(move || {
        let _guard = inherited.map(attach);
        f()
    })
}

/// Scope guard returned by [`begin`] and [`attach`]. Bound to the thread
/// that created it.
#[derive(Debug)]
pub struct ContextGuard {
    restore: Option<Arc<FlowContext>>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        replace(self.restore.take());
    }
}
