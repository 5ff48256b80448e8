// crates/penstockcore/tests/context_test.rs

use penstockcore::context::{
    self, begin, current_context, current_correlation_id, delete_context_value, end,
    get_context_value, get_context_value_or, get_or_create_context, set_context_value,
};
use penstockcore::{FlowContext, FlowError, NotFoundError, Value};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// FlowContext
// ---------------------------------------------------------------------------

#[test]
fn test_default_correlation_id_is_32_hex_chars() {
    let ctx = FlowContext::new();
    let cid = ctx.correlation_id();
    assert_eq!(cid.len(), 32);
    assert!(cid.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(FlowContext::new().correlation_id(), cid, "ids should be random");
}

#[test]
fn test_custom_correlation_id() {
    let ctx = FlowContext::with_correlation_id("abc");
    assert_eq!(ctx.correlation_id(), "abc");
}

#[test]
fn test_get_set_delete() {
    let ctx = FlowContext::new();
    assert_eq!(ctx.get_value("k"), None);
    assert_eq!(ctx.get_value_or("k", "fallback"), Value::from("fallback"));

    ctx.set_value("k", 42);
    assert_eq!(ctx.get_value("k"), Some(Value::Integer(42)));
    assert!(ctx.contains_key("k"));
    assert_eq!(ctx.len(), 1);

    assert_eq!(ctx.delete_value("k"), Ok(Value::Integer(42)));
    assert_eq!(
        ctx.delete_value("k"),
        Err(NotFoundError::ContextKey("k".to_string()))
    );
    assert!(ctx.is_empty());
}

#[test]
fn test_metadata_snapshot_is_independent() {
    let ctx = FlowContext::new();
    ctx.set_value("a", 1);

    let mut snapshot = ctx.metadata();
    snapshot.insert("a".to_string(), Value::Integer(999));
    snapshot.insert("b".to_string(), Value::Bool(true));

    assert_eq!(ctx.get_value("a"), Some(Value::Integer(1)));
    assert!(!ctx.contains_key("b"));
}

#[test]
fn test_fork_shares_correlation_id() {
    let parent = FlowContext::with_correlation_id("shared");
    let child = parent.fork();
    assert_eq!(child.correlation_id(), "shared");
    assert_eq!(child.started_at(), parent.started_at());
}

#[test]
fn test_fork_deep_copies_nested_metadata() {
    let parent = FlowContext::new();
    let mut nested = HashMap::new();
    nested.insert("x".to_string(), Value::from(vec![Value::from(1), Value::from(2)]));
    parent.set_value("nested", nested);

    let child = parent.fork();
    let mut changed = HashMap::new();
    changed.insert(
        "x".to_string(),
        Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]),
    );
    child.set_value("nested", changed);

    let original = parent.get_value("nested").unwrap();
    let items = original.as_object().unwrap()["x"].as_array().unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn test_fork_isolation_both_directions() {
    let parent = FlowContext::new();
    parent.set_value("a", 1);
    let child = parent.fork();

    child.set_value("b", 2);
    parent.set_value("c", 3);

    assert_eq!(parent.get_value("b"), None);
    assert_eq!(child.get_value("c"), None);
    assert_eq!(child.get_value("a"), Some(Value::Integer(1)));
}

// ---------------------------------------------------------------------------
// Propagation slot
// ---------------------------------------------------------------------------

#[test]
fn test_no_context_returns_none() {
    assert!(current_context().is_none());
    assert_eq!(current_correlation_id(), None);
}

#[test]
fn test_get_or_create_returns_same_instance() {
    let ctx = get_or_create_context();
    assert!(Arc::ptr_eq(&ctx, &get_or_create_context()));
    end();
}

#[test]
fn test_begin_and_end() {
    let guard = begin(FlowContext::with_correlation_id("test"));
    assert_eq!(current_correlation_id().as_deref(), Some("test"));
    end();
    assert_eq!(current_correlation_id(), None);
    drop(guard);
    assert_eq!(current_correlation_id(), None);
}

#[test]
fn test_guard_clears_slot_on_drop() {
    {
        let _guard = begin(FlowContext::with_correlation_id("scoped"));
        assert_eq!(current_correlation_id().as_deref(), Some("scoped"));
    }
    assert_eq!(current_correlation_id(), None);
}

#[test]
fn test_guard_clears_slot_on_panic() {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = begin(FlowContext::with_correlation_id("doomed"));
        panic!("boom");
    }));
    assert!(result.is_err());
    assert_eq!(current_correlation_id(), None);
}

#[test]
fn test_attach_restores_previous() {
    let _outer = begin(FlowContext::with_correlation_id("outer"));
    {
        let _inner = context::attach(Arc::new(FlowContext::with_correlation_id("inner")));
        assert_eq!(current_correlation_id().as_deref(), Some("inner"));
    }
    assert_eq!(current_correlation_id().as_deref(), Some("outer"));
}

#[test]
fn test_set_and_get_value() {
    init_tracing();
    set_context_value("k", "v");
    assert_eq!(get_context_value("k"), Some(Value::from("v")));
    end();
}

#[test]
fn test_get_value_without_context() {
    assert_eq!(get_context_value("k"), None);
    assert_eq!(get_context_value_or("k", "default"), Value::from("default"));
    assert!(current_context().is_none(), "reads must not create a context");
}

#[test]
fn test_set_creates_context() {
    assert!(current_context().is_none());
    set_context_value("user", "alice");
    assert!(current_context().is_some());
    assert!(current_correlation_id().is_some());
    assert_eq!(get_context_value("user"), Some(Value::from("alice")));
    end();
}

#[test]
fn test_delete_value() {
    set_context_value("k", true);
    assert_eq!(delete_context_value("k").unwrap(), Value::Bool(true));

    let err = delete_context_value("k").unwrap_err();
    assert!(matches!(
        err,
        FlowError::NotFound(NotFoundError::ContextKey(ref key)) if key == "k"
    ));
    end();
}

#[test]
fn test_delete_value_without_context() {
    let err = delete_context_value("anything").unwrap_err();
    assert!(err.is_not_found());
    assert!(current_context().is_none());
}

#[test]
fn test_threads_are_isolated() {
    let _guard = begin(FlowContext::with_correlation_id("main"));

    let other = std::thread::spawn(current_correlation_id).join().unwrap();
    assert_eq!(other, None);
    assert_eq!(current_correlation_id().as_deref(), Some("main"));
}

#[test]
fn test_spawn_thread_shares_context() {
    let _guard = begin(FlowContext::with_correlation_id("parent"));

    let cid = context::spawn_thread(|| {
        set_context_value("from_child", 1);
        current_correlation_id()
    })
    .join()
    .unwrap();

    assert_eq!(cid.as_deref(), Some("parent"));
    assert_eq!(get_context_value("from_child"), Some(Value::Integer(1)));
}

// ---------------------------------------------------------------------------
// Async propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_context_inherited_by_spawned_task() {
    let ctx = Arc::new(FlowContext::with_correlation_id("async-test"));

    context::scope(Some(ctx), async {
        set_context_value("source", "parent");

        let (cid, val) = context::spawn(async {
            (current_correlation_id(), get_context_value("source"))
        })
        .await
        .unwrap();

        assert_eq!(cid.as_deref(), Some("async-test"));
        assert_eq!(val, Some(Value::from("parent")));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_child_mutations_visible_to_parent() {
    let ctx = Arc::new(FlowContext::new());

    context::scope(Some(ctx.clone()), async {
        context::spawn(async {
            set_context_value("written_by", "child");
        })
        .await
        .unwrap();

        assert_eq!(get_context_value("written_by"), Some(Value::from("child")));
    })
    .await;

    assert_eq!(ctx.get_value("written_by"), Some(Value::from("child")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forked_task_is_isolated() {
    let ctx = Arc::new(FlowContext::with_correlation_id("lineage"));
    ctx.set_value("shared", "before");

    context::scope(Some(ctx.clone()), async {
        let cid = context::spawn_forked(async {
            set_context_value("shared", "child");
            set_context_value("child_only", 1);
            current_correlation_id()
        })
        .await
        .unwrap();

        assert_eq!(cid.as_deref(), Some("lineage"));
        assert_eq!(get_context_value("shared"), Some(Value::from("before")));
        assert_eq!(get_context_value("child_only"), None);
    })
    .await;
}

#[tokio::test]
async fn test_spawn_without_context() {
    let cid = context::spawn(async { current_correlation_id() }).await.unwrap();
    assert_eq!(cid, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scopes_do_not_cross_talk() {
    let mut handles = Vec::new();
    for i in 0..16 {
        let ctx = Arc::new(FlowContext::with_correlation_id(format!("run-{}", i)));
        handles.push(tokio::spawn(context::scope(Some(ctx), async move {
            set_context_value("index", i as i64);
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            (current_correlation_id(), get_context_value("index"))
        })));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let (cid, index) = handle.await.unwrap();
        assert_eq!(cid, Some(format!("run-{}", i)));
        assert_eq!(index, Some(Value::Integer(i as i64)));
    }
}

#[tokio::test]
async fn test_scope_shadows_thread_slot() {
    let _guard = begin(FlowContext::with_correlation_id("thread"));

    let inside = context::scope(None, async { current_correlation_id() }).await;
    assert_eq!(inside, None);
    assert_eq!(current_correlation_id().as_deref(), Some("thread"));
}

#[tokio::test]
async fn test_lazy_context_in_raw_task_is_not_shared() {
    tokio::spawn(async {
        set_context_value("user", "alice");
        assert_eq!(get_context_value("user"), Some(Value::from("alice")));
    })
    .await
    .unwrap();

    let (value, cid) = tokio::spawn(async {
        (get_context_value("user"), current_correlation_id())
    })
    .await
    .unwrap();

    assert_eq!(value, None);
    assert_eq!(cid, None);
}

#[tokio::test]
async fn test_block_on_body_context_hidden_from_raw_tasks() {
    set_context_value("owner", "main");

    let seen = tokio::spawn(async { get_context_value("owner") })
        .await
        .unwrap();

    assert_eq!(seen, None);
    assert_eq!(get_context_value("owner"), Some(Value::from("main")));
    end();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lazy_context_follows_raw_task_across_awaits() {
    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            tokio::spawn(async move {
                set_context_value("index", i);
                let cid = current_correlation_id();
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                }
                let after = (current_correlation_id(), get_context_value("index"));
                end();
                (cid, after, current_context().is_none())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (cid, (cid_after, index), cleared) = handle.await.unwrap();
        assert!(cid.is_some());
        assert_eq!(cid, cid_after);
        assert_eq!(index, Some(Value::Integer(i as i64)));
        assert!(cleared);
    }
}

#[tokio::test]
async fn test_guard_in_raw_task_releases_entry() {
    let cid = tokio::spawn(async {
        {
            let _guard = begin(FlowContext::with_correlation_id("raw"));
            assert_eq!(current_correlation_id().as_deref(), Some("raw"));
        }
        current_correlation_id()
    })
    .await
    .unwrap();

    assert_eq!(cid, None);
}
