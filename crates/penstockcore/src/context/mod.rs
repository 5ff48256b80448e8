// crates/penstockcore/src/context/mod.rs

mod flow_context;
mod slot;

pub use flow_context::FlowContext;
pub use slot::{
    attach, begin, current_context, current_correlation_id, delete_context_value, end,
    get_context_value, get_context_value_or, get_or_create_context, scope, set_context_value,
    spawn, spawn_forked, spawn_thread, ContextGuard,
};
