use crate::{NotFoundError, Value};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Per-execution state: a correlation id plus mutable metadata.
///
/// The correlation id and start time never change after construction. Metadata sits
/// behind a lock so a context shared between concurrent branches (see
/// [`spawn`](crate::context::spawn)) stays consistent; readers only ever
/// receive copies, never the live map.
pub struct FlowContext {
    correlation_id: String,
    started_at: DateTime<Utc>,
    metadata: RwLock<HashMap<String, Value>>,
}

impl FlowContext {
    /// New context with a random 128-bit correlation id rendered as 32
    /// lowercase hex characters.
    pub fn new() -> Self {
        Self::with_correlation_id(Uuid::new_v4().simple().to_string())
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            started_at: Utc::now(),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// When the logical execution began. Forks keep the original time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Independent copy of the metadata.
    pub fn metadata(&self) -> HashMap<String, Value> {
        self.metadata.read().clone()
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.metadata.read().get(key).cloned()
    }

    pub fn get_value_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get_value(key).unwrap_or_else(|| default.into())
    }

    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Remove `key`, returning the value it held.
    pub fn delete_value(&self, key: &str) -> Result<Value, NotFoundError> {
        self.metadata
            .write()
            .remove(key)
            .ok_or_else(|| NotFoundError::ContextKey(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.metadata.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.metadata.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.read().is_empty()
    }

    /// Same correlation id, deep copy of the metadata. Mutations on either
    /// side after the fork are invisible to the other.
    pub fn fork(&self) -> FlowContext {
        Self {
            correlation_id: self.correlation_id.clone(),
            started_at: self.started_at,
            metadata: RwLock::new(self.metadata()),
        }
    }
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext")
            .field("correlation_id", &self.correlation_id)
            .field("started_at", &self.started_at)
            .field("metadata", &*self.metadata.read())
            .finish()
    }
}
