//! # Request Context
//!
//! An immutable, append-only association of typed keys to values.
//!
//! Attaching a value never mutates an existing context: it returns a new
//! context whose head points at the previous one. A holder of an older
//! context therefore never observes bindings added later by another branch.
//!
//! Every concern defines its own key type. Two keys only match when they
//! have the same Rust type *and* compare equal, so keys from different
//! concerns cannot collide even when their representations overlap.

use crate::error::MissingContextValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A key into a [`RequestContext`].
///
/// The associated `Value` fixes the type stored under the key, so lookups
/// are fully typed.
pub trait ContextKey: Any + Eq + fmt::Debug + Send + Sync {
    type Value: Send + Sync + 'static;

    /// Human readable name, used when the key is missing.
    fn name(&self) -> String {
        format!("{:?}", self)
    }
}

struct Binding {
    key: Box<dyn Any + Send + Sync>,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Binding>>,
}

/// Persistent linked list of context bindings.
#[derive(Clone, Default)]
pub struct RequestContext {
    head: Option<Arc<Binding>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context in which `key` resolves to `value`.
    pub fn attach<K: ContextKey>(&self, key: K, value: K::Value) -> Self {
        Self {
            head: Some(Arc::new(Binding {
                key: Box::new(key),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Returns the most recently attached value for `key`.
    pub fn lookup<K: ContextKey>(&self, key: &K) -> Result<&K::Value, MissingContextValue> {
        self.get(key)
            .ok_or_else(|| MissingContextValue::new(key.name()))
    }

    pub fn get<K: ContextKey>(&self, key: &K) -> Option<&K::Value> {
        let mut node = self.head.as_deref();
        while let Some(binding) = node {
            if let Some(bound) = binding.key.downcast_ref::<K>() {
                if bound == key {
                    return binding.value.downcast_ref::<K::Value>();
                }
            }
            node = binding.parent.as_deref();
        }
        None
    }

    pub fn contains<K: ContextKey>(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of bindings visible from this context, shadowed ones included.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut node = self.head.as_deref();
        while let Some(binding) = node {
            count += 1;
            node = binding.parent.as_deref();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("bindings", &self.len())
            .finish()
    }
}
