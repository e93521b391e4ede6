//! Shared signal map

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Name → textual value map shared between the broadcast listener and the
/// log writer
///
/// Sorted by name so log lines keep a stable column order.
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values.into_iter().collect())),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.write().insert(name.into(), value.into());
    }

    /// Copy of every entry, in name order
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
