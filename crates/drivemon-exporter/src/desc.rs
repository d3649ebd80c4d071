//! Metric identity and observation model
//!
//! Descriptors give every metric family a stable identity (name, help,
//! label schema) that survives across scrape cycles; observations are
//! the ephemeral values produced on each collect. The registry keeps
//! one descriptor per name for the lifetime of the process.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// How a metric value behaves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Instantaneous state; may move in either direction.
    Gauge,
    /// Monotonically increasing accumulator.
    Counter,
}

impl MetricKind {
    /// Exposition-format type keyword.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

/// Immutable identity of a metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: String,
    pub help: String,
    /// Ordered label names; observations must supply values in the
    /// same order and arity.
    pub labels: Vec<String>,
}

impl MetricDesc {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: &str, help: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
        }
    }
}

/// One sampled value, produced fresh each collection cycle.
#[derive(Debug, Clone)]
pub struct Observation {
    pub desc: Arc<MetricDesc>,
    pub kind: MetricKind,
    pub value: f64,
    /// Label values matching the descriptor's label names in order.
    pub label_values: Vec<String>,
}

impl Observation {
    /// Whether the supplied label values match the descriptor schema.
    #[must_use]
    pub fn label_arity_matches(&self) -> bool {
        self.label_values.len() == self.desc.labels.len()
    }
}

/// Append-only name-to-descriptor map, shared within a protocol scope.
///
/// Descriptors are added, never removed or mutated, while the process
/// runs. Callers must not change a name's help or label schema across
/// registrations; the first registration wins.
#[derive(Debug, Default)]
pub struct Registry {
    descs: Mutex<HashMap<String, Arc<MetricDesc>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, or return the one already held for this
    /// name. Idempotent: a second call with the same name returns the
    /// first-created descriptor without looking at `help`/`labels`.
    pub fn register(&self, name: &str, help: &str, labels: &[&str]) -> Arc<MetricDesc> {
        let mut descs = self.descs.lock();
        if let Some(existing) = descs.get(name) {
            return Arc::clone(existing);
        }
        let desc = Arc::new(MetricDesc::new(name, help, labels));
        descs.insert(name.to_string(), Arc::clone(&desc));
        desc
    }

    /// Look up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MetricDesc>> {
        self.descs.lock().get(name).map(Arc::clone)
    }

    /// Every descriptor currently registered.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<MetricDesc>> {
        self.descs.lock().values().map(Arc::clone).collect()
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descs.lock().len()
    }

    /// Whether the registry holds no descriptors yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_new_name() {
        let registry = Registry::new();
        let desc = registry.register("smart_sata_Power_On_Hours", "09", &["dev"]);
        assert_eq!(desc.name, "smart_sata_Power_On_Hours");
        assert_eq!(desc.help, "09");
        assert_eq!(desc.labels, vec!["dev"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register("smart_sata_Power_On_Hours", "09", &["dev"]);
        // Different help/labels on a repeat registration are ignored;
        // the first-created descriptor is returned as-is.
        let second = registry.register("smart_sata_Power_On_Hours", "other", &["dev", "x"]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.help, "09");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_grows_monotonically() {
        let registry = Registry::new();
        registry.register("a", "", &["dev"]);
        registry.register("b", "", &["dev"]);
        registry.register("a", "", &["dev"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_observation_arity() {
        let desc = Arc::new(MetricDesc::new("m", "", &["dev", "index"]));
        let ok = Observation {
            desc: Arc::clone(&desc),
            kind: MetricKind::Gauge,
            value: 1.0,
            label_values: vec!["sda".into(), "0".into()],
        };
        assert!(ok.label_arity_matches());

        let bad = Observation {
            desc,
            kind: MetricKind::Gauge,
            value: 1.0,
            label_values: vec!["sda".into()],
        };
        assert!(!bad.label_arity_matches());
    }
}
