//! Pluggable, deterministic transform chains (spec.md §4.F "Transforms are
//! pluggable, must be deterministic, and declare `CanTransform`"; §9 "Dynamic
//! plugin chains").

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use thiserror::Error;

use super::types::Gvr;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("registering transform {0:?} would introduce a cyclic dependency")]
    CyclicDependency(String),
    #[error("transform {0:?} failed: {1}")]
    Failed(String, String),
}

/// One deterministic field transformation applied while syncing in one
/// direction. `depends_on` lists transform names that must run first in the
/// chain (spec.md §9 "registry mapping a kind token to a capability-conforming
/// handler... cyclic plugin dependencies must fail registration").
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this transform applies to the given resource coordinate.
    fn can_transform(&self, gvr: &Gvr) -> bool;

    fn depends_on(&self) -> &[&str] {
        &[]
    }

    /// Applies the forward (source→target) direction of this transform.
    fn apply(&self, value: Value) -> Result<Value, TransformError>;

    /// Applies the inverse (target→source) direction. The default no-op
    /// satisfies the roundtrip law for transforms that do not declare fields
    /// as transformed in the reverse direction (spec.md §8 "Transform
    /// roundtrip").
    fn invert(&self, value: Value) -> Result<Value, TransformError> {
        Ok(value)
    }
}

/// Registry of transforms for one `Gvr`, ordered by dependency (spec.md §9).
pub struct TransformChain {
    transforms: Vec<Arc<dyn Transform>>,
}

impl Default for TransformChain {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformChain {
    #[must_use]
    pub fn new() -> Self {
        Self { transforms: Vec::new() }
    }

    /// Registers a transform and re-validates the dependency graph for cycles.
    pub fn register(&mut self, transform: Arc<dyn Transform>) -> Result<(), TransformError> {
        self.transforms.push(transform);
        if let Err(name) = self.topological_order() {
            self.transforms.pop();
            return Err(TransformError::CyclicDependency(name));
        }
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<usize>, String> {
        let index_of: HashMap<&str, usize> =
            self.transforms.iter().enumerate().map(|(i, t)| (t.name(), i)).collect();
        let mut graph = DiGraphMap::<usize, ()>::new();
        for i in 0..self.transforms.len() {
            graph.add_node(i);
        }
        for (i, transform) in self.transforms.iter().enumerate() {
            for dep in transform.depends_on() {
                if let Some(&j) = index_of.get(dep) {
                    graph.add_edge(j, i, ());
                }
            }
        }
        if is_cyclic_directed(&graph) {
            return Err(self.transforms.last().map(|t| t.name().to_string()).unwrap_or_default());
        }
        petgraph::algo::toposort(&graph, None).map_err(|_| "cycle".to_string())
    }

    /// Runs the chain source→target order for transforms matching `gvr`.
    pub fn apply_up_to_down(&self, gvr: &Gvr, mut value: Value) -> Result<Value, TransformError> {
        let order = self.topological_order().map_err(TransformError::CyclicDependency)?;
        for idx in order {
            let t = &self.transforms[idx];
            if t.can_transform(gvr) {
                value = t.apply(value)?;
            }
        }
        Ok(value)
    }

    /// Runs the chain in reverse (target→source) order for transforms matching
    /// `gvr` (spec.md §4.F "`DownToUp` carries status upward through the reverse
    /// chain").
    pub fn apply_down_to_up(&self, gvr: &Gvr, mut value: Value) -> Result<Value, TransformError> {
        let mut order = self.topological_order().map_err(TransformError::CyclicDependency)?;
        order.reverse();
        for idx in order {
            let t = &self.transforms[idx];
            if t.can_transform(gvr) {
                value = t.invert(value)?;
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;
    impl Transform for Uppercase {
        fn name(&self) -> &'static str {
            "uppercase"
        }
        fn can_transform(&self, _gvr: &Gvr) -> bool {
            true
        }
        fn apply(&self, value: Value) -> Result<Value, TransformError> {
            Ok(match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            })
        }
        fn invert(&self, value: Value) -> Result<Value, TransformError> {
            Ok(match value {
                Value::String(s) => Value::String(s.to_lowercase()),
                other => other,
            })
        }
    }

    struct CyclicA;
    impl Transform for CyclicA {
        fn name(&self) -> &'static str {
            "a"
        }
        fn can_transform(&self, _gvr: &Gvr) -> bool {
            true
        }
        fn depends_on(&self) -> &[&str] {
            &["b"]
        }
        fn apply(&self, value: Value) -> Result<Value, TransformError> {
            Ok(value)
        }
    }

    struct CyclicB;
    impl Transform for CyclicB {
        fn name(&self) -> &'static str {
            "b"
        }
        fn can_transform(&self, _gvr: &Gvr) -> bool {
            true
        }
        fn depends_on(&self) -> &[&str] {
            &["a"]
        }
        fn apply(&self, value: Value) -> Result<Value, TransformError> {
            Ok(value)
        }
    }

    fn gvr() -> Gvr {
        Gvr { group: String::new(), version: "v1".into(), resource: "workloads".into() }
    }

    #[test]
    fn roundtrip_law_up_then_down_is_identity() {
        let mut chain = TransformChain::new();
        chain.register(Arc::new(Uppercase)).unwrap();
        let original = Value::String("hello".into());
        let up = chain.apply_up_to_down(&gvr(), original.clone()).unwrap();
        let down = chain.apply_down_to_up(&gvr(), up).unwrap();
        assert_eq!(down, original);
    }

    #[test]
    fn cyclic_dependency_is_rejected_at_registration() {
        let mut chain = TransformChain::new();
        chain.register(Arc::new(CyclicA)).unwrap();
        let err = chain.register(Arc::new(CyclicB));
        assert!(err.is_err());
    }
}
