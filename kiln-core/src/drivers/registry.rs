//! Registry of driver factories.
//!
//! The registry is an explicit value built at startup. It resolves backends by
//! name and picks a default backend for the ambient engine endpoint.

use crate::drivers::{DriverFactory, EngineEndpoint, EngineFactory, ProcessFactory};
use crate::error::{KilnError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Name-keyed set of driver factories.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in backends.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EngineFactory));
        registry.register(Arc::new(ProcessFactory));
        registry
    }

    /// Register a factory, replacing any factory of the same name.
    pub fn register(&mut self, factory: Arc<dyn DriverFactory>) {
        debug!(driver = factory.name(), "Registered driver factory");
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// Look up a factory by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn DriverFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| KilnError::DriverNotFound { name: name.to_string() })
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Pick the factory with the lowest priority for `api`.
    ///
    /// With `instance_required`, backends that do not allow named instances are
    /// skipped. Ties go to the first name in sort order.
    #[instrument(skip(self, api))]
    pub async fn default_factory(
        &self,
        api: Option<&EngineEndpoint>,
        instance_required: bool,
    ) -> Result<Arc<dyn DriverFactory>> {
        let mut best: Option<(i32, &Arc<dyn DriverFactory>)> = None;
        for factory in self.factories.values() {
            if instance_required && !factory.allows_instances() {
                continue;
            }
            let priority = factory.priority(api).await;
            debug!(driver = factory.name(), priority, "Driver priority");
            if best.map_or(true, |(p, _)| priority < p) {
                best = Some((priority, factory));
            }
        }

        best.map(|(_, f)| f.clone()).ok_or_else(|| KilnError::DriverNotFound {
            name: "default".to_string(),
        })
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry").field("drivers", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{Driver, InitConfig};
    use async_trait::async_trait;

    struct FixedFactory {
        name: &'static str,
        priority: i32,
        instances: bool,
    }

    #[async_trait]
    impl DriverFactory for FixedFactory {
        fn name(&self) -> &str {
            self.name
        }

        fn usage(&self) -> &str {
            "fixed"
        }

        async fn priority(&self, _api: Option<&EngineEndpoint>) -> i32 {
            self.priority
        }

        fn new_driver(&self, _cfg: InitConfig) -> Result<Arc<dyn Driver>> {
            Err(KilnError::Internal("not buildable".to_string()))
        }

        fn allows_instances(&self) -> bool {
            self.instances
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = DriverRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["engine", "process"]);
        assert!(registry.get("engine").is_ok());
        assert!(matches!(
            registry.get("kubernetes"),
            Err(KilnError::DriverNotFound { .. })
        ));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(FixedFactory { name: "a", priority: 5, instances: true }));
        registry.register(Arc::new(FixedFactory { name: "a", priority: 1, instances: true }));
        assert_eq!(registry.names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_default_factory_picks_lowest_priority() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(FixedFactory { name: "slow", priority: 50, instances: true }));
        registry.register(Arc::new(FixedFactory { name: "fast", priority: 10, instances: false }));
        registry.register(Arc::new(FixedFactory { name: "mid", priority: 30, instances: true }));

        let f = registry.default_factory(None, false).await.unwrap();
        assert_eq!(f.name(), "fast");

        let f = registry.default_factory(None, true).await.unwrap();
        assert_eq!(f.name(), "mid");
    }

    #[tokio::test]
    async fn test_default_factory_empty_registry() {
        let registry = DriverRegistry::new();
        let err = registry.default_factory(None, false).await.err().unwrap();
        assert!(matches!(err, KilnError::DriverNotFound { .. }));
    }

    #[tokio::test]
    async fn test_builtin_default_without_engine() {
        // no reachable engine: the process backend wins
        let registry = DriverRegistry::with_builtin();
        let f = registry.default_factory(None, false).await.unwrap();
        assert_eq!(f.name(), "process");
    }
}
