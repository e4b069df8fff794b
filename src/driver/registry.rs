//! Backend registry: `database_type` name -> driver factory
//!
//! New backends are added with `register` without touching this file.
//! Registration normally happens once at startup; lookups take a shared lock,
//! so a registration racing with lookups is safe but not expected.
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::RegistryError;
use super::http::HttpDriverFactory;
use super::mock::{MockBackend, MockFactory};
use super::DriverFactory;

pub struct DriverRegistry {
    factories: RwLock<HashMap<String, Arc<dyn DriverFactory>>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

impl DriverRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        DriverRegistry {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// `neo4j-http`/`http`, `mock`, and with the `bolt` feature `neo4j`/`memgraph`
    pub fn with_builtin_drivers() -> Self {
        let mut factories: HashMap<String, Arc<dyn DriverFactory>> = HashMap::new();
        let http: Arc<dyn DriverFactory> = Arc::new(HttpDriverFactory);
        factories.insert("neo4j-http".to_string(), http.clone());
        factories.insert("http".to_string(), http);
        factories.insert(
            "mock".to_string(),
            Arc::new(MockFactory::new(MockBackend::new())),
        );

        #[cfg(feature = "bolt")]
        {
            use super::bolt::BoltDriverFactory;
            factories.insert(
                "neo4j".to_string(),
                Arc::new(BoltDriverFactory::new("neo4j")),
            );
            factories.insert(
                "memgraph".to_string(),
                Arc::new(BoltDriverFactory::new("memgraph")),
            );
        }

        DriverRegistry {
            factories: RwLock::new(factories),
        }
    }

    fn normalize(name: &str) -> String {
        name.trim().to_lowercase().replace('_', "-")
    }

    /// Add a backend; names are case-insensitive and must be unique
    pub fn register(&self, name: &str, factory: Arc<dyn DriverFactory>) -> Result<(), RegistryError> {
        let key = Self::normalize(name);
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&key) {
            return Err(RegistryError::DuplicateBackend(key));
        }
        log::info!("Registered graph backend '{}'", key);
        factories.insert(key, factory);
        Ok(())
    }

    /// Add or swap a backend, returning the previous factory
    pub fn replace(&self, name: &str, factory: Arc<dyn DriverFactory>) -> Option<Arc<dyn DriverFactory>> {
        let key = Self::normalize(name);
        log::info!("Replacing graph backend '{}'", key);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, factory)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DriverFactory>, RegistryError> {
        let key = Self::normalize(name);
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.get(&key).cloned().ok_or_else(|| {
            let mut available: Vec<&str> = factories.keys().map(String::as_str).collect();
            available.sort_unstable();
            RegistryError::UnknownBackend {
                name: name.to_string(),
                available: available.join(", "),
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&Self::normalize(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: DriverRegistry = DriverRegistry::with_builtin_drivers();
}

/// Process-wide registry used when a mapper is built from configuration alone
pub fn global_registry() -> &'static DriverRegistry {
    &GLOBAL_REGISTRY
}
