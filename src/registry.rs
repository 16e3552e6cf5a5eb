//! Cache Registry
//!
//! Process-wide set of named cache instances with an explicit lifetime.
//! Callers look instances up by name; one instance can be designated the
//! default for the `cached_*` convenience calls.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::cache::{Cache, CacheStats, CacheValue, KeyPattern};
use crate::config::{CacheConfig, RegistryConfig};
use crate::error::{CacheError, Result};
use crate::persistence::{FileSnapshotBackend, PersistenceOptions, SnapshotBackend};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-independent view of a registered instance.
trait ManagedCache: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool>;
    fn invalidate<'a>(&'a self, pattern: &'a KeyPattern) -> BoxFuture<'a, usize>;
    fn stats(&self) -> BoxFuture<'_, CacheStats>;
    fn destroy(&self) -> BoxFuture<'_, ()>;
}

impl<V: CacheValue> ManagedCache for Cache<V> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(Cache::delete(self, key))
    }

    fn invalidate<'a>(&'a self, pattern: &'a KeyPattern) -> BoxFuture<'a, usize> {
        Box::pin(self.invalidate_pattern(pattern))
    }

    fn stats(&self) -> BoxFuture<'_, CacheStats> {
        Box::pin(Cache::stats(self))
    }

    fn destroy(&self) -> BoxFuture<'_, ()> {
        Box::pin(Cache::destroy(self))
    }
}

// == Cache Registry ==
/// Owns every named instance of a process.
pub struct CacheRegistry {
    config: RegistryConfig,
    persistence: Option<PersistenceOptions>,
    instances: RwLock<HashMap<String, Arc<dyn ManagedCache>>>,
    default_name: RwLock<Option<String>>,
    creating: AsyncMutex<()>,
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("config", &self.config)
            .field("instances", &self.names())
            .field("default", &*self.default_name.read())
            .finish()
    }
}

impl CacheRegistry {
    // == Constructors ==
    /// Creates a registry, opening a file-backed medium when
    /// `config.persist_dir` is set.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let backend: Option<Arc<dyn SnapshotBackend>> = match &config.persist_dir {
            Some(dir) => Some(Arc::new(FileSnapshotBackend::open(dir)?)),
            None => None,
        };
        Ok(Self::build(config, backend))
    }

    /// Creates a registry persisting through `backend`, ignoring
    /// `config.persist_dir`.
    pub fn with_backend(config: RegistryConfig, backend: Arc<dyn SnapshotBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    fn build(config: RegistryConfig, backend: Option<Arc<dyn SnapshotBackend>>) -> Self {
        let persistence = backend.map(|backend| {
            PersistenceOptions::new(backend)
                .with_write_timeout(config.write_timeout)
                .with_max_pending_writes(config.max_pending_writes)
        });
        Self {
            config,
            persistence,
            instances: RwLock::new(HashMap::new()),
            default_name: RwLock::new(None),
            creating: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn has_durable_medium(&self) -> bool {
        self.persistence.is_some()
    }

    // == Create ==
    /// Opens and registers a new instance under `config.namespace`.
    ///
    /// # Errors
    /// `NamespaceExists` if the name is taken, plus any error from
    /// `Cache::open`.
    pub async fn create<V: CacheValue>(&self, config: CacheConfig) -> Result<Cache<V>> {
        let _creating = self.creating.lock().await;
        if self.instances.read().contains_key(&config.namespace) {
            return Err(CacheError::NamespaceExists(config.namespace));
        }
        self.open_and_register(config).await
    }

    /// Returns the registered instance for `config.namespace`, opening it
    /// with `config` if there is none yet.
    pub async fn get_or_create<V: CacheValue>(&self, config: CacheConfig) -> Result<Cache<V>> {
        let _creating = self.creating.lock().await;
        if self.instances.read().contains_key(&config.namespace) {
            return self.instance(&config.namespace);
        }
        self.open_and_register(config).await
    }

    async fn open_and_register<V: CacheValue>(&self, config: CacheConfig) -> Result<Cache<V>> {
        let name = config.namespace.clone();
        let cache = Cache::<V>::open(config, self.persistence.clone()).await?;
        self.instances
            .write()
            .insert(name, Arc::new(cache.clone()));
        Ok(cache)
    }

    /// Opens the `general`, `user` and `api` instances holding JSON values,
    /// using the registry's sweep interval, and makes `general` the default.
    pub async fn open_standard_instances(&self) -> Result<()> {
        for config in [CacheConfig::general(), CacheConfig::user(), CacheConfig::api()] {
            let config = config.with_sweep_interval(self.config.sweep_interval);
            self.get_or_create::<serde_json::Value>(config).await?;
        }
        self.set_default("general")
    }

    // == Lookup ==
    /// Returns the instance registered as `name`.
    ///
    /// # Errors
    /// `UnknownInstance` if nothing is registered under `name`,
    /// `TypeMismatch` if it holds a different value type.
    pub fn instance<V: CacheValue>(&self, name: &str) -> Result<Cache<V>> {
        let instances = self.instances.read();
        let managed = instances
            .get(name)
            .ok_or_else(|| CacheError::UnknownInstance(name.to_string()))?;
        managed
            .as_any()
            .downcast_ref::<Cache<V>>()
            .cloned()
            .ok_or_else(|| CacheError::TypeMismatch(name.to_string()))
    }

    /// Registered instance names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().keys().cloned().collect();
        names.sort();
        names
    }

    // == Default Instance ==
    pub fn set_default(&self, name: &str) -> Result<()> {
        if !self.instances.read().contains_key(name) {
            return Err(CacheError::UnknownInstance(name.to_string()));
        }
        *self.default_name.write() = Some(name.to_string());
        Ok(())
    }

    pub fn default_instance<V: CacheValue>(&self) -> Result<Cache<V>> {
        let name = self.resolve(None)?;
        self.instance(&name)
    }

    fn resolve(&self, instance: Option<&str>) -> Result<String> {
        match instance {
            Some(name) => Ok(name.to_string()),
            None => self
                .default_name
                .read()
                .clone()
                .ok_or_else(|| CacheError::UnknownInstance("<default>".to_string())),
        }
    }

    fn managed(&self, instance: Option<&str>) -> Result<Arc<dyn ManagedCache>> {
        let name = self.resolve(instance)?;
        self.instances
            .read()
            .get(&name)
            .cloned()
            .ok_or(CacheError::UnknownInstance(name))
    }

    // == Convenience Operations ==
    /// `get` against `instance`, or the default instance when None.
    pub async fn cached_get<V: CacheValue>(&self, key: &str, instance: Option<&str>) -> Result<Option<V>> {
        let cache = self.instance::<V>(&self.resolve(instance)?)?;
        Ok(cache.get(key).await)
    }

    /// `set` against `instance`, or the default instance when None.
    pub async fn cached_set<V: CacheValue>(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        instance: Option<&str>,
    ) -> Result<()> {
        let cache = self.instance::<V>(&self.resolve(instance)?)?;
        cache.set(key, value, ttl).await
    }

    /// `delete` against `instance`, or the default instance when None.
    pub async fn cached_delete(&self, key: &str, instance: Option<&str>) -> Result<bool> {
        let managed = self.managed(instance)?;
        Ok(managed.delete(key).await)
    }

    /// `invalidate_pattern` against `instance`, or the default instance
    /// when None.
    pub async fn invalidate(&self, pattern: &KeyPattern, instance: Option<&str>) -> Result<usize> {
        let managed = self.managed(instance)?;
        Ok(managed.invalidate(pattern).await)
    }

    /// Statistics of every instance, sorted by name.
    pub async fn stats_all(&self) -> Vec<(String, CacheStats)> {
        let mut instances: Vec<(String, Arc<dyn ManagedCache>)> = self
            .instances
            .read()
            .iter()
            .map(|(name, managed)| (name.clone(), Arc::clone(managed)))
            .collect();
        instances.sort_by(|a, b| a.0.cmp(&b.0));

        let mut all = Vec::with_capacity(instances.len());
        for (name, managed) in instances {
            all.push((name, managed.stats().await));
        }
        all
    }

    // == Destroy ==
    /// Destroys and unregisters every instance. Safe to call more than once.
    pub async fn destroy_all(&self) {
        let drained: Vec<(String, Arc<dyn ManagedCache>)> =
            self.instances.write().drain().collect();
        *self.default_name.write() = None;

        let count = drained.len();
        for (_, managed) in drained {
            managed.destroy().await;
        }
        if count > 0 {
            info!(count, "Cache registry destroyed");
        }
    }
}

// == Global Registry ==
static GLOBAL: OnceLock<CacheRegistry> = OnceLock::new();

/// Initializes the process-wide registry. The first successful call wins;
/// later calls return the existing registry and ignore their config.
pub fn init_global(config: RegistryConfig) -> Result<&'static CacheRegistry> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }
    let registry = CacheRegistry::new(config)?;
    Ok(GLOBAL.get_or_init(|| registry))
}

/// The process-wide registry, if `init_global` has run.
pub fn global() -> Option<&'static CacheRegistry> {
    GLOBAL.get()
}
