//! Strategy registry.
//!
//! Every pluggable capability (discovery, load balancing, retry, tolerance)
//! is resolved by key through a [`StrategyRegistry`]. Factories are
//! registered up front; the first lookup of a key constructs the instance and
//! every later lookup returns the same `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;
use trible_common::{Result, TribleError};

use crate::config::{keys, RpcConfig};
use crate::discovery::{Discovery, LocalDiscovery, RegistryClient, RegistryDiscovery};
use crate::load_balancer::{
    ConsistentHashLoadBalancer, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer,
};
use crate::retry::{
    ExponentialBackoffRetry, FixedCountRetry, FixedIntervalRetry, NoRetry, RetryStrategy,
};
use crate::tolerant::{FailBack, FailFast, FailOver, Silent, TolerantStrategy};

/// Kind of strategy a registry resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Discovery,
    LoadBalancer,
    Retry,
    Tolerant,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Discovery => "discovery",
            Capability::LoadBalancer => "load balancer",
            Capability::Retry => "retry",
            Capability::Tolerant => "tolerant",
        };
        f.write_str(name)
    }
}

/// Builds a strategy instance from the configuration.
pub type Factory<T> = Box<dyn Fn(&RpcConfig) -> Result<Arc<T>> + Send + Sync>;

/// Key to singleton resolver for one capability.
///
/// Keys are case-insensitive. Concurrent first lookups of the same key
/// construct exactly one instance.
pub struct StrategyRegistry<T: ?Sized> {
    capability: Capability,
    factories: HashMap<String, Factory<T>>,
    instances: RwLock<HashMap<String, Arc<T>>>,
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

impl<T: ?Sized> StrategyRegistry<T> {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            factories: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Registers `factory` under `key`, replacing any previous registration
    /// and discarding an instance already built for it.
    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&RpcConfig) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let key = normalize(key);
        self.instances
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.factories.insert(key, Box::new(factory));
    }

    /// Registers a prebuilt instance under `key`.
    pub fn register_instance(&mut self, key: &str, instance: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        self.register(key, move |_| Ok(Arc::clone(&instance)));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(&normalize(key))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the instance for `key`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// - `Configuration` if nothing is registered under `key`
    /// - whatever the factory reports if construction fails; nothing is
    ///   cached in that case
    pub fn get(&self, key: &str, config: &RpcConfig) -> Result<Arc<T>> {
        let key = normalize(key);

        if let Some(instance) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(instance));
        }

        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| TribleError::Configuration {
                capability: self.capability.to_string(),
                key: key.clone(),
            })?;

        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = instances.get(&key) {
            return Ok(Arc::clone(instance));
        }

        let instance = factory(config)?;
        debug!(capability = %self.capability, key = %key, "Created strategy instance");
        instances.insert(key, Arc::clone(&instance));
        Ok(instance)
    }
}

/// The four capability registries, bound to one configuration.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trible_client::{keys, LocalDiscovery, RpcConfig, Strategies};
/// use trible_common::ServiceInstance;
///
/// let local = Arc::new(LocalDiscovery::new());
/// local.register(ServiceInstance::new("Calculator", "127.0.0.1", 9000));
///
/// let mut strategies = Strategies::with_defaults(Arc::new(RpcConfig::default()));
/// strategies.register_discovery_instance(keys::LOCAL, local);
/// strategies.validate().unwrap();
/// ```
pub struct Strategies {
    config: Arc<RpcConfig>,
    discovery: StrategyRegistry<dyn Discovery>,
    balancers: StrategyRegistry<dyn LoadBalancer>,
    retries: StrategyRegistry<dyn RetryStrategy>,
    tolerants: StrategyRegistry<dyn TolerantStrategy>,
}

impl Strategies {
    /// Registries with nothing registered.
    pub fn empty(config: Arc<RpcConfig>) -> Self {
        Self {
            config,
            discovery: StrategyRegistry::new(Capability::Discovery),
            balancers: StrategyRegistry::new(Capability::LoadBalancer),
            retries: StrategyRegistry::new(Capability::Retry),
            tolerants: StrategyRegistry::new(Capability::Tolerant),
        }
    }

    /// Registries holding every built-in strategy.
    pub fn with_defaults(config: Arc<RpcConfig>) -> Self {
        let mut strategies = Self::empty(config);

        strategies.register_discovery(keys::LOCAL, |config| {
            Ok(Arc::new(LocalDiscovery::from_address(&config.registry.address)?))
        });

        strategies.register_load_balancer(keys::RANDOM, |_| Ok(Arc::new(RandomLoadBalancer::new())));
        strategies.register_load_balancer(keys::ROUND_ROBIN, |_| {
            Ok(Arc::new(RoundRobinLoadBalancer::new()))
        });
        strategies.register_load_balancer(keys::CONSISTENT_HASH, |_| {
            Ok(Arc::new(ConsistentHashLoadBalancer::new()))
        });

        strategies.register_retry(keys::NO_RETRY, |_| Ok(Arc::new(NoRetry)));
        strategies.register_retry(keys::FIXED_COUNT, |config| {
            Ok(Arc::new(FixedCountRetry::new(config.retry.max_attempts)))
        });
        strategies.register_retry(keys::FIXED_INTERVAL, |config| {
            Ok(Arc::new(FixedIntervalRetry::new(
                config.retry.max_attempts,
                Duration::from_millis(config.retry.interval_ms),
            )))
        });
        strategies.register_retry(keys::EXPONENTIAL_BACKOFF, |config| {
            let retry = &config.retry;
            Ok(Arc::new(
                ExponentialBackoffRetry::new(
                    retry.max_attempts,
                    Duration::from_millis(retry.interval_ms),
                    Duration::from_millis(retry.max_interval_ms),
                )
                .with_jitter(retry.jitter),
            ))
        });

        strategies.register_tolerant(keys::FAIL_FAST, |_| Ok(Arc::new(FailFast)));
        strategies.register_tolerant(keys::SILENT, |_| Ok(Arc::new(Silent)));
        strategies.register_tolerant(keys::FAIL_OVER, |config| {
            Ok(Arc::new(FailOver::new(config.tolerant.max_failover)))
        });
        strategies.register_tolerant(keys::FAIL_BACK, |config| {
            let fallback = config.tolerant.fallback.clone().ok_or_else(|| {
                TribleError::InvalidConfig(
                    "tolerant.fallback is required for FAIL_BACK".to_string(),
                )
            })?;
            Ok(Arc::new(FailBack::new(fallback)))
        });

        strategies
    }

    pub fn config(&self) -> &Arc<RpcConfig> {
        &self.config
    }

    pub fn register_discovery<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&RpcConfig) -> Result<Arc<dyn Discovery>> + Send + Sync + 'static,
    {
        self.discovery.register(key, factory);
    }

    pub fn register_discovery_instance(&mut self, key: &str, instance: Arc<dyn Discovery>) {
        self.discovery.register_instance(key, instance);
    }

    /// Registers discovery backed by `client` under `key`, typically
    /// [`keys::ZOOKEEPER`] or [`keys::ETCD`].
    ///
    /// Lookups are bounded by `registry.timeout_ms`. A non-empty
    /// `registry.address` replaces the default root path.
    pub fn register_registry_client(&mut self, key: &str, client: Arc<dyn RegistryClient>) {
        self.register_discovery(key, move |config| {
            let mut discovery = RegistryDiscovery::new(Arc::clone(&client), config.registry_timeout());
            let root = config.registry.address.trim();
            if !root.is_empty() {
                discovery = discovery.with_root(root);
            }
            Ok(Arc::new(discovery))
        });
    }

    pub fn register_load_balancer<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&RpcConfig) -> Result<Arc<dyn LoadBalancer>> + Send + Sync + 'static,
    {
        self.balancers.register(key, factory);
    }

    pub fn register_load_balancer_instance(&mut self, key: &str, instance: Arc<dyn LoadBalancer>) {
        self.balancers.register_instance(key, instance);
    }

    pub fn register_retry<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&RpcConfig) -> Result<Arc<dyn RetryStrategy>> + Send + Sync + 'static,
    {
        self.retries.register(key, factory);
    }

    pub fn register_tolerant<F>(&mut self, key: &str, factory: F)
    where
        F: Fn(&RpcConfig) -> Result<Arc<dyn TolerantStrategy>> + Send + Sync + 'static,
    {
        self.tolerants.register(key, factory);
    }

    /// The discovery selected by `registry.type`.
    pub fn discovery(&self) -> Result<Arc<dyn Discovery>> {
        self.discovery.get(&self.config.registry.kind, &self.config)
    }

    /// The balancer selected by `balancer`.
    pub fn load_balancer(&self) -> Result<Arc<dyn LoadBalancer>> {
        self.balancers.get(&self.config.balancer, &self.config)
    }

    /// The retry strategy selected by `retry.type`.
    pub fn retry_strategy(&self) -> Result<Arc<dyn RetryStrategy>> {
        self.retries.get(&self.config.retry.kind, &self.config)
    }

    /// The tolerant strategy selected by `tolerant.type`.
    pub fn tolerant_strategy(&self) -> Result<Arc<dyn TolerantStrategy>> {
        self.tolerants.get(&self.config.tolerant.kind, &self.config)
    }

    /// Resolves every configured key, so misconfiguration is reported before
    /// the first call.
    pub fn validate(&self) -> Result<()> {
        self.discovery()?;
        self.load_balancer()?;
        self.retry_strategy()?;
        self.tolerant_strategy()?;
        Ok(())
    }
}
