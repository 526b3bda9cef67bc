//! Service discovery.
//!
//! A [`Discovery`] resolves a logical service name to its provider instances.
//! Two implementations are provided:
//!
//! - [`LocalDiscovery`]: an in-process registry, seeded from configuration
//!   and updated with [`LocalDiscovery::register`]
//! - [`RegistryDiscovery`]: an adapter over a coordination-service client
//!   that stores each instance as a JSON document under
//!   `{root}/{service_name}`

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use trible_common::{Result, ServiceInstance, TribleError};

/// Resolves a service name to candidate instances.
///
/// An empty list is a valid answer; the orchestrator turns it into
/// `NoProvider`. A backend that cannot be reached reports `Registry`.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;
}

/// In-process registry.
///
/// Instances are returned in registration order. Registering an instance
/// whose node key is already present replaces the old entry in place.
#[derive(Debug, Default)]
pub struct LocalDiscovery {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl LocalDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a comma-separated `service@host:port` list.
    ///
    /// # Example
    ///
    /// ```
    /// use trible_client::LocalDiscovery;
    ///
    /// let discovery = LocalDiscovery::from_address("Calculator@10.0.0.1:9000, Calculator@10.0.0.2:9000").unwrap();
    /// assert_eq!(discovery.instances("Calculator").len(), 2);
    /// ```
    pub fn from_address(address: &str) -> Result<Self> {
        let discovery = Self::new();
        for entry in address.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            discovery.register(parse_provider(entry)?);
        }
        Ok(discovery)
    }

    pub fn register(&self, instance: ServiceInstance) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let instances = services.entry(instance.service_name.clone()).or_default();

        let node_key = instance.node_key();
        match instances.iter_mut().find(|i| i.node_key() == node_key) {
            Some(existing) => *existing = instance,
            None => {
                debug!(instance = %instance, "Registered local provider");
                instances.push(instance);
            }
        }
    }

    /// Removes an instance. Returns `false` if it was not registered.
    pub fn unregister(&self, instance: &ServiceInstance) -> bool {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let Some(instances) = services.get_mut(&instance.service_name) else {
            return false;
        };

        let before = instances.len();
        let node_key = instance.node_key();
        instances.retain(|i| i.node_key() != node_key);
        let removed = instances.len() != before;

        if instances.is_empty() {
            services.remove(&instance.service_name);
        }
        removed
    }

    /// Snapshot of the instances registered for `service_name`.
    pub fn instances(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Discovery for LocalDiscovery {
    async fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self.instances(service_name))
    }
}

/// Parses a `service@host:port` provider entry.
pub fn parse_provider(entry: &str) -> Result<ServiceInstance> {
    let invalid = |reason: &str| {
        TribleError::InvalidConfig(format!(
            "invalid provider '{entry}': {reason} (expected service@host:port)"
        ))
    };

    let (service, address) = entry.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
    let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;

    if service.is_empty() || host.is_empty() {
        return Err(invalid("empty service or host"));
    }

    Ok(ServiceInstance::new(service, host, port))
}

/// Minimal view of a hierarchical coordination service (ZooKeeper, etcd).
///
/// `children` returns the data of every node directly below `path`.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn children(&self, path: &str) -> Result<Vec<Vec<u8>>>;
}

/// Default root under which services are registered.
pub const DEFAULT_REGISTRY_ROOT: &str = "/rpc";

/// Discovery backed by a [`RegistryClient`].
pub struct RegistryDiscovery {
    client: Arc<dyn RegistryClient>,
    root: String,
    timeout: Duration,
}

impl RegistryDiscovery {
    pub fn new(client: Arc<dyn RegistryClient>, timeout: Duration) -> Self {
        Self {
            client,
            root: DEFAULT_REGISTRY_ROOT.to_string(),
            timeout,
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into().trim_end_matches('/').to_string();
        self
    }

    pub fn service_path(&self, service_name: &str) -> String {
        format!("{}/{}", self.root, service_name)
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let path = self.service_path(service_name);

        let children = match tokio::time::timeout(self.timeout, self.client.children(&path)).await {
            Ok(Ok(children)) => children,
            Ok(Err(TribleError::Registry(msg))) => return Err(TribleError::Registry(msg)),
            Ok(Err(e)) => return Err(TribleError::Registry(format!("lookup of {path} failed: {e}"))),
            Err(_) => {
                return Err(TribleError::Registry(format!(
                    "lookup of {} timed out after {}ms",
                    path,
                    self.timeout.as_millis()
                )))
            }
        };

        let mut instances = Vec::with_capacity(children.len());
        for data in children {
            match serde_json::from_slice::<ServiceInstance>(&data) {
                Ok(instance) if instance.service_name == service_name => instances.push(instance),
                Ok(instance) => {
                    debug!(path = %path, found = %instance.service_name, "Ignoring entry for another service");
                }
                Err(e) => warn!("Skipping undecodable registry entry under {}: {}", path, e),
            }
        }

        debug!(service = service_name, count = instances.len(), "Discovered instances");
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticRegistry {
        path: String,
        entries: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl RegistryClient for StaticRegistry {
        async fn children(&self, path: &str) -> Result<Vec<Vec<u8>>> {
            if path == self.path {
                Ok(self.entries.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct BrokenRegistry;

    #[async_trait]
    impl RegistryClient for BrokenRegistry {
        async fn children(&self, _path: &str) -> Result<Vec<Vec<u8>>> {
            Err(TribleError::Transport("connection refused".to_string()))
        }
    }

    struct StuckRegistry;

    #[async_trait]
    impl RegistryClient for StuckRegistry {
        async fn children(&self, _path: &str) -> Result<Vec<Vec<u8>>> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_parse_provider() {
        let instance = parse_provider("Calculator@127.0.0.1:9000").unwrap();
        assert_eq!(instance, ServiceInstance::new("Calculator", "127.0.0.1", 9000));

        assert!(parse_provider("127.0.0.1:9000").is_err());
        assert!(parse_provider("Calculator@127.0.0.1").is_err());
        assert!(parse_provider("Calculator@127.0.0.1:http").is_err());
        assert!(parse_provider("@127.0.0.1:9000").is_err());
    }

    #[tokio::test]
    async fn test_local_discovery_keeps_registration_order() {
        let discovery = LocalDiscovery::from_address("Echo@a:1,Echo@b:2,Other@c:3").unwrap();

        let echo = discovery.discover("Echo").await.unwrap();
        let hosts: Vec<_> = echo.iter().map(|i| i.host.as_str()).collect();
        assert_eq!(hosts, vec!["a", "b"]);

        assert_eq!(discovery.discover("Other").await.unwrap().len(), 1);
        assert!(discovery.discover("Missing").await.unwrap().is_empty());
    }

    #[test]
    fn test_local_register_replaces_same_node() {
        let discovery = LocalDiscovery::new();
        discovery.register(ServiceInstance::new("Echo", "a", 1));
        discovery.register(ServiceInstance::new("Echo", "a", 1).with_group("blue"));

        let instances = discovery.instances("Echo");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].group, "blue");
    }

    #[test]
    fn test_local_unregister() {
        let discovery = LocalDiscovery::from_address("Echo@a:1,Echo@b:2").unwrap();
        assert!(discovery.unregister(&ServiceInstance::new("Echo", "a", 1)));
        assert!(!discovery.unregister(&ServiceInstance::new("Echo", "a", 1)));
        assert_eq!(discovery.instances("Echo"), vec![ServiceInstance::new("Echo", "b", 2)]);
    }

    #[tokio::test]
    async fn test_registry_discovery_decodes_and_filters() {
        let good = serde_json::to_vec(&ServiceInstance::new("Echo", "10.0.0.1", 7000)).unwrap();
        let other = serde_json::to_vec(&json!({"serviceName": "Other", "host": "x", "port": 1})).unwrap();
        let client = StaticRegistry {
            path: "/rpc/Echo".to_string(),
            entries: vec![good, b"garbage".to_vec(), other],
        };

        let discovery = RegistryDiscovery::new(Arc::new(client), Duration::from_secs(1));
        let instances = discovery.discover("Echo").await.unwrap();
        assert_eq!(instances, vec![ServiceInstance::new("Echo", "10.0.0.1", 7000)]);
    }

    #[tokio::test]
    async fn test_registry_discovery_custom_root() {
        let client = StaticRegistry {
            path: "/services/Echo".to_string(),
            entries: vec![serde_json::to_vec(&ServiceInstance::new("Echo", "h", 1)).unwrap()],
        };
        let discovery = RegistryDiscovery::new(Arc::new(client), Duration::from_secs(1)).with_root("/services/");
        assert_eq!(discovery.service_path("Echo"), "/services/Echo");
        assert_eq!(discovery.discover("Echo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_backend_failure_is_registry_error() {
        let discovery = RegistryDiscovery::new(Arc::new(BrokenRegistry), Duration::from_secs(1));
        let err = discovery.discover("Echo").await.unwrap_err();
        assert!(matches!(err, TribleError::Registry(_)), "got {err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_registry_lookup_timeout() {
        let discovery = RegistryDiscovery::new(Arc::new(StuckRegistry), Duration::from_millis(20));
        let err = discovery.discover("Echo").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
