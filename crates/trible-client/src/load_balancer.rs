//! Load balancers.
//!
//! A balancer picks one instance from the candidates discovery returned.
//! Selection is driven by [`RequestAttributes`], which always carry the
//! service and method name of the call being routed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::Rng;
use sha2::{Digest, Sha256};
use trible_common::{Result, ServiceInstance, TribleError};

pub const SERVICE_NAME_ATTR: &str = "serviceName";
pub const METHOD_NAME_ATTR: &str = "methodName";

/// Virtual points placed on the hash ring per candidate.
pub const VIRTUAL_NODES: usize = 100;

/// Ordered attributes describing the call being routed.
pub type RequestAttributes = BTreeMap<String, String>;

/// Attributes for a call to `service_name.method_name`.
pub fn request_attributes(service_name: &str, method_name: &str) -> RequestAttributes {
    let mut attributes = RequestAttributes::new();
    attributes.insert(SERVICE_NAME_ATTR.to_string(), service_name.to_string());
    attributes.insert(METHOD_NAME_ATTR.to_string(), method_name.to_string());
    attributes
}

/// Picks one of the candidates.
///
/// The returned instance is always a member of `candidates`. An empty
/// candidate list is rejected with `IllegalArgument`.
pub trait LoadBalancer: Send + Sync {
    fn select(
        &self,
        attributes: &RequestAttributes,
        candidates: &[ServiceInstance],
    ) -> Result<ServiceInstance>;
}

fn ensure_candidates(candidates: &[ServiceInstance]) -> Result<()> {
    if candidates.is_empty() {
        return Err(TribleError::IllegalArgument(
            "cannot select from an empty candidate list".to_string(),
        ));
    }
    Ok(())
}

/// Source of indices for [`RandomLoadBalancer`].
///
/// Values at or beyond `bound` are reduced modulo `bound`.
pub trait IndexSource: Send {
    fn next_index(&mut self, bound: usize) -> usize;
}

impl<F> IndexSource for F
where
    F: FnMut(usize) -> usize + Send,
{
    fn next_index(&mut self, bound: usize) -> usize {
        self(bound)
    }
}

/// Uniform random selection.
///
/// Uses the thread-local RNG unless an [`IndexSource`] was injected.
#[derive(Default)]
pub struct RandomLoadBalancer {
    source: Option<Mutex<Box<dyn IndexSource>>>,
}

impl RandomLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balancer that draws indices from `source` instead of the RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use trible_client::load_balancer::{request_attributes, LoadBalancer, RandomLoadBalancer};
    /// use trible_common::ServiceInstance;
    ///
    /// let mut script = vec![1, 0].into_iter();
    /// let balancer = RandomLoadBalancer::with_index_source(move |_bound| script.next().unwrap_or(0));
    ///
    /// let candidates = vec![ServiceInstance::new("Echo", "a", 1), ServiceInstance::new("Echo", "b", 2)];
    /// let attributes = request_attributes("Echo", "echo");
    /// assert_eq!(balancer.select(&attributes, &candidates).unwrap().host, "b");
    /// assert_eq!(balancer.select(&attributes, &candidates).unwrap().host, "a");
    /// ```
    pub fn with_index_source(source: impl IndexSource + 'static) -> Self {
        Self {
            source: Some(Mutex::new(Box::new(source))),
        }
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn select(
        &self,
        _attributes: &RequestAttributes,
        candidates: &[ServiceInstance],
    ) -> Result<ServiceInstance> {
        ensure_candidates(candidates)?;

        let index = match &self.source {
            Some(source) => {
                let mut source = source.lock().unwrap_or_else(PoisonError::into_inner);
                source.next_index(candidates.len()) % candidates.len()
            }
            None => rand::rng().random_range(0..candidates.len()),
        };

        Ok(candidates[index].clone())
    }
}

/// Round-robin selection with one cursor per service.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    cursors: RwLock<HashMap<String, Arc<AtomicUsize>>>,
}

impl RoundRobinLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    fn cursor(&self, service: &str) -> Arc<AtomicUsize> {
        if let Some(cursor) = self
            .cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return Arc::clone(cursor);
        }

        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cursors.entry(service.to_string()).or_default())
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn select(
        &self,
        attributes: &RequestAttributes,
        candidates: &[ServiceInstance],
    ) -> Result<ServiceInstance> {
        ensure_candidates(candidates)?;

        let service = attributes
            .get(SERVICE_NAME_ATTR)
            .map(String::as_str)
            .unwrap_or(candidates[0].service_name.as_str());

        let position = self.cursor(service).fetch_add(1, Ordering::Relaxed);
        Ok(candidates[position % candidates.len()].clone())
    }
}

/// Consistent-hash selection over a ring of virtual nodes.
///
/// The ring is built from the candidates' node keys, so equal attributes map
/// to the same instance for as long as the candidate set is unchanged, and
/// removing one candidate only remaps the keys that landed on it.
#[derive(Debug, Default)]
pub struct ConsistentHashLoadBalancer;

impl ConsistentHashLoadBalancer {
    pub fn new() -> Self {
        Self
    }

    /// Sorted `(point, candidate index)` pairs.
    fn build_ring(candidates: &[ServiceInstance]) -> Vec<(u64, usize)> {
        let mut points = Vec::with_capacity(candidates.len() * VIRTUAL_NODES);
        for (index, candidate) in candidates.iter().enumerate() {
            let identity = candidate.node_key();
            for replica in 0..VIRTUAL_NODES {
                points.push((hash64(format!("{identity}#{replica}").as_bytes()), index));
            }
        }
        points.sort_unstable();
        points
    }

    fn attributes_key(attributes: &RequestAttributes) -> String {
        attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl LoadBalancer for ConsistentHashLoadBalancer {
    fn select(
        &self,
        attributes: &RequestAttributes,
        candidates: &[ServiceInstance],
    ) -> Result<ServiceInstance> {
        ensure_candidates(candidates)?;
        if candidates.len() == 1 {
            return Ok(candidates[0].clone());
        }

        let ring = Self::build_ring(candidates);
        let hash = hash64(Self::attributes_key(attributes).as_bytes());

        let idx = ring.partition_point(|&(point, _)| point < hash);
        let idx = if idx == ring.len() { 0 } else { idx };
        Ok(candidates[ring[idx].1].clone())
    }
}

/// First eight bytes of the SHA-256 digest, big-endian.
fn hash64(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
