pub mod config;
pub mod discovery;
pub mod load_balancer;
pub mod orchestrator;
pub mod proxy;
pub mod registry;
pub mod retry;
pub mod tolerant;

pub use config::{keys, RegistryConfig, RetryConfig, RpcConfig, TolerantConfig};
pub use discovery::{Discovery, LocalDiscovery, RegistryClient, RegistryDiscovery};
pub use load_balancer::{
    ConsistentHashLoadBalancer, LoadBalancer, RandomLoadBalancer, RequestAttributes,
    RoundRobinLoadBalancer,
};
pub use orchestrator::{Invocation, MethodCall, Orchestrator};
pub use proxy::{MethodDescriptor, ServiceDescriptor, ServiceStub};
pub use registry::{Capability, Strategies, StrategyRegistry};
pub use retry::{
    ExponentialBackoffRetry, FixedCountRetry, FixedIntervalRetry, NoRetry, RetryStrategy,
};
pub use tolerant::{FailBack, FailFast, FailOver, Silent, TolerantContext, TolerantStrategy};

pub use serde_json::Value;
pub use trible_common::{Phase, RemoteException, Result, ServiceInstance, TribleError};
