//! Fault tolerance.
//!
//! A tolerant strategy decides the outcome of an invocation whose send step
//! failed for good: retries were exhausted, or the error was not retryable.
//! It either produces a substitute response or raises a terminal error.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};
use trible_common::{Response, Result, ServiceInstance, TribleError};

use crate::load_balancer::{LoadBalancer, RequestAttributes};

/// Sends the already encoded request once to the given instance.
pub type Resend<'a> = dyn Fn(ServiceInstance) -> BoxFuture<'a, Result<Response>> + Send + Sync + 'a;

/// What a tolerant strategy knows about the failed invocation.
pub struct TolerantContext<'a> {
    pub service_name: &'a str,
    pub attributes: &'a RequestAttributes,
    /// Everything discovery returned for this call
    pub candidates: &'a [ServiceInstance],
    /// Instances that already received the request
    pub tried: Vec<ServiceInstance>,
    pub balancer: &'a dyn LoadBalancer,
    pub resend: &'a Resend<'a>,
}

impl TolerantContext<'_> {
    /// Candidates that have not been tried yet, in discovery order.
    pub fn untried(&self) -> Vec<ServiceInstance> {
        self.candidates
            .iter()
            .filter(|c| !self.tried.contains(c))
            .cloned()
            .collect()
    }
}

/// Decides the outcome after the send step failed with `error`.
///
/// Implementations either return a response or an error; a successful
/// return always carries a response.
#[async_trait]
pub trait TolerantStrategy: Send + Sync {
    async fn do_tolerant(&self, context: TolerantContext<'_>, error: TribleError) -> Result<Response>;
}

/// Surfaces the failure to the caller as `Terminal`, with the original
/// error as its source.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

#[async_trait]
impl TolerantStrategy for FailFast {
    async fn do_tolerant(&self, context: TolerantContext<'_>, error: TribleError) -> Result<Response> {
        warn!(service = context.service_name, "Invocation failed: {}", error);
        Err(error.into_terminal())
    }
}

/// Swallows the failure and returns an empty response.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

#[async_trait]
impl TolerantStrategy for Silent {
    async fn do_tolerant(&self, context: TolerantContext<'_>, error: TribleError) -> Result<Response> {
        warn!(
            service = context.service_name,
            "Ignoring failed invocation, returning empty response: {}", error
        );
        Ok(Response::empty())
    }
}

/// Re-sends to other candidates.
///
/// Each round asks the balancer to choose among the candidates not tried so
/// far and sends the request once. Gives up after `max_failover` rounds or
/// when every candidate has been tried, raising `Terminal` with the last
/// error.
#[derive(Debug, Clone, Copy)]
pub struct FailOver {
    pub max_failover: usize,
}

impl FailOver {
    pub fn new(max_failover: usize) -> Self {
        Self { max_failover }
    }
}

#[async_trait]
impl TolerantStrategy for FailOver {
    async fn do_tolerant(&self, context: TolerantContext<'_>, error: TribleError) -> Result<Response> {
        let mut context = context;
        let mut last_error = error;

        for round in 0..self.max_failover {
            let untried = context.untried();
            if untried.is_empty() {
                break;
            }

            let next = context.balancer.select(context.attributes, &untried)?;
            info!(
                "Failing over to {} (round {}/{}) after: {}",
                next,
                round + 1,
                self.max_failover,
                last_error
            );
            context.tried.push(next.clone());

            match (context.resend)(next).await {
                Ok(response) => return Ok(response),
                Err(e) => last_error = e,
            }
        }

        warn!(
            service = context.service_name,
            tried = context.tried.len(),
            "Fail-over exhausted: {}",
            last_error
        );
        Err(last_error.into_terminal())
    }
}

/// Returns a configured fallback value as a successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct FailBack {
    pub fallback: Value,
}

impl FailBack {
    pub fn new(fallback: Value) -> Self {
        Self { fallback }
    }
}

#[async_trait]
impl TolerantStrategy for FailBack {
    async fn do_tolerant(&self, context: TolerantContext<'_>, error: TribleError) -> Result<Response> {
        warn!(
            service = context.service_name,
            "Invocation failed, returning fallback value: {}", error
        );
        Ok(Response::success(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{request_attributes, RoundRobinLoadBalancer};
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Mutex;
    use trible_common::Phase;

    fn nodes(n: usize) -> Vec<ServiceInstance> {
        (0..n)
            .map(|i| ServiceInstance::new("Echo", format!("node{i}"), 9000 + i as u16))
            .collect()
    }

    /// Runs `strategy` with node0 already tried; `healthy` hosts answer
    /// successfully, everything else fails with a transport error.
    async fn run(
        strategy: &dyn TolerantStrategy,
        candidates: &[ServiceInstance],
        healthy: &[&str],
    ) -> (Result<Response>, Vec<String>) {
        let sent = Mutex::new(Vec::new());
        let sent_ref = &sent;
        let resend = move |target: ServiceInstance| {
            async move {
                sent_ref.lock().unwrap().push(target.host.clone());
                if healthy.contains(&target.host.as_str()) {
                    Ok(Response::success(json!(target.host)))
                } else {
                    Err(TribleError::Transport(format!("{} is down", target.host)))
                }
            }
            .boxed()
        };

        let attributes = request_attributes("Echo", "echo");
        let balancer = RoundRobinLoadBalancer::new();
        let context = TolerantContext {
            service_name: "Echo",
            attributes: &attributes,
            candidates,
            tried: vec![candidates[0].clone()],
            balancer: &balancer,
            resend: &resend,
        };

        let result = strategy
            .do_tolerant(context, TribleError::Transport("node0 is down".to_string()))
            .await;
        let sent = sent.into_inner().unwrap();
        (result, sent)
    }

    #[tokio::test]
    async fn test_fail_fast_wraps_original_error() {
        let (result, sent) = run(&FailFast, &nodes(3), &["node1"]).await;
        assert!(sent.is_empty());
        match result.unwrap_err() {
            TribleError::Terminal { phase, source } => {
                assert_eq!(phase, Phase::Transport);
                assert_eq!(source.to_string(), "Transport error: node0 is down");
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_returns_empty_response() {
        let (result, sent) = run(&Silent, &nodes(2), &[]).await;
        let response = result.unwrap();
        assert!(sent.is_empty());
        assert!(response.exception.is_none());
        assert_eq!(response.data, Value::Null);
    }

    #[tokio::test]
    async fn test_fail_back_returns_fallback() {
        let strategy = FailBack::new(json!({"cached": true}));
        let (result, _) = run(&strategy, &nodes(2), &[]).await;
        assert_eq!(result.unwrap().data, json!({"cached": true}));
    }

    #[tokio::test]
    async fn test_fail_over_skips_tried_instance() {
        let (result, sent) = run(&FailOver::new(2), &nodes(3), &["node1", "node2"]).await;
        assert_eq!(result.unwrap().data, json!("node1"));
        assert_eq!(sent, vec!["node1"]);
    }

    #[tokio::test]
    async fn test_fail_over_never_repeats_an_instance() {
        let (result, mut sent) = run(&FailOver::new(10), &nodes(4), &[]).await;
        assert!(matches!(result, Err(TribleError::Terminal { .. })));
        sent.sort();
        assert_eq!(sent, vec!["node1", "node2", "node3"]);
    }

    #[tokio::test]
    async fn test_fail_over_bounded_by_max_failover() {
        let (result, sent) = run(&FailOver::new(2), &nodes(5), &[]).await;
        assert_eq!(sent.len(), 2);
        match result.unwrap_err() {
            TribleError::Terminal { source, .. } => {
                assert_eq!(source.to_string(), format!("Transport error: {} is down", sent[1]));
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_over_single_candidate_fails_immediately() {
        let (result, sent) = run(&FailOver::new(2), &nodes(1), &["node0"]).await;
        assert!(sent.is_empty());
        assert!(matches!(result, Err(TribleError::Terminal { .. })));
    }
}
