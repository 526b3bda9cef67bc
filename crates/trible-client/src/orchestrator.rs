use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::future::FutureExt;
use serde_json::Value;
use tracing::{debug, info};
use trible_common::transport::{ProtocolCodec, Serializer, TcpTransport, Transport};
use trible_common::{
    Envelope, Header, IdGenerator, MessageType, RemoteException, Request, RequestId, Response,
    Result, RpcArgs, RpcResult, ServiceInstance, TribleError, STATUS_NO_CONTENT,
};

use crate::config::RpcConfig;
use crate::load_balancer::request_attributes;
use crate::proxy::{ServiceDescriptor, ServiceStub};
use crate::registry::Strategies;
use crate::tolerant::TolerantContext;

/// A method invocation as seen by the caller, before it becomes a request.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub service_name: String,
    pub method_name: String,
    pub parameter_types: Vec<String>,
    pub args: RpcArgs,
}

impl MethodCall {
    /// A call without arguments.
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            parameter_types: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Appends one argument with its declared type.
    pub fn arg(mut self, parameter_type: impl Into<String>, value: Value) -> Self {
        self.parameter_types.push(parameter_type.into());
        self.args.push(value);
        self
    }
}

/// Outcome of one invocation.
#[derive(Debug)]
pub struct Invocation {
    pub data: RpcResult,
    /// The failure a tolerant strategy absorbed when it substituted an
    /// empty result in place of a remote one
    pub tolerated: Option<TribleError>,
}

/// Trible Orchestrator - drives one invocation from call to result.
///
/// Each call walks the same pipeline:
///
/// 1. **Build request**: assign a request id from the id generator
/// 2. **Discover**: list candidate instances; none means `NoProvider`
/// 3. **Select**: pick one instance through the configured balancer
/// 4. **Encode**: serialize the body and frame the envelope
/// 5. **Send with retry**: transmit and decode the response under the retry
///    strategy, each attempt bounded by `timeout_ms`
/// 6. **Tolerate**: if the send step failed for good, let the tolerant
///    strategy substitute a response or raise a terminal error
/// 7. **Return or raise**: a remote business exception is raised as
///    `Business`, otherwise the response data is returned
///
/// Discovery and encoding failures skip retry and tolerance entirely.
///
/// The orchestrator holds only shared immutable state and may be used from
/// many tasks at once.
pub struct Orchestrator {
    config: Arc<RpcConfig>,
    strategies: Arc<Strategies>,
    transport: Arc<dyn Transport>,
    ids: Arc<IdGenerator>,
    serializer: Serializer,
}

impl Orchestrator {
    /// Creates an orchestrator with the built-in strategies and TCP transport.
    ///
    /// # Example
    /// ```
    /// use trible_client::{Orchestrator, RpcConfig};
    ///
    /// let config = RpcConfig::default().with_registry_address("Calculator@127.0.0.1:9000");
    /// let orchestrator = Orchestrator::new(config).unwrap();
    /// ```
    pub fn new(config: RpcConfig) -> Result<Self> {
        config.validate()?;
        Self::with_strategies(Arc::new(Strategies::with_defaults(Arc::new(config))))
    }

    /// Creates an orchestrator over a prepared set of strategies.
    ///
    /// Every configured strategy key is resolved here, so an unknown key or
    /// a factory that cannot be built fails construction rather than the
    /// first call.
    pub fn with_strategies(strategies: Arc<Strategies>) -> Result<Self> {
        let config = Arc::clone(strategies.config());
        config.validate()?;
        strategies.validate()?;
        let serializer = config.serializer()?;

        info!(
            name = %config.name,
            balancer = %config.balancer,
            retry = %config.retry.kind,
            tolerant = %config.tolerant.kind,
            "Orchestrator initialized"
        );

        Ok(Self {
            config,
            strategies,
            transport: Arc::new(TcpTransport::new()),
            ids: Arc::new(IdGenerator::default()),
            serializer,
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &Arc<RpcConfig> {
        &self.config
    }

    /// Untyped client for one service.
    pub fn stub(self: &Arc<Self>, descriptor: ServiceDescriptor) -> ServiceStub {
        ServiceStub::new(Arc::clone(self), descriptor)
    }

    /// Invokes a remote method and returns its result.
    ///
    /// # Returns
    /// - `Ok(value)` - the remote result, or whatever the tolerant strategy
    ///   substituted
    /// - `Err(NoProvider)` - discovery found no instance; nothing was sent
    /// - `Err(Business)` - the remote method raised an exception
    /// - `Err(Terminal)` - the invocation failed and was not tolerated
    pub async fn invoke(&self, call: MethodCall) -> Result<RpcResult> {
        self.invoke_detailed(call).await.map(|invocation| invocation.data)
    }

    /// Like [`invoke`](Self::invoke), but also reports a failure that the
    /// tolerant strategy replaced with an empty result.
    pub async fn invoke_detailed(&self, call: MethodCall) -> Result<Invocation> {
        let request_id = self.ids.next_id();
        let request = Request::new(
            call.service_name,
            call.method_name,
            call.parameter_types,
            call.args,
            request_id,
        );
        debug!(request_id, call = %request.signature(), "Invoking");

        let candidates = self.discover(&request.service_name).await?;

        let attributes = request_attributes(&request.service_name, &request.method_name);
        let balancer = self.strategies.load_balancer()?;
        let instance = balancer.select(&attributes, &candidates)?;
        debug!(request_id, instance = %instance, "Selected instance");

        let frame = self.encode(&request).map_err(TribleError::into_terminal)?;

        let address = instance.address();
        let attempt = || self.exchange(&address, frame.clone(), request_id).boxed();

        let retry = self.strategies.retry_strategy()?;
        let (response, tolerated) = match retry.do_retry(&attempt).await {
            Ok(response) => (response, None),
            Err(error) => {
                debug!(request_id, error = %error, "Send failed, applying tolerance");
                let cause = error.clone();
                let resend = |target: ServiceInstance| {
                    let frame = frame.clone();
                    async move { self.exchange(&target.address(), frame, request_id).await }.boxed()
                };
                let context = TolerantContext {
                    service_name: &request.service_name,
                    attributes: &attributes,
                    candidates: &candidates,
                    tried: vec![instance.clone()],
                    balancer: balancer.as_ref(),
                    resend: &resend,
                };
                let response = self
                    .strategies
                    .tolerant_strategy()?
                    .do_tolerant(context, error)
                    .await?;
                let substituted = response.status_code == STATUS_NO_CONTENT;
                (response, substituted.then_some(cause))
            }
        };

        Ok(Invocation {
            data: Self::into_result(response)?,
            tolerated,
        })
    }

    async fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let discovery = self.strategies.discovery()?;
        let candidates = discovery
            .discover(service_name)
            .await
            .map_err(TribleError::into_terminal)?;

        if candidates.is_empty() {
            return Err(TribleError::NoProvider(service_name.to_string()));
        }

        debug!(service = service_name, count = candidates.len(), "Discovered candidates");
        Ok(candidates)
    }

    fn encode(&self, request: &Request) -> Result<Bytes> {
        let body = self.serializer.encode_request(request)?;
        ProtocolCodec::check_body_len(body.len())?;
        let envelope = Envelope::new(Header::request(self.serializer.id(), request.request_id), body);
        Ok(ProtocolCodec::encode(&envelope))
    }

    /// One send attempt: transmit, await the reply within `timeout_ms` and
    /// decode it.
    async fn exchange(&self, addr: &str, frame: Bytes, request_id: RequestId) -> Result<Response> {
        let timeout = self.config.timeout();
        let reply = tokio::time::timeout(timeout, self.transport.send(addr, frame, timeout))
            .await
            .map_err(|_| TribleError::Timeout(self.config.timeout_ms))??;

        let response = Self::decode_reply(&reply, request_id)?;
        debug!(request_id, addr, status = response.status_code, "Received response");
        Ok(response)
    }

    fn decode_reply(reply: &[u8], request_id: RequestId) -> Result<Response> {
        let mut buf = BytesMut::from(reply);
        let envelope = ProtocolCodec::decode(&mut buf)?.ok_or_else(|| {
            TribleError::ProtocolDecode(format!(
                "incomplete response frame ({} bytes)",
                reply.len()
            ))
        })?;
        let header = envelope.header;

        if header.message_type != MessageType::Response {
            return Err(TribleError::ProtocolDecode(format!(
                "expected a response, got {:?}",
                header.message_type
            )));
        }

        if header.request_id != request_id {
            return Err(TribleError::ProtocolDecode(format!(
                "response id {} does not match request id {}",
                header.request_id, request_id
            )));
        }

        let serializer = Serializer::from_id(header.serializer).ok_or_else(|| {
            TribleError::ProtocolDecode(format!("unsupported serializer id: {}", header.serializer))
        })?;
        let mut response = serializer.decode_response(&envelope.body)?;

        if !header.status.is_success() && response.exception.is_none() {
            response.exception = Some(RemoteException::new(
                "RpcStatusException",
                format!("provider answered with status {}", header.status.as_str()),
            ));
        }

        Ok(response)
    }

    fn into_result(response: Response) -> Result<RpcResult> {
        match response.exception {
            Some(exception) => Err(TribleError::Business(exception)),
            None => Ok(response.data),
        }
    }
}
