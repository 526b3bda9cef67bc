//! Service stubs.
//!
//! A [`ServiceDescriptor`] lists the methods a remote interface declares.
//! [`ServiceStub`] checks each call against it and routes it through the
//! [`Orchestrator`]. The [`trible_service!`](crate::trible_service) macro
//! generates a typed client with one async method per interface method.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use trible_common::{Result, RpcArgs, TribleError};

use crate::orchestrator::{MethodCall, Orchestrator};

/// One declared method: its name and parameter type signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub parameter_types: Vec<String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, parameter_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            parameter_types: parameter_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn matches(&self, name: &str, parameter_types: &[&str]) -> bool {
        self.name == name
            && self.parameter_types.len() == parameter_types.len()
            && self
                .parameter_types
                .iter()
                .zip(parameter_types)
                .all(|(declared, given)| declared == given)
    }
}

/// Dispatch table of a remote interface.
///
/// Overloads are allowed: methods are identified by name and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Declares a method.
    pub fn method(mut self, name: &str, parameter_types: &[&str]) -> Self {
        if self.find(name, parameter_types).is_none() {
            self.methods.push(MethodDescriptor::new(name, parameter_types));
        }
        self
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn find(&self, name: &str, parameter_types: &[&str]) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.matches(name, parameter_types))
    }
}

/// Converts an argument to its wire value.
///
/// Failure ends the call in the encoding phase.
pub fn encode_arg<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| TribleError::from(e).into_terminal())
}

/// Untyped client for one remote interface.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use trible_client::{Orchestrator, RpcConfig, ServiceDescriptor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RpcConfig::default().with_registry_address("Calculator@127.0.0.1:9000");
/// let orchestrator = Arc::new(Orchestrator::new(config)?);
///
/// let calculator = orchestrator.stub(ServiceDescriptor::new("Calculator").method("add", &["i64", "i64"]));
/// let sum: i64 = calculator.call("add", &["i64", "i64"], vec![json!(1), json!(2)]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceStub {
    orchestrator: Arc<Orchestrator>,
    descriptor: Arc<ServiceDescriptor>,
}

impl ServiceStub {
    pub fn new(orchestrator: Arc<Orchestrator>, descriptor: ServiceDescriptor) -> Self {
        Self {
            orchestrator,
            descriptor: Arc::new(descriptor),
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Calls a declared method and converts its result to `R`.
    ///
    /// # Errors
    ///
    /// - `IllegalArgument` if the interface declares no method with this
    ///   name and signature, or the argument count does not match; nothing
    ///   is sent
    /// - `ProtocolDecode` if the result cannot be converted to `R`
    /// - `Terminal` carrying the original cause if a tolerant strategy
    ///   substituted an empty result that `R` cannot represent, such as a
    ///   silenced transport failure on a method returning `i64`
    /// - any error of [`Orchestrator::invoke`]
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        parameter_types: &[&str],
        args: RpcArgs,
    ) -> Result<R> {
        if self.descriptor.find(method, parameter_types).is_none() {
            return Err(TribleError::IllegalArgument(format!(
                "{} declares no method {}({})",
                self.descriptor.name,
                method,
                parameter_types.join(", ")
            )));
        }

        if args.len() != parameter_types.len() {
            return Err(TribleError::IllegalArgument(format!(
                "{}.{} expects {} arguments, got {}",
                self.descriptor.name,
                method,
                parameter_types.len(),
                args.len()
            )));
        }

        let call = MethodCall {
            service_name: self.descriptor.name.clone(),
            method_name: method.to_string(),
            parameter_types: parameter_types.iter().map(|t| t.to_string()).collect(),
            args,
        };

        let invocation = self.orchestrator.invoke_detailed(call).await?;
        serde_json::from_value(invocation.data).map_err(|e| match invocation.tolerated {
            // The empty result stood in for a failure and does not fit `R`
            Some(cause) => cause.into_terminal(),
            None => TribleError::ProtocolDecode(format!(
                "cannot convert result of {}.{}: {}",
                self.descriptor.name, method, e
            )),
        })
    }
}

/// Generates a typed client for a remote interface.
///
/// Each declared method becomes an async method that encodes its arguments,
/// invokes the service through the orchestrator and decodes the result.
/// Parameter type signatures are the Rust type names as written.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use trible_client::{trible_service, Orchestrator, RpcConfig};
///
/// trible_service! {
///     /// Client for the remote calculator.
///     pub struct CalculatorClient for "Calculator" {
///         fn add(a: i64, b: i64) -> i64;
///         fn divide(a: f64, b: f64) -> f64;
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RpcConfig::default().with_registry_address("Calculator@127.0.0.1:9000");
/// let calculator = CalculatorClient::new(Arc::new(Orchestrator::new(config)?));
/// assert_eq!(calculator.add(1, 2).await?, 3);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! trible_service {
    (
        $(#[$meta:meta])*
        $vis:vis struct $client:ident for $service:literal {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident ( $( $arg:ident : $ty:ty ),* $(,)? ) -> $ret:ty ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $client {
            stub: $crate::ServiceStub,
        }

        impl $client {
            pub const SERVICE_NAME: &'static str = $service;

            /// Methods declared by this interface.
            pub fn descriptor() -> $crate::ServiceDescriptor {
                $crate::ServiceDescriptor::new($service)
                    $( .method(stringify!($method), &[$(stringify!($ty)),*]) )*
            }

            pub fn new(orchestrator: ::std::sync::Arc<$crate::Orchestrator>) -> Self {
                Self {
                    stub: $crate::ServiceStub::new(orchestrator, Self::descriptor()),
                }
            }

            pub fn stub(&self) -> &$crate::ServiceStub {
                &self.stub
            }

            $(
                $(#[$method_meta])*
                pub async fn $method(&self, $($arg: $ty),*) -> $crate::Result<$ret> {
                    let args: ::std::vec::Vec<$crate::Value> =
                        ::std::vec![$($crate::proxy::encode_arg(&$arg)?),*];
                    self.stub
                        .call(stringify!($method), &[$(stringify!($ty)),*], args)
                        .await
                }
            )*
        }
    };
}
