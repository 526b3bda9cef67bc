use serde::{Deserialize, Serialize};

pub type RequestId = u64;
pub type MethodName = String;
pub type RpcArgs = Vec<serde_json::Value>;

/// A remote method invocation.
///
/// The request names the target by service and method, carries the declared
/// parameter type signatures (used to pick between overloads on the provider)
/// and the argument values in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub service_name: String,
    pub method_name: MethodName,
    pub parameter_types: Vec<String>,
    pub args: RpcArgs,
    pub request_id: RequestId,
}

impl Request {
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        parameter_types: Vec<String>,
        args: RpcArgs,
        request_id: RequestId,
    ) -> Self {
        Request {
            service_name: service_name.into(),
            method_name: method_name.into(),
            parameter_types,
            args,
            request_id,
        }
    }

    /// `service.method(T1, T2)` form used in logs.
    pub fn signature(&self) -> String {
        format!(
            "{}.{}({})",
            self.service_name,
            self.method_name,
            self.parameter_types.join(", ")
        )
    }
}
