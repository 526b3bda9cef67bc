//! Trible Response Types
//!
//! This module defines the RPC response payload carried in the body of a
//! RESPONSE envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

/// RPC method result (JSON value)
///
/// The result is returned as a JSON value and can contain any JSON-serializable data.
pub type RpcResult = serde_json::Value;

/// Status code of a successful response.
pub const STATUS_OK: u16 = 200;
/// Status code of a response produced without a remote result.
pub const STATUS_NO_CONTENT: u16 = 204;
/// Status code of a response carrying a business exception.
pub const STATUS_BUSINESS_ERROR: u16 = 500;

/// An application-level exception raised by the remote method.
///
/// It travels inside a well-formed response and is handed to the caller
/// unchanged; it is never retried or absorbed by fault tolerance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteException {
    /// Exception class or error kind reported by the provider
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl RemoteException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// An RPC response returned from a provider to the client.
///
/// # Fields
///
/// - `data`: The result value (null when absent)
/// - `exception`: Business exception raised by the remote method, if any
/// - `status_code`: [`STATUS_OK`], [`STATUS_NO_CONTENT`] or [`STATUS_BUSINESS_ERROR`]
///
/// # Example
///
/// ```
/// use trible_common::protocol::responses::Response;
/// use serde_json::json;
///
/// let success = Response::success(json!(3));
/// assert!(success.is_success());
///
/// let failure = Response::failure("ArithmeticException", "/ by zero");
/// assert!(failure.exception.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub data: RpcResult,
    #[serde(default)]
    pub exception: Option<RemoteException>,
    pub status_code: u16,
}

impl Response {
    /// Creates a successful response carrying `data`.
    pub fn success(data: RpcResult) -> Self {
        Response {
            data,
            exception: None,
            status_code: STATUS_OK,
        }
    }

    /// Creates a response carrying a business exception.
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Response {
            data: RpcResult::Null,
            exception: Some(RemoteException::new(kind, message)),
            status_code: STATUS_BUSINESS_ERROR,
        }
    }

    /// Creates a response with default (null) data and no exception.
    pub fn empty() -> Self {
        Response {
            data: RpcResult::Null,
            exception: None,
            status_code: STATUS_NO_CONTENT,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }
}
