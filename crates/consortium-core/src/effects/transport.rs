//! Request/response transport to a ledger node

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Transport-level failure. The request may or may not have been applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Endpoint could not be reached
    #[error("Endpoint unreachable: {endpoint}")]
    Unreachable {
        /// Endpoint identifier
        endpoint: String,
    },
    /// Connection dropped before a response arrived
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Failure description
        reason: String,
    },
    /// Response could not be decoded
    #[error("Malformed response: {reason}")]
    MalformedResponse {
        /// Decoding failure description
        reason: String,
    },
}

/// Response to a transport request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Body on success
    pub body: Option<Value>,
    /// Error payload on failure
    pub error: Option<Value>,
}

impl TransportResponse {
    /// Successful response carrying `body`
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
            error: None,
        }
    }

    /// Failed response carrying an error payload
    pub fn failure(status: u16, error: Value) -> Self {
        Self {
            status,
            body: None,
            error: Some(error),
        }
    }

    /// Whether the status code indicates success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response calls to a ledger node.
///
/// `signed` marks requests that must carry the caller's signature; the
/// signature itself travels inside `params`.
#[async_trait]
pub trait TransportEffects: Send + Sync {
    /// Issue one request and wait for its response
    async fn request(
        &self,
        op: &str,
        params: Value,
        signed: bool,
    ) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: TransportEffects + ?Sized> TransportEffects for Arc<T> {
    async fn request(
        &self,
        op: &str,
        params: Value,
        signed: bool,
    ) -> Result<TransportResponse, TransportError> {
        (**self).request(op, params, signed).await
    }
}
