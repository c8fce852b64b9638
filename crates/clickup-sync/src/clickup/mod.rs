//! ClickUp API surface: request/response types, the query builder and the
//! HTTP transport.
//!
//! The dispatcher only ever sees [`ApiRequest`] values built by [`Query`]
//! and executes them through the [`Transport`] trait, so delivery logic
//! can be exercised without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;
pub mod query;

pub use client::HttpClient;
pub use query::{FieldValue, Query};

/// Base URL of the ClickUp v2 REST API.
pub const API_BASE_URL: &str = "https://api.clickup.com/api/v2/";

/// HTTP methods the ClickUp API is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns the canonical storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl TryFrom<&str> for Method {
    type Error = ParseMethodError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ParseMethodError(value.to_owned())),
        }
    }
}

/// Raised when a stored request method string is not a known variant.
#[derive(Debug, Error)]
#[error("unknown request method '{0}'")]
pub struct ParseMethodError(pub String);

/// One outbound API call: everything needed to execute it except the key.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// The raw outcome of an executed call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// A request that never reached the point of producing an HTTP status:
/// DNS failure, refused connection, timeout.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Executes API requests. Implemented by [`HttpClient`] for production and
/// by scripted fakes in dispatcher tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &ApiRequest,
        api_key: &str,
    ) -> Result<ApiResponse, TransportError>;
}
