//! Quark Drive API Module
//!
//! Everything that talks to the Quark drive web API lives here. Higher layers
//! (traversal, selection, transfer, directory resolution) only ever see the
//! canonical types from [`types`] and the [`QuarkClient`] session object.
//!
//! # Architecture
//!
//! ```text
//!   traversal      transfer      directory
//!       │              │              │
//!       └──────────────┼──────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────────┐
//! │                 QuarkClient                 │
//! │  envelope checks, record normalization      │
//! └─────────────────────────────────────────────┘
//!                      │
//!                      ▼
//!             Transport trait ──► HttpTransport (reqwest)
//! ```

pub mod types;
pub mod http;
pub mod quark;

#[cfg(test)]
pub(crate) mod testing;

pub use types::*;
pub use http::HttpTransport;
pub use quark::QuarkClient;

use async_trait::async_trait;

/// API endpoints, relative to the configured API base URL
pub mod endpoints {
    /// Exchange share id + passcode for an stoken
    pub const SHARE_TOKEN: &str = "/share/sharepage/token";
    /// List one directory level of a share
    pub const SHARE_DETAIL: &str = "/share/sharepage/detail";
    /// Submit a save (server-side copy) job
    pub const SHARE_SAVE: &str = "/share/sharepage/save";
    /// Poll a job
    pub const TASK: &str = "/task";
    /// List one directory level of the caller's own drive
    pub const FILE_SORT: &str = "/file/sort";
    /// Create a directory in the caller's own drive
    pub const FILE: &str = "/file";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single API call, independent of how it is carried over the wire
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub endpoint: &'static str,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(endpoint: &'static str) -> Self {
        Self {
            method: HttpMethod::Get,
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(endpoint: &'static str, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            endpoint,
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Look up a query parameter by name
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Carries API calls to the server.
///
/// Implementations return the decoded JSON document or a transport/decode
/// error. They never interpret the API envelope; that is [`QuarkClient`]'s job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<serde_json::Value, ProviderError>;
}
