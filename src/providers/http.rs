//! reqwest-backed [`Transport`]
//!
//! Sends the browser-like headers the Quark web API expects and attaches the
//! session cookie to every request. The response body is decoded as JSON
//! whatever the HTTP status: the API reports failures inside the envelope.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, ORIGIN, REFERER, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use super::{ApiRequest, HttpMethod, ProviderError, Transport};
use crate::config::ClientConfig;

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const WEB_ORIGIN: &str = "https://pan.quark.cn";
const WEB_REFERER: &str = "https://pan.quark.cn/";

/// Longest body excerpt quoted in a parse error
const BODY_EXCERPT_LEN: usize = 200;

pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    cookie: SecretString,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, cookie: SecretString) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(WEB_REFERER));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cookie,
        })
    }

    fn url(&self, request: &ApiRequest) -> Result<url::Url, ProviderError> {
        let raw = format!("{}{}", self.api_base, request.endpoint);
        url::Url::parse_with_params(&raw, &request.query)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid API URL {}: {}", raw, e)))
    }

    fn cookie_header(&self) -> Result<HeaderValue, ProviderError> {
        let mut value = HeaderValue::from_str(self.cookie.expose_secret()).map_err(|_| {
            ProviderError::AuthenticationFailed("Cookie contains characters not allowed in a header".to_string())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<serde_json::Value, ProviderError> {
        let url = self.url(request)?;
        let builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let mut builder = builder.header(COOKIE, self.cookie_header()?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("{:?} {}", request.method, request.endpoint);

        // without_url(): the query string carries the share stoken
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
            ProviderError::ParseError(format!(
                "{} {} returned HTTP {} with a non-JSON body ({}): {}",
                match request.method {
                    HttpMethod::Get => "GET",
                    HttpMethod::Post => "POST",
                },
                request.endpoint,
                status,
                e,
                excerpt
            ))
        })
    }
}
