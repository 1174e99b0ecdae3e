//! Shared HTTP plumbing for provider adapters.
//!
//! One [`HttpProviderClient`] per adapter: it owns the reqwest client (and
//! with it the adapter's connection pool), the resolved base URL, and the
//! vendor authentication strategy. Every call is bounded by the caller's
//! absolute deadline and every non-2xx status is folded into the error
//! taxonomy here, so adapters never see raw transport failures.

use crate::error::ProviderError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

/// How a vendor expects its API key.
#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    QueryParam { name: String, value: String },
}

#[derive(Clone)]
pub struct HttpProviderClient {
    provider: String,
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl HttpProviderClient {
    pub fn new(
        provider: &str,
        timeout: Duration,
        base_url: Option<String>,
        default_base: &str,
        auth: AuthStrategy,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::validation(provider, format!("failed to create HTTP client: {e}"))
        })?;

        let mut default_headers = HeaderMap::new();
        let mut query = Vec::new();

        match auth {
            AuthStrategy::Bearer { token } => {
                let value = format!("Bearer {token}").parse().map_err(|_| {
                    ProviderError::validation(provider, "api key is not a valid header value")
                })?;
                default_headers.insert("Authorization", value);
            }
            AuthStrategy::Header { name, value } => {
                let name = name.parse::<reqwest::header::HeaderName>().map_err(|_| {
                    ProviderError::validation(provider, "invalid auth header name")
                })?;
                let value = value.parse().map_err(|_| {
                    ProviderError::validation(provider, "api key is not a valid header value")
                })?;
                default_headers.insert(name, value);
            }
            AuthStrategy::QueryParam { name, value } => {
                query.push((name, value));
            }
        }

        let base_url = base_url.unwrap_or_else(|| default_base.to_string());

        Ok(Self {
            provider: provider.to_string(),
            http,
            base_url,
            default_headers,
            query,
        })
    }

    /// Attach a vendor-required default header (e.g. an API version pin).
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ProviderError> {
        let name = name
            .parse::<reqwest::header::HeaderName>()
            .map_err(|_| ProviderError::validation(&self.provider, "invalid header name"))?;
        let value = value
            .parse()
            .map_err(|_| ProviderError::validation(&self.provider, "invalid header value"))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    async fn execute<TResp: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        deadline: Instant,
    ) -> Result<TResp, ProviderError> {
        let work = async {
            let resp = request
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(&self.provider, e))?;
            if !resp.status().is_success() {
                return Err(map_error_response(&self.provider, resp).await);
            }
            resp.json::<TResp>()
                .await
                .map_err(|e| ProviderError::from_reqwest(&self.provider, e))
        };

        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), work).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(&self.provider)),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, self.build_url(path))
            .headers(self.default_headers.clone());
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        request
    }

    pub async fn post_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
        deadline: Instant,
    ) -> Result<TResp, ProviderError> {
        let request = self.request(Method::POST, path).json(body);
        self.execute(request, deadline).await
    }

    pub async fn get_json<TResp: DeserializeOwned>(
        &self,
        path: &str,
        deadline: Instant,
    ) -> Result<TResp, ProviderError> {
        let request = self.request(Method::GET, path);
        self.execute(request, deadline).await
    }
}

/// Classify a non-2xx vendor response.
pub async fn map_error_response(provider: &str, resp: Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = resp.text().await.unwrap_or_default();
    // Pull a message from the common {"error": {"message": ...}} shape.
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.chars().take(200).collect()
            }
        });

    match status {
        401 | 403 => ProviderError::authentication(provider, message),
        429 => ProviderError::rate_limited(provider, retry_after),
        _ => ProviderError::generic(provider, Some(status), message),
    }
}
