//! Authenticated access to the WeChat Official Account HTTP API.
//!
//! Every call asks the [`TokenManager`] for a token, appends it as the `access_token`
//! query parameter and maps WeChat's `errcode`/`errmsg` envelope to [`ApiError::Remote`].

use crate::auth::{AuthError, TokenManager};
use anyhow::Context;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

/// Default production endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

/// Request-layer errors
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No usable access token
    Auth(AuthError),
    /// WeChat answered with a non-zero `errcode`
    Remote { code: i64, message: String },
    /// Transport failure or non-2xx status
    Http(String),
    /// Body was not the JSON we expected
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Auth(e) => write!(f, "{}", e),
            ApiError::Remote { code, message } => {
                write!(f, "WeChat API error {}: {}", code, message)
            }
            ApiError::Http(reason) => write!(f, "HTTP request failed: {}", reason),
            ApiError::Decode(reason) => write!(f, "Invalid response from WeChat API: {}", reason),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

/// Raw bytes returned by a media download.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Thin client over the WeChat API.
///
/// Clones share the HTTP connection pool and the token manager.
#[derive(Clone)]
pub struct WechatClient {
    http_client: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl WechatClient {
    pub fn new(
        tokens: TokenManager,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(http_client, base_url, tokens))
    }

    pub fn with_client(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        tokens: TokenManager,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Sends one authenticated JSON request and returns the decoded body.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path such as `/cgi-bin/user/get`
    /// * `query` - Extra query parameters (the access token is appended automatically)
    /// * `body` - Optional JSON body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.get_token().await?;
        debug!(method = %method, path = %path, "Calling WeChat API");

        let mut request = self
            .http_client
            .request(method.clone(), self.url(path))
            .query(query)
            .query(&[("access_token", token.value.as_str())]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(method = %method, path = %path, error = %e, "WeChat API request failed");
            ApiError::Http(e.to_string())
        })?;

        decode_json(path, response).await
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// Posts a multipart form (media uploads).
    pub async fn upload(
        &self,
        path: &str,
        query: &[(&str, String)],
        form: reqwest::multipart::Form,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.get_token().await?;
        debug!(path = %path, "Uploading to WeChat API");

        let response = self
            .http_client
            .post(self.url(path))
            .query(query)
            .query(&[("access_token", token.value.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(path = %path, error = %e, "WeChat upload failed");
                ApiError::Http(e.to_string())
            })?;

        decode_json(path, response).await
    }

    /// Fetches a media body.
    ///
    /// `query` parameters go on the URL; a `body` turns the call into a POST. A JSON reply is
    /// still checked for a WeChat error code and returned as-is when it carries none.
    pub async fn download(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Download, ApiError> {
        let token = self.tokens.get_token().await?;
        let method = if body.is_some() { Method::POST } else { Method::GET };

        let mut request = self
            .http_client
            .request(method, self.url(path))
            .query(query)
            .query(&[("access_token", token.value.as_str())]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?
            .to_vec();

        if !status.is_success() {
            return Err(ApiError::Http(format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        let looks_like_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json") || ct.starts_with("text/plain"));
        if looks_like_json {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                check_errcode(value)?;
            }
        }

        Ok(Download {
            bytes,
            content_type,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode_json(path: &str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::Http(e.to_string()))?;

    if !status.is_success() {
        warn!(path = %path, status = %status, "WeChat API returned HTTP error");
        return Err(ApiError::Http(format!("HTTP {}: {}", status, text)));
    }

    let value: Value = serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
    check_errcode(value).map_err(|e| {
        warn!(path = %path, error = %e, "WeChat API returned error code");
        e
    })
}

/// Maps a non-zero `errcode` to [`ApiError::Remote`]; passes everything else through.
pub fn check_errcode(value: Value) -> Result<Value, ApiError> {
    match value.get("errcode").and_then(Value::as_i64) {
        Some(code) if code != 0 => Err(ApiError::Remote {
            code,
            message: value
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => Ok(value),
    }
}
