//! Client for the WeChat token endpoint (`GET /cgi-bin/token`).

use super::AuthError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// A token as issued by the authority, before the manager stamps it with a clock reading.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub value: String,
    pub ttl_seconds: i64,
}

/// Exchanges an AppID/AppSecret pair for an access token.
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    async fn fetch_token(&self, app_id: &str, app_secret: &str) -> Result<IssuedToken, AuthError>;
}

/// Raw body of the token endpoint: either a token or an error code.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    errcode: Option<i64>,
    errmsg: Option<String>,
}

/// Production authority talking to `api.weixin.qq.com` (or a configured base URL).
pub struct WechatTokenAuthority {
    http_client: reqwest::Client,
    base_url: String,
}

impl WechatTokenAuthority {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(http_client, base_url))
    }

    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TokenAuthority for WechatTokenAuthority {
    async fn fetch_token(&self, app_id: &str, app_secret: &str) -> Result<IssuedToken, AuthError> {
        info!(app_id = %app_id, "Requesting access token");

        let response = self
            .http_client
            .get(format!("{}/cgi-bin/token", self.base_url))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", app_id),
                ("secret", app_secret),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            warn!(app_id = %app_id, status = %status, "Token endpoint returned HTTP error");
            return Err(AuthError::Authority {
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        parse_token_response(&body)
    }
}

/// WeChat issues 7200 s tokens; anything outside (0, 1 day] is a malformed reply.
const MAX_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

fn parse_token_response(body: &str) -> Result<IssuedToken, AuthError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Transport(format!("Invalid token response: {}", e)))?;

    if let Some(code) = parsed.errcode.filter(|code| *code != 0) {
        return Err(AuthError::Authority {
            code,
            message: parsed.errmsg.unwrap_or_default(),
        });
    }

    match (parsed.access_token, parsed.expires_in) {
        (Some(_), Some(ttl_seconds)) if !(1..=MAX_TOKEN_TTL_SECONDS).contains(&ttl_seconds) => Err(
            AuthError::Transport(format!("Token response has invalid expires_in: {}", ttl_seconds)),
        ),
        (Some(value), Some(ttl_seconds)) if !value.is_empty() => Ok(IssuedToken { value, ttl_seconds }),
        _ => Err(AuthError::Transport(
            "Token response missing access_token or expires_in".to_string(),
        )),
    }
}
