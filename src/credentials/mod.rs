//! Local persistence for the WeChat app credential, its access token and media metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       ConfigStore                        │
//! │  - one credential row                    │
//! │  - at most one access token row          │
//! │  - uploaded media records                │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (seal, optional)     (open, optional)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Encryption Module                  │
//! │  - AES-256-GCM                           │
//! │  - Unique nonce per value                │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wechat_mcp::credentials::{ConfigStore, Credential};
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("WECHAT_MCP_SECRET_KEY").ok();
//! let store = ConfigStore::new("data/wechat-mcp.db", key.as_deref())?;
//!
//! store.set_credential(&Credential::new("wx_demo", "s3cr3t"))?;
//! if let Some(credential) = store.get_credential()? {
//!     println!("AppID: {}", credential.app_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Secret columns are sealed with AES-256-GCM when a master key is configured
//! - Each sealed value has its own random nonce
//! - Without a key, values are stored as plaintext (development setups)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod encryption;
mod storage;

pub use storage::ConfigStore;

pub use encryption::{decrypt, encrypt, validate_key};

/// The persistence operations the token manager depends on.
///
/// [`ConfigStore`] is the production implementation. Each write is atomic:
/// `set_credential` and `clear_credential` also delete every stored token.
pub trait CredentialStore: Send + Sync {
    fn get_credential(&self) -> anyhow::Result<Option<Credential>>;
    fn set_credential(&self, credential: &Credential) -> anyhow::Result<()>;
    fn clear_credential(&self) -> anyhow::Result<()>;
    fn get_token(&self) -> anyhow::Result<Option<AccessToken>>;
    fn set_token(&self, token: &AccessToken) -> anyhow::Result<()>;
    fn clear_token(&self) -> anyhow::Result<()>;
}

/// The WeChat Official Account app credential.
///
/// Exactly one credential is active per process. `token` and `encoding_aes_key`
/// are the optional message-verification settings of the account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub encoding_aes_key: Option<String>,
}

impl Credential {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            token: None,
            encoding_aes_key: None,
        }
    }

    /// True when both the AppID and the AppSecret are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }

    /// First eight characters of the secret followed by an ellipsis.
    pub fn masked_secret(&self) -> String {
        let prefix: String = self.app_secret.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

// Never print the secret through Debug (tracing, panics).
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field(
                "encoding_aes_key",
                &self.encoding_aes_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A bearer access token issued by the WeChat token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token issued at `issued_at` that lives for `ttl_seconds`.
    pub fn issued(value: impl Into<String>, issued_at: DateTime<Utc>, ttl_seconds: i64) -> Self {
        Self {
            value: value.into(),
            issued_at,
            ttl_seconds,
            expires_at: Duration::try_seconds(ttl_seconds)
                .and_then(|ttl| issued_at.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// A token is usable only while `now < expires_at - skew`.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }

    /// Whole seconds until hard expiry, clamped at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Media kinds accepted by the WeChat material endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Voice,
    Video,
    Thumb,
    News,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Voice => "voice",
            MediaType::Video => "video",
            MediaType::Thumb => "thumb",
            MediaType::News => "news",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(MediaType::Image),
            "voice" => Some(MediaType::Voice),
            "video" => Some(MediaType::Video),
            "thumb" => Some(MediaType::Thumb),
            "news" => Some(MediaType::News),
            _ => None,
        }
    }

    /// Upload size limit in bytes. `None` for kinds that are not uploaded as files.
    pub fn size_limit(&self) -> Option<usize> {
        match self {
            MediaType::Image | MediaType::Voice => Some(2 * 1024 * 1024),
            MediaType::Video => Some(10 * 1024 * 1024),
            MediaType::Thumb => Some(64 * 1024),
            MediaType::News => None,
        }
    }

    /// File name used when the caller uploads raw data without one.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            MediaType::Voice => "media.mp3",
            MediaType::Video => "media.mp4",
            _ => "media.jpg",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of an uploaded media item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub media_id: String,
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
    pub name: Option<String>,
    /// Permanent material (true) or three-day temporary media (false).
    pub permanent: bool,
}
