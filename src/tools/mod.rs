//! MCP tools backed by the WeChat API.
//!
//! Each tool is a stateless [`Tool`] implementation. Shared resources (API client, token
//! manager, local store) arrive through [`ToolContext`] on every call.

use crate::auth::TokenManager;
use crate::credentials::ConfigStore;
use crate::wechat::WechatClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub mod args;
pub mod registry;
pub mod schema;

mod auth;
mod auto_reply;
mod customer_service;
mod draft;
mod mass_send;
mod media;
mod media_upload;
mod menu;
mod permanent_media;
mod publish;
mod statistics;
mod subscribe_msg;
mod tag;
mod template_msg;
mod upload_img;
mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{get_all_tools, ToolRegistry};

/// Tool interface for WeChat API operations.
///
/// Tools are stateless; all state lives in the [`ToolContext`].
///
/// # Example
/// ```no_run
/// use wechat_mcp::tools::{Tool, ToolContext, ToolResult};
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Map, Value};
///
/// struct MenuDelete;
///
/// #[async_trait]
/// impl Tool for MenuDelete {
///     fn name(&self) -> &str {
///         "menu_delete"
///     }
///
///     fn description(&self) -> &str {
///         "Delete the custom menu"
///     }
///
///     fn input_schema(&self) -> Value {
///         json!({"type": "object", "properties": {}})
///     }
///
///     async fn call(&self, ctx: &ToolContext, _args: &Map<String, Value>) -> Result<ToolResult> {
///         ctx.client.get("/cgi-bin/menu/delete", &[]).await?;
///         Ok(ToolResult::success("Menu deleted"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, e.g. `wechat_menu`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the `arguments` object.
    ///
    /// Arguments are validated against it before [`Tool::call`] runs.
    fn input_schema(&self) -> Value;

    /// Executes the tool.
    ///
    /// # Returns
    /// * `Ok(ToolResult)` - Result shown to the model (may itself be an error result)
    /// * `Err(...)` - Remote, auth or I/O failure; the registry turns it into an error result
    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult>;
}

/// Resources shared by every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub client: WechatClient,
    pub tokens: TokenManager,
    pub store: Arc<ConfigStore>,
}

impl ToolContext {
    pub fn new(client: WechatClient, store: Arc<ConfigStore>) -> Self {
        let tokens = client.tokens().clone();
        Self {
            client,
            tokens,
            store,
        }
    }
}

/// A single content block of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// Tool call result as sent back in `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Text block with a heading line followed by pretty-printed JSON.
    pub fn json(heading: &str, value: &Value) -> Self {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::success(format!("{}\n{}", heading, body))
    }

    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                Content::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
