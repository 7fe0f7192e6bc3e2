//! Contexts for tool tests.

use super::{ToolContext, ToolRegistry};
use crate::auth::{TokenManager, WechatTokenAuthority};
use crate::credentials::{ConfigStore, Credential};
use crate::wechat::WechatClient;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn context(base_url: &str, credential: Option<Credential>) -> ToolContext {
    let store = Arc::new(ConfigStore::new(":memory:", None).unwrap());
    let authority = Arc::new(WechatTokenAuthority::new(base_url, Duration::from_secs(5)).unwrap());
    let tokens = TokenManager::new(store.clone(), authority, chrono::Duration::seconds(300));
    if let Some(credential) = credential {
        tokens.set_credential(credential).unwrap();
    }
    let client = WechatClient::new(tokens, base_url, Duration::from_secs(5)).unwrap();
    ToolContext::new(client, store)
}

/// Unconfigured context whose endpoints are unreachable.
pub fn offline_context() -> ToolContext {
    context("http://127.0.0.1:9", None)
}

/// Configured context pointing at a mock server that serves `/cgi-bin/token`.
///
/// Keep the returned mock alive for the duration of the test.
pub async fn mock_context(server: &mut mockito::ServerGuard) -> (ToolContext, mockito::Mock) {
    let token_mock = server
        .mock("GET", "/cgi-bin/token")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"TKN1","expires_in":7200}"#)
        .create_async()
        .await;
    let ctx = context(&server.url(), Some(Credential::new("wx_demo", "s3cr3t")));
    (ctx, token_mock)
}

pub fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Runs a tool through the full registry path (schema validation included).
pub async fn call(ctx: &ToolContext, name: &str, arguments: Value) -> super::ToolResult {
    ToolRegistry::new(super::get_all_tools(), &[])
        .call(ctx, name, Some(arguments))
        .await
        .unwrap()
}
