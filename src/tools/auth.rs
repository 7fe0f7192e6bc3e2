use super::{args, Tool, ToolContext, ToolResult};
use crate::credentials::Credential;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Credential configuration and access-token inspection.
pub struct AuthTool;

#[async_trait]
impl Tool for AuthTool {
    fn name(&self) -> &str {
        "wechat_auth"
    }

    fn description(&self) -> &str {
        "Manage the WeChat Official Account credential (AppID/AppSecret) and access token"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["configure", "get_token", "refresh_token", "get_config", "clear"],
                    "description": "configure: save credential, get_token: current token, refresh_token: force a new token, get_config: show credential, clear: remove credential and token"
                },
                "appId": {"type": "string", "description": "Official Account AppID (configure)"},
                "appSecret": {"type": "string", "description": "Official Account AppSecret (configure)"},
                "token": {"type": "string", "description": "Message verification token (optional)"},
                "encodingAESKey": {"type": "string", "description": "Message encryption key (optional)"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        match args::action(args)?.as_str() {
            "configure" => {
                let (Some(app_id), Some(app_secret)) = (
                    args::optional_string(args, "appId")?,
                    args::optional_string(args, "appSecret")?,
                ) else {
                    bail!("appId and appSecret are required for configure");
                };
                let credential = Credential {
                    app_id,
                    app_secret,
                    token: args::optional_string(args, "token")?,
                    encoding_aes_key: args::optional_string(args, "encodingAESKey")?,
                };
                let summary = format!(
                    "WeChat credential saved\n- AppID: {}\n- Token: {}\n- EncodingAESKey: {}",
                    credential.app_id,
                    if credential.token.is_some() { "set" } else { "not set" },
                    if credential.encoding_aes_key.is_some() { "set" } else { "not set" },
                );
                ctx.tokens.set_credential(credential)?;
                Ok(ToolResult::success(summary))
            }
            "get_token" => {
                let token = ctx.tokens.get_token().await?;
                Ok(ToolResult::success(format!(
                    "Access token\n- Token: {}\n- Expires in: {} seconds\n- Expires at: {}",
                    token.value,
                    token.remaining_seconds(ctx.tokens.now()),
                    token.expires_at.to_rfc3339(),
                )))
            }
            "refresh_token" => {
                let token = ctx.tokens.refresh_token().await?;
                Ok(ToolResult::success(format!(
                    "Access token refreshed\n- Token: {}\n- Valid for: {} seconds\n- Expires at: {}",
                    token.value,
                    token.ttl_seconds,
                    token.expires_at.to_rfc3339(),
                )))
            }
            "get_config" => {
                let Some(credential) = ctx.tokens.get_credential()? else {
                    return Ok(ToolResult::success(
                        "No WeChat credential configured. Run wechat_auth with action \"configure\" first.",
                    ));
                };
                let token_status = match ctx.tokens.cached_token() {
                    Some(token) if token.is_fresh(ctx.tokens.now(), ctx.tokens.refresh_skew()) => {
                        format!("valid until {}", token.expires_at.to_rfc3339())
                    }
                    Some(_) => "expired".to_string(),
                    None => "none".to_string(),
                };
                Ok(ToolResult::success(format!(
                    "Current WeChat configuration\n- AppID: {}\n- AppSecret: {}\n- Token: {}\n- EncodingAESKey: {}\n- Access token: {}",
                    credential.app_id,
                    credential.masked_secret(),
                    credential.token.as_deref().unwrap_or("not set"),
                    credential.encoding_aes_key.as_deref().unwrap_or("not set"),
                    token_status,
                )))
            }
            "clear" => {
                ctx.tokens.clear()?;
                Ok(ToolResult::success("WeChat credential and access token removed"))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::testing::{call, mock_context, offline_context};
    use serde_json::json;

    #[tokio::test]
    async fn configure_then_get_config_masks_secret() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_auth",
            json!({"action": "configure", "appId": "wx_demo", "appSecret": "abcdefghijklmnop"}),
        )
        .await;
        assert!(!result.is_error, "{}", result.text());
        assert!(ctx.tokens.is_configured());

        let result = call(&ctx, "wechat_auth", json!({"action": "get_config"})).await;
        let text = result.text();
        assert!(text.contains("wx_demo"));
        assert!(text.contains("abcdefgh..."));
        assert!(!text.contains("abcdefghijklmnop"));
        assert!(text.contains("Access token: none"));
    }

    #[tokio::test]
    async fn configure_requires_both_fields() {
        let ctx = offline_context();
        let result = call(&ctx, "wechat_auth", json!({"action": "configure", "appId": "wx"})).await;
        assert!(result.is_error);
        assert!(result.text().contains("appId and appSecret are required"));
    }

    #[tokio::test]
    async fn get_config_when_unconfigured() {
        let ctx = offline_context();
        let result = call(&ctx, "wechat_auth", json!({"action": "get_config"})).await;
        assert!(!result.is_error);
        assert!(result.text().contains("No WeChat credential configured"));
    }

    #[tokio::test]
    async fn get_token_when_unconfigured_reports_it() {
        let ctx = offline_context();
        let result = call(&ctx, "wechat_auth", json!({"action": "get_token"})).await;
        assert!(result.is_error);
        assert!(result.text().contains("not configured"));
    }

    #[tokio::test]
    async fn get_token_and_clear() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, token_mock) = mock_context(&mut server).await;

        let result = call(&ctx, "wechat_auth", json!({"action": "get_token"})).await;
        assert!(!result.is_error, "{}", result.text());
        assert!(result.text().contains("TKN1"));

        let result = call(&ctx, "wechat_auth", json!({"action": "get_config"})).await;
        assert!(result.text().contains("valid until"));

        let result = call(&ctx, "wechat_auth", json!({"action": "clear"})).await;
        assert!(!result.is_error);
        assert!(!ctx.tokens.is_configured());
        assert!(ctx.store.get_credential().unwrap().is_none());

        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_action_rejected_by_schema() {
        let ctx = offline_context();
        let result = call(&ctx, "wechat_auth", json!({"action": "rotate"})).await;
        assert!(result.is_error);
        assert!(result.text().starts_with("Invalid arguments"));
    }
}
