//! Tool registry - the set of tools exposed over MCP.

use super::schema::ArgumentValidator;
use super::{Tool, ToolContext, ToolResult};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Returns every built-in tool.
pub fn get_all_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(super::auth::AuthTool),
        Arc::new(super::media_upload::MediaUploadTool),
        Arc::new(super::upload_img::UploadImgTool),
        Arc::new(super::permanent_media::PermanentMediaTool),
        Arc::new(super::draft::DraftTool),
        Arc::new(super::publish::PublishTool),
        Arc::new(super::user::UserTool),
        Arc::new(super::tag::TagTool),
        Arc::new(super::menu::MenuTool),
        Arc::new(super::template_msg::TemplateMsgTool),
        Arc::new(super::customer_service::CustomerServiceTool),
        Arc::new(super::statistics::StatisticsTool),
        Arc::new(super::mass_send::MassSendTool),
        Arc::new(super::subscribe_msg::SubscribeMsgTool),
        Arc::new(super::auto_reply::AutoReplyTool),
    ]
}

/// A tool with its compiled input schema.
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: ArgumentValidator,
}

/// Enabled tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Builds a registry from `tools`, keeping only the names in `enabled`.
    ///
    /// An empty `enabled` list keeps every tool. Unknown names are logged and ignored, and a
    /// tool whose input schema does not compile is left out.
    pub fn new(tools: Vec<Arc<dyn Tool>>, enabled: &[String]) -> Self {
        for name in enabled {
            if !tools.iter().any(|tool| tool.name() == name) {
                warn!(tool = %name, "Enabled tool does not exist, ignoring");
            }
        }

        let tools: Vec<_> = if enabled.is_empty() {
            tools
        } else {
            tools
                .into_iter()
                .filter(|tool| enabled.iter().any(|name| name == tool.name()))
                .collect()
        };

        let tools: Vec<RegisteredTool> = tools
            .into_iter()
            .filter_map(|tool| match ArgumentValidator::compile(&tool.input_schema()) {
                Ok(validator) => Some(RegisteredTool { tool, validator }),
                Err(e) => {
                    error!(tool = %tool.name(), error = %e, "Skipping tool with invalid schema");
                    None
                }
            })
            .collect();

        info!(count = tools.len(), "Tool registry ready");
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.find(name).map(|entry| &entry.tool)
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|entry| entry.tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|entry| entry.tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool descriptors for `tools/list`.
    pub fn list(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|RegisteredTool { tool, .. }| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }

    /// Validates arguments and runs the named tool.
    ///
    /// # Returns
    /// * `None` - No enabled tool with that name
    /// * `Some(ToolResult)` - Tool output; validation failures, handler errors and panics
    ///   come back as error results
    pub async fn call(
        &self,
        ctx: &ToolContext,
        name: &str,
        arguments: Option<Value>,
    ) -> Option<ToolResult> {
        let RegisteredTool { tool, validator } = self.find(name)?;

        // Null arguments are treated as absent.
        let args: Map<String, Value> = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            Some(_) => {
                return Some(ToolResult::error(
                    "Invalid arguments: arguments must be an object",
                ))
            }
        };

        if let Err(e) = validator.validate(&Value::Object(args.clone())) {
            warn!(tool = %name, error = %e, "Rejected tool arguments");
            return Some(ToolResult::error(format!("Invalid arguments: {}", e)));
        }

        info!(tool = %name, "Calling tool");
        let outcome = AssertUnwindSafe(tool.call(ctx, &args)).catch_unwind().await;

        Some(match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                ToolResult::error(format!("{} failed: {:#}", name, e))
            }
            Err(_) => {
                warn!(tool = %name, "Tool call panicked");
                ToolResult::error(format!("{} failed: internal error", name))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string", "minLength": 1}},
                "required": ["message"]
            })
        }

        async fn call(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
            Ok(ToolResult::success(args["message"].as_str().unwrap_or_default()))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn call(&self, _ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
            if args.contains_key("panic") {
                panic!("handler bug");
            }
            bail!("upstream exploded")
        }
    }

    struct BrokenSchemaTool;

    #[async_trait]
    impl Tool for BrokenSchemaTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Schema with a misspelled type"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"count": {"type": "integr"}}})
        }

        async fn call(&self, _ctx: &ToolContext, _args: &Map<String, Value>) -> Result<ToolResult> {
            Ok(ToolResult::success("unreachable"))
        }
    }

    fn registry(enabled: &[String]) -> ToolRegistry {
        ToolRegistry::new(vec![Arc::new(EchoTool), Arc::new(FailingTool)], enabled)
    }

    #[test]
    fn test_get_all_tools() {
        let tools = get_all_tools();
        assert_eq!(tools.len(), 15);

        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert!(names.iter().all(|name| name.starts_with("wechat_")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 15, "tool names must be unique");

        for tool in &tools {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "{} schema must be an object", tool.name());
            assert!(!tool.description().is_empty());
        }
    }

    #[test]
    fn test_builtin_schemas_compile() {
        assert_eq!(ToolRegistry::new(get_all_tools(), &[]).len(), 15);
    }

    #[test]
    fn test_invalid_schema_is_skipped() {
        let registry = ToolRegistry::new(vec![Arc::new(EchoTool), Arc::new(BrokenSchemaTool)], &[]);
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn test_enable_list_filters() {
        let all = registry(&[]);
        assert_eq!(all.names(), vec!["echo", "failing"]);

        let only_echo = registry(&["echo".to_string(), "nope".to_string()]);
        assert_eq!(only_echo.names(), vec!["echo"]);
        assert!(only_echo.get("failing").is_none());
    }

    #[test]
    fn test_list_descriptors() {
        let listed = registry(&[]).list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["name"], "echo");
        assert_eq!(listed[0]["inputSchema"]["required"], json!(["message"]));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_none() {
        let ctx = testing::offline_context();
        assert!(registry(&[]).call(&ctx, "missing", None).await.is_none());
        assert!(registry(&["echo".to_string()])
            .call(&ctx, "failing", None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_successful_call() {
        let ctx = testing::offline_context();
        let result = registry(&[])
            .call(&ctx, "echo", Some(json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("hi"));
    }

    #[tokio::test]
    async fn test_validation_error_result() {
        let ctx = testing::offline_context();
        let result = registry(&[])
            .call(&ctx, "echo", Some(json!({})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "Invalid arguments: 'message' is required");

        let result = registry(&[])
            .call(&ctx, "echo", Some(json!(["not", "an", "object"])))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_null_arguments_are_absent() {
        let ctx = testing::offline_context();
        let result = registry(&[])
            .call(&ctx, "echo", Some(json!({"message": "hi", "extra": null})))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("hi"));

        let result = registry(&[])
            .call(&ctx, "echo", Some(json!({"message": null})))
            .await
            .unwrap();
        assert_eq!(result.text(), "Invalid arguments: 'message' is required");
    }

    #[tokio::test]
    async fn test_handler_error_captured() {
        let ctx = testing::offline_context();
        let result = registry(&[]).call(&ctx, "failing", None).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "failing failed: upstream exploded");
    }

    #[tokio::test]
    async fn test_handler_panic_captured() {
        let ctx = testing::offline_context();
        let result = registry(&[])
            .call(&ctx, "failing", Some(json!({"panic": true})))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.text().contains("internal error"));
    }
}
