use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Read-only view of the auto-reply rules configured in the admin console.
pub struct AutoReplyTool;

#[async_trait]
impl Tool for AutoReplyTool {
    fn name(&self) -> &str {
        "wechat_auto_reply"
    }

    fn description(&self) -> &str {
        "Show the auto-reply rules: follow reply, default reply and keyword replies"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["get_current_info"]}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        if action != "get_current_info" {
            bail!("Unknown action: {}", action);
        }
        let response = ctx.client.get("/cgi-bin/get_current_autoreply_info", &[]).await?;
        Ok(ToolResult::success(describe_rules(&response)))
    }
}

fn enabled(value: &Value, key: &str) -> &'static str {
    if args::int_field(value, key) == 1 {
        "on"
    } else {
        "off"
    }
}

fn describe_rules(info: &Value) -> String {
    let mut lines = vec!["Auto-reply rules".to_string()];

    lines.push(format!("Follow reply: {}", enabled(info, "is_add_friend_reply_open")));
    if let Some(reply) = info.get("add_friend_autoreply_info") {
        lines.push(format!(
            "  - {}: {}",
            args::str_field(reply, "type"),
            args::str_field(reply, "content")
        ));
    }

    lines.push(format!("Default reply: {}", enabled(info, "is_autoreply_open")));
    if let Some(reply) = info.get("message_default_autoreply_info") {
        lines.push(format!(
            "  - {}: {}",
            args::str_field(reply, "type"),
            args::str_field(reply, "content")
        ));
    }

    let rules = info
        .pointer("/keyword_autoreply_info/list")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    lines.push(format!("Keyword rules ({}):", rules.len()));
    for (index, rule) in rules.iter().enumerate() {
        let keywords: Vec<String> = rule
            .get("keyword_list_info")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|k| {
                        format!(
                            "{} ({})",
                            args::str_field(k, "content"),
                            args::str_field(k, "match_mode")
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        let replies = rule
            .get("reply_list_info")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        lines.push(format!(
            "  {}. {} [{}] keywords: {}; {} replies, mode {}",
            index + 1,
            args::or_dash(args::str_field(rule, "rule_name")),
            args::format_unix(args::int_field(rule, "create_time")),
            keywords.join(", "),
            replies,
            args::or_dash(args::str_field(rule, "reply_mode")),
        ));
    }

    lines.join("\n")
}
