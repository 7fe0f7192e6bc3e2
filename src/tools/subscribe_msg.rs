use super::template_msg::template_data;
use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// One-time subscribe notifications.
pub struct SubscribeMsgTool;

#[async_trait]
impl Tool for SubscribeMsgTool {
    fn name(&self) -> &str {
        "wechat_subscribe_msg"
    }

    fn description(&self) -> &str {
        "Send a subscribe notification to a follower who has opted in"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["send"]},
                "toUser": {"type": "string", "minLength": 1},
                "templateId": {"type": "string", "minLength": 1},
                "page": {"type": "string", "description": "Web page opened from the notification"},
                "miniProgramAppId": {"type": "string"},
                "miniProgramPagePath": {"type": "string"},
                "data": {
                    "type": "object",
                    "description": "Template fields, e.g. {\"thing1\": {\"value\": \"Order shipped\"}}"
                }
            },
            "required": ["action", "toUser", "templateId", "data"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        if action != "send" {
            bail!("Unknown action: {}", action);
        }

        let to_user = args::required_string(args, "toUser")?;
        let template_id = args::required_string(args, "templateId")?;
        let data = template_data(args, &action, false)?;

        let mut body = json!({
            "touser": to_user,
            "template_id": template_id,
            "data": data,
        });
        if let Some(page) = args::optional_string(args, "page")? {
            body["page"] = Value::String(page);
        }
        match (
            args::optional_string(args, "miniProgramAppId")?,
            args::optional_string(args, "miniProgramPagePath")?,
        ) {
            (Some(appid), Some(pagepath)) => {
                body["miniprogram"] = json!({"appid": appid, "pagepath": pagepath});
            }
            (None, None) => {}
            _ => bail!("miniProgramAppId and miniProgramPagePath must be given together"),
        }

        let response = ctx
            .client
            .post("/cgi-bin/message/subscribe/bizsend", &body)
            .await?;
        let mut text = format!(
            "Subscribe notification sent\n- To: {}\n- Template: {}",
            to_user, template_id
        );
        if response.get("msgid").is_some() {
            text.push_str(&format!("\n- Message ID: {}", args::id_field(&response, "msgid")));
        }
        Ok(ToolResult::success(text))
    }
}
