use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Template messages.
pub struct TemplateMsgTool;

#[async_trait]
impl Tool for TemplateMsgTool {
    fn name(&self) -> &str {
        "wechat_template_msg"
    }

    fn description(&self) -> &str {
        "Template messages: send a template message, list or delete templates, get the account industry"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["send", "get_all_templates", "delete", "get_industry"]},
                "toUser": {"type": "string", "minLength": 1, "description": "Recipient OpenID (send)"},
                "templateId": {"type": "string", "minLength": 1},
                "url": {"type": "string", "description": "Link opened from the message"},
                "topColor": {"type": "string", "description": "Top colour as #RRGGBB"},
                "data": {
                    "type": "object",
                    "description": "Template fields, e.g. {\"first\": {\"value\": \"Hi\", \"color\": \"#173177\"}}"
                }
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        match action.as_str() {
            "send" => {
                let to_user = args::required_string_for(args, "toUser", &action)?;
                let template_id = args::required_string_for(args, "templateId", &action)?;
                let data = template_data(args, &action, true)?;

                let mut body = json!({
                    "touser": to_user,
                    "template_id": template_id,
                    "data": data,
                });
                if let Some(url) = args::optional_string(args, "url")? {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        bail!("'url' must be an http(s) URL");
                    }
                    body["url"] = Value::String(url);
                }
                if let Some(color) = args::optional_string(args, "topColor")? {
                    check_color("topColor", &color)?;
                    body["topcolor"] = Value::String(color);
                }

                let response = ctx.client.post("/cgi-bin/message/template/send", &body).await?;
                Ok(ToolResult::success(format!(
                    "Template message sent\n- To: {}\n- Template: {}\n- Message ID: {}",
                    to_user,
                    template_id,
                    args::id_field(&response, "msgid")
                )))
            }
            "get_all_templates" => {
                let response = ctx
                    .client
                    .get("/cgi-bin/template/get_all_private_template", &[])
                    .await?;
                let templates = response
                    .get("template_list")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let lines: Vec<String> = templates
                    .iter()
                    .enumerate()
                    .map(|(index, template)| {
                        format!(
                            "{}. {}\n   ID: {}\n   Content: {}\n   Example: {}",
                            index + 1,
                            args::str_field(template, "title"),
                            args::str_field(template, "template_id"),
                            args::str_field(template, "content").replace('\n', " "),
                            args::or_dash(args::str_field(template, "example")).replace('\n', " "),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Templates ({}):\n{}",
                    templates.len(),
                    lines.join("\n")
                )))
            }
            "delete" => {
                let template_id = args::required_string_for(args, "templateId", &action)?;
                ctx.client
                    .post(
                        "/cgi-bin/template/del_private_template",
                        &json!({"template_id": template_id}),
                    )
                    .await?;
                Ok(ToolResult::success(format!("Template {} deleted", template_id)))
            }
            "get_industry" => {
                let response = ctx.client.get("/cgi-bin/template/get_industry", &[]).await?;
                let describe = |key: &str| {
                    let industry = response.get(key).cloned().unwrap_or(Value::Null);
                    format!(
                        "{} / {}",
                        args::or_dash(args::str_field(&industry, "first_class")),
                        args::or_dash(args::str_field(&industry, "second_class")),
                    )
                };
                Ok(ToolResult::success(format!(
                    "Account industry\n- Primary: {}\n- Secondary: {}",
                    describe("primary_industry"),
                    describe("secondary_industry")
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

/// Reads the `data` argument: a non-empty object of `{"value": "...", "color"?: "#RRGGBB"}` fields.
pub(crate) fn template_data(
    args: &Map<String, Value>,
    action: &str,
    allow_color: bool,
) -> Result<Map<String, Value>> {
    let data = match args::optional_object(args, "data")? {
        Some(data) if !data.is_empty() => data,
        _ => bail!("{} requires 'data'", action),
    };
    for (key, field) in data {
        if !field.get("value").is_some_and(Value::is_string) {
            bail!("'data.{}.value' must be a string", key);
        }
        if let Some(color) = field.get("color") {
            if !allow_color {
                bail!("'data.{}.color' is not supported here", key);
            }
            check_color(&format!("data.{}.color", key), color.as_str().unwrap_or_default())?;
        }
    }
    Ok(data.clone())
}

fn check_color(name: &str, color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        bail!("'{}' must be a colour in #RRGGBB format", name);
    }
    Ok(())
}
