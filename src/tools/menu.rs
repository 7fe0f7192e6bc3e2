use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MAX_TOP_BUTTONS: usize = 3;
const MAX_SUB_BUTTONS: usize = 5;

/// Custom and conditional menus.
pub struct MenuTool;

#[async_trait]
impl Tool for MenuTool {
    fn name(&self) -> &str {
        "wechat_menu"
    }

    fn description(&self) -> &str {
        "Manage the custom menu: create, get and delete menus, including conditional (personalised) menus"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "create",
                        "get",
                        "delete",
                        "add_conditional",
                        "delete_conditional",
                        "get_selfmenu_info"
                    ]
                },
                "menuData": {
                    "type": "object",
                    "description": "Menu definition with a `button` array; add_conditional also needs `matchrule`"
                },
                "menuId": {"type": "integer", "minimum": 1, "description": "Conditional menu ID (delete_conditional)"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        match action.as_str() {
            "create" => {
                let menu = required_menu(args, &action)?;
                check_buttons(menu)?;
                ctx.client.post("/cgi-bin/menu/create", &Value::Object(menu.clone())).await?;
                Ok(ToolResult::success(
                    "Custom menu created. Followers see it within 24 hours, or immediately after re-following.",
                ))
            }
            "get" => {
                let response = ctx.client.get("/cgi-bin/menu/get", &[]).await?;
                let buttons = response
                    .pointer("/menu/button")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut text = format!("Custom menu:\n{}", format_buttons(&buttons, 0));
                if let Some(conditional) = response.get("conditionalmenu").and_then(Value::as_array) {
                    for menu in conditional {
                        text.push_str(&format!(
                            "\n\nConditional menu {}:\n{}",
                            args::id_field(menu, "menuid"),
                            format_buttons(
                                menu.get("button").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]),
                                0
                            )
                        ));
                    }
                }
                Ok(ToolResult::success(text))
            }
            "delete" => {
                ctx.client.get("/cgi-bin/menu/delete", &[]).await?;
                Ok(ToolResult::success("Custom menu deleted, conditional menus included"))
            }
            "add_conditional" => {
                let menu = required_menu(args, &action)?;
                if !menu.get("matchrule").is_some_and(Value::is_object) {
                    bail!("add_conditional requires 'menuData.matchrule'");
                }
                check_buttons(menu)?;
                let response = ctx
                    .client
                    .post("/cgi-bin/menu/addconditional", &Value::Object(menu.clone()))
                    .await?;
                Ok(ToolResult::success(format!(
                    "Conditional menu created\n- Menu ID: {}",
                    args::id_field(&response, "menuid")
                )))
            }
            "delete_conditional" => {
                let menu_id = args::required_i64_for(args, "menuId", &action)?;
                ctx.client
                    .post("/cgi-bin/menu/delconditional", &json!({"menuid": menu_id}))
                    .await?;
                Ok(ToolResult::success(format!("Conditional menu {} deleted", menu_id)))
            }
            "get_selfmenu_info" => {
                let response = ctx.client.get("/cgi-bin/get_current_selfmenu_info", &[]).await?;
                let open = args::int_field(&response, "is_menu_open") == 1;
                let buttons = response
                    .pointer("/selfmenu_info/button")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                Ok(ToolResult::success(format!(
                    "Current menu ({}):\n{}",
                    if open { "enabled" } else { "disabled" },
                    format_buttons(&buttons, 0)
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

fn required_menu<'a>(args: &'a Map<String, Value>, action: &str) -> Result<&'a Map<String, Value>> {
    match args::optional_object(args, "menuData")? {
        Some(menu) => Ok(menu),
        None => bail!("{} requires 'menuData'", action),
    }
}

/// WeChat allows 1-3 top-level buttons with up to 5 sub-buttons each.
fn check_buttons(menu: &Map<String, Value>) -> Result<()> {
    let Some(buttons) = menu.get("button").and_then(Value::as_array) else {
        bail!("menuData.button must be an array");
    };
    if buttons.is_empty() || buttons.len() > MAX_TOP_BUTTONS {
        bail!(
            "menuData.button must hold 1 to {} buttons, got {}",
            MAX_TOP_BUTTONS,
            buttons.len()
        );
    }
    for (index, button) in buttons.iter().enumerate() {
        if let Some(subs) = button.get("sub_button").and_then(Value::as_array) {
            if subs.len() > MAX_SUB_BUTTONS {
                bail!(
                    "menuData.button[{}].sub_button holds at most {} buttons, got {}",
                    index,
                    MAX_SUB_BUTTONS,
                    subs.len()
                );
            }
        }
    }
    Ok(())
}

fn format_buttons(buttons: &[Value], depth: usize) -> String {
    let indent = "  ".repeat(depth);
    buttons
        .iter()
        .enumerate()
        .map(|(index, button)| {
            let mut line = format!("{}{}. {}", indent, index + 1, args::str_field(button, "name"));
            for (key, label) in [("type", ""), ("key", "key: "), ("url", "url: "), ("media_id", "media_id: ")] {
                let value = args::str_field(button, key);
                if value.is_empty() {
                    continue;
                }
                if label.is_empty() {
                    line.push_str(&format!(" ({})", value));
                } else {
                    line.push_str(&format!(" [{}{}]", label, value));
                }
            }

            // The selfmenu endpoint nests children under `sub_button.list`.
            let children = match button.get("sub_button") {
                Some(Value::Array(items)) => Some(items.as_slice()),
                Some(Value::Object(obj)) => obj.get("list").and_then(Value::as_array).map(Vec::as_slice),
                _ => None,
            };
            if let Some(children) = children.filter(|c| !c.is_empty()) {
                line.push('\n');
                line.push_str(&format_buttons(children, depth + 1));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
