use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MAX_TAGGING_USERS: usize = 50;

/// Follower tags.
pub struct TagTool;

#[async_trait]
impl Tool for TagTool {
    fn name(&self) -> &str {
        "wechat_tag"
    }

    fn description(&self) -> &str {
        "Manage follower tags: create, rename and delete tags, tag or untag users in batches"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "create",
                        "get_list",
                        "update",
                        "delete",
                        "batch_tagging",
                        "batch_untagging",
                        "get_tag_users"
                    ]
                },
                "tagName": {"type": "string", "minLength": 1, "maxLength": 30},
                "tagId": {"type": "integer", "minimum": 1},
                "openIdList": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "description": "Up to 50 OpenIDs (batch_tagging, batch_untagging)"
                },
                "nextOpenId": {"type": "string"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        match action.as_str() {
            "create" => {
                let name = args::required_string_for(args, "tagName", &action)?;
                let response = ctx
                    .client
                    .post("/cgi-bin/tags/create", &json!({"tag": {"name": name}}))
                    .await?;
                Ok(ToolResult::success(format!(
                    "Tag created\n- ID: {}\n- Name: {}",
                    args::id_field(response.get("tag").unwrap_or(&Value::Null), "id"),
                    name
                )))
            }
            "get_list" => {
                let response = ctx.client.get("/cgi-bin/tags/get", &[]).await?;
                let tags = response
                    .get("tags")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let lines: Vec<String> = tags
                    .iter()
                    .map(|tag| {
                        format!(
                            "- {} {} ({} users)",
                            args::int_field(tag, "id"),
                            args::str_field(tag, "name"),
                            args::int_field(tag, "count"),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Tags ({}):\n{}",
                    tags.len(),
                    lines.join("\n")
                )))
            }
            "update" => {
                let id = args::required_i64_for(args, "tagId", &action)?;
                let name = args::required_string_for(args, "tagName", &action)?;
                ctx.client
                    .post("/cgi-bin/tags/update", &json!({"tag": {"id": id, "name": name}}))
                    .await?;
                Ok(ToolResult::success(format!(
                    "Tag updated\n- ID: {}\n- Name: {}",
                    id, name
                )))
            }
            "delete" => {
                let id = args::required_i64_for(args, "tagId", &action)?;
                ctx.client
                    .post("/cgi-bin/tags/delete", &json!({"tag": {"id": id}}))
                    .await?;
                Ok(ToolResult::success(format!("Tag {} deleted", id)))
            }
            "batch_tagging" | "batch_untagging" => {
                let id = args::required_i64_for(args, "tagId", &action)?;
                let open_ids = args::required_string_array_for(args, "openIdList", &action)?;
                if open_ids.len() > MAX_TAGGING_USERS {
                    bail!(
                        "{} accepts at most {} users, got {}",
                        action,
                        MAX_TAGGING_USERS,
                        open_ids.len()
                    );
                }
                let (path, verb) = if action == "batch_tagging" {
                    ("/cgi-bin/tags/members/batchtagging", "tagged with")
                } else {
                    ("/cgi-bin/tags/members/batchuntagging", "removed from")
                };
                ctx.client
                    .post(path, &json!({"openid_list": open_ids, "tagid": id}))
                    .await?;
                Ok(ToolResult::success(format!(
                    "{} users {} tag {}\n- OpenIDs: {}",
                    open_ids.len(),
                    verb,
                    id,
                    open_ids.join(", ")
                )))
            }
            "get_tag_users" => {
                let id = args::required_i64_for(args, "tagId", &action)?;
                let mut body = json!({"tagid": id});
                if let Some(next) = args::optional_string(args, "nextOpenId")? {
                    body["next_openid"] = Value::String(next);
                }
                let response = ctx.client.post("/cgi-bin/user/tag/get", &body).await?;
                let openids: Vec<&str> = response
                    .pointer("/data/openid")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();

                let mut text = format!(
                    "Users with tag {}\n- Returned: {}\n- OpenIDs: {}",
                    id,
                    args::int_field(&response, "count"),
                    openids.join(", ")
                );
                let next = args::str_field(&response, "next_openid");
                if !next.is_empty() {
                    text.push_str(&format!("\n- Next OpenID: {}", next));
                }
                Ok(ToolResult::success(text))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}
