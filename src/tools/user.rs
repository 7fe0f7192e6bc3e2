use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MAX_BATCH_USERS: usize = 100;

/// Follower lookup, remarks and follower growth data.
pub struct UserTool;

#[async_trait]
impl Tool for UserTool {
    fn name(&self) -> &str {
        "wechat_user"
    }

    fn description(&self) -> &str {
        "Manage followers: list followers, get user info, set remarks and view follower growth"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "get_user_list",
                        "get_user_info",
                        "batch_get_user_info",
                        "set_remark",
                        "get_user_summary",
                        "get_user_cumulate"
                    ]
                },
                "nextOpenId": {"type": "string", "description": "Continue listing after this OpenID"},
                "openId": {"type": "string", "minLength": 1},
                "openIdList": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "description": "Up to 100 OpenIDs (batch_get_user_info)"
                },
                "remark": {"type": "string", "maxLength": 30},
                "lang": {"type": "string", "enum": ["zh_CN", "zh_TW", "en"], "default": "zh_CN"},
                "beginDate": {"type": "string", "format": "date"},
                "endDate": {"type": "string", "format": "date"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        let lang = args::optional_string(args, "lang")?.unwrap_or_else(|| "zh_CN".to_string());

        match action.as_str() {
            "get_user_list" => {
                let mut query = Vec::new();
                if let Some(next) = args::optional_string(args, "nextOpenId")? {
                    query.push(("next_openid", next));
                }
                let response = ctx.client.get("/cgi-bin/user/get", &query).await?;
                let openids: Vec<&str> = response
                    .pointer("/data/openid")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();

                let mut text = format!(
                    "Followers\n- Total: {}\n- Returned: {}\n- OpenIDs: {}",
                    args::int_field(&response, "total"),
                    args::int_field(&response, "count"),
                    openids.join(", ")
                );
                let next = args::str_field(&response, "next_openid");
                if !next.is_empty() {
                    text.push_str(&format!("\n- Next OpenID: {}", next));
                }
                Ok(ToolResult::success(text))
            }
            "get_user_info" => {
                let open_id = args::required_string_for(args, "openId", &action)?;
                let user = ctx
                    .client
                    .get("/cgi-bin/user/info", &[("openid", open_id), ("lang", lang)])
                    .await?;
                Ok(ToolResult::success(describe_user(&user)))
            }
            "batch_get_user_info" => {
                let open_ids = args::required_string_array_for(args, "openIdList", &action)?;
                if open_ids.len() > MAX_BATCH_USERS {
                    bail!(
                        "batch_get_user_info accepts at most {} users, got {}",
                        MAX_BATCH_USERS,
                        open_ids.len()
                    );
                }
                let user_list: Vec<Value> = open_ids
                    .iter()
                    .map(|open_id| json!({"openid": open_id, "lang": lang}))
                    .collect();
                let response = ctx
                    .client
                    .post("/cgi-bin/user/info/batchget", &json!({"user_list": user_list}))
                    .await?;
                let users = response
                    .get("user_info_list")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let lines: Vec<String> = users
                    .iter()
                    .map(|user| {
                        format!(
                            "- {} ({}) {}",
                            args::or_dash(args::str_field(user, "nickname")),
                            args::str_field(user, "openid"),
                            subscribe_label(user),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "User info for {} users:\n{}",
                    users.len(),
                    lines.join("\n")
                )))
            }
            "set_remark" => {
                let open_id = args::required_string_for(args, "openId", &action)?;
                let remark = match args.get("remark").and_then(Value::as_str) {
                    Some(remark) => remark.to_string(),
                    None => bail!("set_remark requires 'remark'"),
                };
                ctx.client
                    .post(
                        "/cgi-bin/user/info/updateremark",
                        &json!({"openid": open_id, "remark": remark}),
                    )
                    .await?;
                Ok(ToolResult::success(format!(
                    "Remark updated\n- OpenID: {}\n- Remark: {}",
                    open_id, remark
                )))
            }
            "get_user_summary" => {
                let (begin, end) = date_range(args, &action)?;
                let response = ctx
                    .client
                    .post(
                        "/datacube/getusersummary",
                        &json!({"begin_date": begin, "end_date": end}),
                    )
                    .await?;
                let lines = list_lines(&response, |item| {
                    format!(
                        "{}: +{} new, -{} unfollowed (source {})",
                        args::str_field(item, "ref_date"),
                        args::int_field(item, "new_user"),
                        args::int_field(item, "cancel_user"),
                        args::int_field(item, "user_source"),
                    )
                });
                Ok(ToolResult::success(format!(
                    "Follower changes ({} to {}):\n{}",
                    begin, end, lines
                )))
            }
            "get_user_cumulate" => {
                let (begin, end) = date_range(args, &action)?;
                let response = ctx
                    .client
                    .post(
                        "/datacube/getusercumulate",
                        &json!({"begin_date": begin, "end_date": end}),
                    )
                    .await?;
                let lines = list_lines(&response, |item| {
                    format!(
                        "{}: {} followers",
                        args::str_field(item, "ref_date"),
                        args::int_field(item, "cumulate_user"),
                    )
                });
                Ok(ToolResult::success(format!(
                    "Cumulative followers ({} to {}):\n{}",
                    begin, end, lines
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

/// Reads `beginDate`/`endDate`, both required by the datacube actions.
pub(crate) fn date_range(args: &Map<String, Value>, action: &str) -> Result<(String, String)> {
    let (Some(begin), Some(end)) = (
        args::optional_string(args, "beginDate")?,
        args::optional_string(args, "endDate")?,
    ) else {
        bail!("{} requires 'beginDate' and 'endDate'", action);
    };
    if begin > end {
        bail!("beginDate {} is after endDate {}", begin, end);
    }
    Ok((begin, end))
}

/// One formatted line per entry of the datacube `list` array.
pub(crate) fn list_lines(response: &Value, line: impl Fn(&Value) -> String) -> String {
    match response.get("list").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items.iter().map(line).collect::<Vec<_>>().join("\n"),
        _ => "No data".to_string(),
    }
}

fn subscribe_label(user: &Value) -> &'static str {
    if args::int_field(user, "subscribe") == 1 {
        "following"
    } else {
        "not following"
    }
}

fn describe_user(user: &Value) -> String {
    if args::int_field(user, "subscribe") != 1 {
        return format!(
            "User {} is not following the account",
            args::str_field(user, "openid")
        );
    }

    let mut text = format!(
        "User info\n- Nickname: {}\n- OpenID: {}\n- Language: {}\n- Followed at: {}\n- Subscribe scene: {}",
        args::or_dash(args::str_field(user, "nickname")),
        args::str_field(user, "openid"),
        args::or_dash(args::str_field(user, "language")),
        args::format_unix(args::int_field(user, "subscribe_time")),
        args::or_dash(args::str_field(user, "subscribe_scene")),
    );
    let remark = args::str_field(user, "remark");
    if !remark.is_empty() {
        text.push_str(&format!("\n- Remark: {}", remark));
    }
    let union_id = args::str_field(user, "unionid");
    if !union_id.is_empty() {
        text.push_str(&format!("\n- UnionID: {}", union_id));
    }
    if let Some(tags) = user.get("tagid_list").and_then(Value::as_array) {
        if !tags.is_empty() {
            text.push_str(&format!("\n- Tags: {}", Value::Array(tags.clone())));
        }
    }
    text
}
