use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Free publishing of drafts.
pub struct PublishTool;

#[async_trait]
impl Tool for PublishTool {
    fn name(&self) -> &str {
        "wechat_publish"
    }

    fn description(&self) -> &str {
        "Publish drafts and manage published articles: submit, get, delete, list"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["submit", "get", "delete", "list"]},
                "mediaId": {"type": "string", "description": "Draft media ID to publish (submit)"},
                "publishId": {"type": "string", "description": "Publish task ID (get)"},
                "articleId": {"type": "string", "description": "Published article ID (delete)"},
                "index": {"type": "integer", "minimum": 0, "description": "Article position to delete, 0 deletes all (delete)"},
                "offset": {"type": "integer", "minimum": 0, "default": 0},
                "count": {"type": "integer", "minimum": 1, "maximum": 20, "default": 20},
                "noContent": {"type": "boolean", "description": "Omit article content in list results", "default": true}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        match args::action(args)?.as_str() {
            "submit" => {
                let media_id = args::required_string_for(args, "mediaId", "submit")?;
                let response = ctx
                    .client
                    .post("/cgi-bin/freepublish/submit", &json!({"media_id": media_id}))
                    .await?;
                Ok(ToolResult::success(format!(
                    "Publish task submitted\n- Publish ID: {}\n- Draft: {}\nUse action \"get\" with the publish ID to follow its status.",
                    args::id_field(&response, "publish_id"),
                    media_id
                )))
            }
            "get" => {
                let publish_id = args::required_string_for(args, "publishId", "get")?;
                let response = ctx
                    .client
                    .post("/cgi-bin/freepublish/get", &json!({"publish_id": publish_id}))
                    .await?;

                let mut text = format!(
                    "Publish task {}\n- Status: {}\n- Article ID: {}",
                    publish_id,
                    status_label(args::int_field(&response, "publish_status")),
                    args::or_dash(args::str_field(&response, "article_id")),
                );
                if let Some(items) = response.pointer("/article_detail/item").and_then(Value::as_array) {
                    for item in items {
                        text.push_str(&format!(
                            "\n- Article {}: {}",
                            args::int_field(item, "idx"),
                            args::or_dash(args::str_field(item, "article_url")),
                        ));
                    }
                }
                if let Some(failed) = response.get("fail_idx").and_then(Value::as_array) {
                    if !failed.is_empty() {
                        text.push_str(&format!("\n- Failed articles: {}", Value::Array(failed.clone())));
                    }
                }
                Ok(ToolResult::success(text))
            }
            "delete" => {
                let article_id = args::required_string_for(args, "articleId", "delete")?;
                let index = args::i64_or(args, "index", 0)?;
                ctx.client
                    .post(
                        "/cgi-bin/freepublish/delete",
                        &json!({"article_id": article_id, "index": index}),
                    )
                    .await?;
                Ok(ToolResult::success(format!(
                    "Published article {} deleted. The source draft is kept.",
                    article_id
                )))
            }
            "list" => {
                let offset = args::i64_or(args, "offset", 0)?;
                let count = args::i64_or(args, "count", 20)?;
                let no_content = args::optional_bool(args, "noContent")?.unwrap_or(true);
                let response = ctx
                    .client
                    .post(
                        "/cgi-bin/freepublish/batchget",
                        &json!({"offset": offset, "count": count, "no_content": if no_content { 1 } else { 0 }}),
                    )
                    .await?;
                let items = response
                    .get("item")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let lines: Vec<String> = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let news = item
                            .pointer("/content/news_item")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        let first = news.first().cloned().unwrap_or(Value::Null);
                        format!(
                            "{}. {} - {}\n   URL: {}\n   Updated: {}",
                            offset.saturating_add(index as i64 + 1),
                            args::str_field(item, "article_id"),
                            args::or_dash(args::str_field(&first, "title")),
                            args::or_dash(args::str_field(&first, "url")),
                            args::format_unix(args::int_field(item, "update_time")),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Published articles ({} total, showing {}):\n{}",
                    args::int_field(&response, "total_count"),
                    items.len(),
                    lines.join("\n")
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

fn status_label(status: i64) -> &'static str {
    match status {
        0 => "published",
        1 => "publishing",
        2 => "original check failed",
        3 => "failed",
        4 => "rejected by platform review",
        5 => "deleted by user after success",
        6 => "banned after success",
        _ => "unknown",
    }
}
