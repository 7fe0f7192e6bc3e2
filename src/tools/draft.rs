use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const PREVIEW_CHARS: usize = 100;

/// Article drafts.
pub struct DraftTool;

#[async_trait]
impl Tool for DraftTool {
    fn name(&self) -> &str {
        "wechat_draft"
    }

    fn description(&self) -> &str {
        "Manage article drafts: add, get, delete, list and count"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["add", "get", "delete", "list", "count"]},
                "mediaId": {"type": "string", "description": "Draft media ID (get, delete)"},
                "articles": {
                    "type": "array",
                    "description": "Articles of the draft (add)",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string", "minLength": 1},
                            "author": {"type": "string"},
                            "digest": {"type": "string"},
                            "content": {"type": "string", "minLength": 1},
                            "contentSourceUrl": {"type": "string"},
                            "thumbMediaId": {"type": "string", "minLength": 1},
                            "showCoverPic": {"type": "integer", "enum": [0, 1]},
                            "needOpenComment": {"type": "integer", "enum": [0, 1]},
                            "onlyFansCanComment": {"type": "integer", "enum": [0, 1]}
                        },
                        "required": ["title", "content", "thumbMediaId"]
                    }
                },
                "offset": {"type": "integer", "minimum": 0, "default": 0},
                "count": {"type": "integer", "minimum": 1, "maximum": 20, "default": 20}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        match args::action(args)?.as_str() {
            "add" => {
                let articles = match args::optional_array(args, "articles")? {
                    Some(items) if !items.is_empty() => items,
                    _ => bail!("add requires 'articles'"),
                };
                let body = json!({"articles": articles.iter().map(to_wire_article).collect::<Vec<_>>()});
                let response = ctx.client.post("/cgi-bin/draft/add", &body).await?;
                Ok(ToolResult::success(format!(
                    "Draft created\n- Media ID: {}\n- Articles: {}",
                    args::str_field(&response, "media_id"),
                    articles.len()
                )))
            }
            "get" => {
                let media_id = args::required_string_for(args, "mediaId", "get")?;
                let response = ctx
                    .client
                    .post("/cgi-bin/draft/get", &json!({"media_id": media_id}))
                    .await?;
                let articles = response
                    .get("news_item")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .enumerate()
                            .map(|(index, item)| describe_article(index, item))
                            .collect::<Vec<_>>()
                            .join("\n\n")
                    })
                    .unwrap_or_default();
                Ok(ToolResult::success(format!(
                    "Draft {}\n- Created: {}\n- Updated: {}\n\n{}",
                    media_id,
                    args::format_unix(args::int_field(&response, "create_time")),
                    args::format_unix(args::int_field(&response, "update_time")),
                    articles
                )))
            }
            "delete" => {
                let media_id = args::required_string_for(args, "mediaId", "delete")?;
                ctx.client
                    .post("/cgi-bin/draft/delete", &json!({"media_id": media_id}))
                    .await?;
                Ok(ToolResult::success(format!("Draft {} deleted", media_id)))
            }
            "list" => {
                let offset = args::i64_or(args, "offset", 0)?;
                let count = args::i64_or(args, "count", 20)?;
                let response = ctx
                    .client
                    .post("/cgi-bin/draft/batchget", &json!({"offset": offset, "count": count}))
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
                        let more = if news.len() > 1 {
                            format!(" ({} articles)", news.len())
                        } else {
                            String::new()
                        };
                        format!(
                            "{}. {} - {}{}\n   Updated: {}",
                            offset.saturating_add(index as i64 + 1),
                            args::str_field(item, "media_id"),
                            args::str_field(&first, "title"),
                            more,
                            args::format_unix(item.pointer("/content/update_time").and_then(Value::as_i64).unwrap_or(0)),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Drafts ({} total, showing {}):\n{}",
                    args::int_field(&response, "total_count"),
                    items.len(),
                    lines.join("\n")
                )))
            }
            "count" => {
                let response = ctx.client.post("/cgi-bin/draft/count", &json!({})).await?;
                Ok(ToolResult::success(format!(
                    "Total drafts: {}",
                    args::int_field(&response, "total_count")
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

/// Converts a camelCase article argument into the snake_case shape WeChat expects.
fn to_wire_article(article: &Value) -> Value {
    json!({
        "title": args::str_field(article, "title"),
        "author": args::str_field(article, "author"),
        "digest": args::str_field(article, "digest"),
        "content": args::str_field(article, "content"),
        "content_source_url": args::str_field(article, "contentSourceUrl"),
        "thumb_media_id": args::str_field(article, "thumbMediaId"),
        "show_cover_pic": args::int_field(article, "showCoverPic"),
        "need_open_comment": args::int_field(article, "needOpenComment"),
        "only_fans_can_comment": args::int_field(article, "onlyFansCanComment"),
    })
}

fn describe_article(index: usize, item: &Value) -> String {
    let content = args::str_field(item, "content");
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!(
        "Article {}\n- Title: {}\n- Author: {}\n- Digest: {}\n- Content: {}\n- Source URL: {}\n- Thumb media ID: {}",
        index + 1,
        args::str_field(item, "title"),
        args::or_dash(args::str_field(item, "author")),
        args::or_dash(args::str_field(item, "digest")),
        preview,
        args::or_dash(args::str_field(item, "content_source_url")),
        args::str_field(item, "thumb_media_id"),
    )
}
