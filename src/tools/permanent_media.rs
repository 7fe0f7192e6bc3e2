use super::media::{with_video_description, MediaFile};
use super::{args, Tool, ToolContext, ToolResult};
use crate::credentials::{MediaRecord, MediaType};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Permanent material library.
pub struct PermanentMediaTool;

#[async_trait]
impl Tool for PermanentMediaTool {
    fn name(&self) -> &str {
        "wechat_permanent_media"
    }

    fn description(&self) -> &str {
        "Manage permanent material: add, get, delete, list and count"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["add", "get", "delete", "list", "count"]},
                "type": {
                    "type": "string",
                    "enum": ["image", "voice", "video", "thumb", "news"],
                    "description": "Material type (add, list)"
                },
                "filePath": {"type": "string"},
                "fileData": {"type": "string", "description": "Base64 file content"},
                "fileName": {"type": "string"},
                "title": {"type": "string", "description": "Video title"},
                "introduction": {"type": "string", "description": "Video description"},
                "mediaId": {"type": "string", "description": "Material ID (get, delete)"},
                "offset": {"type": "integer", "minimum": 0, "default": 0},
                "count": {"type": "integer", "minimum": 1, "maximum": 20, "default": 20}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        match args::action(args)?.as_str() {
            "add" => add(ctx, args).await,
            "get" => {
                let media_id = args::required_string_for(args, "mediaId", "get")?;
                let download = ctx
                    .client
                    .download(
                        "/cgi-bin/material/get_material",
                        &[],
                        Some(&json!({"media_id": media_id})),
                    )
                    .await?;

                let value = download
                    .content_type
                    .as_deref()
                    .filter(|ct| ct.contains("json") || ct.starts_with("text/plain"))
                    .and_then(|_| serde_json::from_slice::<Value>(&download.bytes).ok());
                match value {
                    Some(value) => Ok(ToolResult::json(
                        &format!("Material {}:", media_id),
                        &value,
                    )),
                    None => Ok(ToolResult::success(format!(
                        "Material {}\n- Size: {} bytes\n- Content type: {}",
                        media_id,
                        download.bytes.len(),
                        download.content_type.as_deref().unwrap_or("unknown"),
                    ))),
                }
            }
            "delete" => {
                let media_id = args::required_string_for(args, "mediaId", "delete")?;
                ctx.client
                    .post("/cgi-bin/material/del_material", &json!({"media_id": media_id}))
                    .await?;
                if let Err(e) = ctx.store.delete_media(&media_id) {
                    warn!(media_id = %media_id, error = %e, "Failed to remove local media record");
                }
                Ok(ToolResult::success(format!("Material {} deleted", media_id)))
            }
            "list" => {
                let media_type = parse_type(&args::required_string_for(args, "type", "list")?)?;
                let offset = args::i64_or(args, "offset", 0)?;
                let count = args::i64_or(args, "count", 20)?;
                let response = ctx
                    .client
                    .post(
                        "/cgi-bin/material/batchget_material",
                        &json!({"type": media_type.as_str(), "offset": offset, "count": count}),
                    )
                    .await?;

                let items = response
                    .get("item")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let lines: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let name = match args::str_field(item, "name") {
                            "" => item
                                .pointer("/content/news_item/0/title")
                                .and_then(Value::as_str)
                                .unwrap_or("-"),
                            name => name,
                        };
                        format!(
                            "- {} {} ({})",
                            args::str_field(item, "media_id"),
                            name,
                            args::format_unix(args::int_field(item, "update_time")),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "{} material: {} total, showing {} from offset {}\n{}",
                    media_type,
                    args::int_field(&response, "total_count"),
                    items.len(),
                    offset,
                    lines.join("\n")
                )))
            }
            "count" => {
                let response = ctx.client.get("/cgi-bin/material/get_materialcount", &[]).await?;
                Ok(ToolResult::success(format!(
                    "Material counts\n- Images: {}\n- Voices: {}\n- Videos: {}\n- News: {}",
                    args::int_field(&response, "image_count"),
                    args::int_field(&response, "voice_count"),
                    args::int_field(&response, "video_count"),
                    args::int_field(&response, "news_count"),
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

fn parse_type(raw: &str) -> Result<MediaType> {
    MediaType::parse(raw).ok_or_else(|| anyhow!("Unsupported material type '{}'", raw))
}

async fn add(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let media_type = parse_type(&args::required_string_for(args, "type", "add")?)?;
    if media_type == MediaType::News {
        bail!("News material is created through wechat_draft");
    }
    let file = MediaFile::from_args(args, media_type.default_file_name()).await?;
    file.check_size(media_type)?;

    let name = file.file_name.clone();
    let mut form = file.into_form()?;
    if media_type == MediaType::Video {
        form = with_video_description(form, args)?;
    }

    let response = ctx
        .client
        .upload(
            "/cgi-bin/material/add_material",
            &[("type", media_type.as_str().to_string())],
            form,
        )
        .await?;
    let media_id = response
        .get("media_id")
        .and_then(Value::as_str)
        .context("Upload response carried no media_id")?
        .to_string();
    let url = response.get("url").and_then(Value::as_str).map(str::to_string);

    let record = MediaRecord {
        media_id: media_id.clone(),
        media_type,
        created_at: ctx.tokens.now(),
        url: url.clone(),
        name: Some(name.clone()),
        permanent: true,
    };
    if let Err(e) = ctx.store.save_media(&record) {
        warn!(media_id = %media_id, error = %e, "Failed to record uploaded material");
    }

    let mut text = format!(
        "Permanent material added\n- Media ID: {}\n- Type: {}\n- File: {}",
        media_id, media_type, name
    );
    if let Some(url) = url {
        text.push_str(&format!("\n- URL: {}", url));
    }
    Ok(ToolResult::success(text))
}
