use super::media::{with_video_description, MediaFile};
use super::{args, Tool, ToolContext, ToolResult};
use crate::credentials::{MediaRecord, MediaType};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Temporary media (valid for three days).
pub struct MediaUploadTool;

#[async_trait]
impl Tool for MediaUploadTool {
    fn name(&self) -> &str {
        "wechat_media_upload"
    }

    fn description(&self) -> &str {
        "Upload and fetch temporary media (image, voice, video, thumb) valid for 3 days"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["upload", "get", "list"]},
                "type": {
                    "type": "string",
                    "enum": ["image", "voice", "video", "thumb"],
                    "description": "Media type (upload, optional filter for list)"
                },
                "filePath": {"type": "string", "description": "Local file to upload"},
                "fileData": {"type": "string", "description": "Base64 file content, used instead of filePath"},
                "fileName": {"type": "string"},
                "title": {"type": "string", "description": "Video title"},
                "introduction": {"type": "string", "description": "Video description"},
                "mediaId": {"type": "string", "description": "Media ID (get)"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        match args::action(args)?.as_str() {
            "upload" => upload(ctx, args).await,
            "get" => {
                let media_id = args::required_string_for(args, "mediaId", "get")?;
                let download = ctx
                    .client
                    .download("/cgi-bin/media/get", &[("media_id", media_id.clone())], None)
                    .await?;

                // Video media comes back as JSON with a download URL.
                let is_json = download
                    .content_type
                    .as_deref()
                    .is_some_and(|ct| ct.contains("json") || ct.starts_with("text/plain"));
                if is_json {
                    if let Ok(value) = serde_json::from_slice::<Value>(&download.bytes) {
                        if let Some(url) = value.get("video_url").and_then(Value::as_str) {
                            return Ok(ToolResult::success(format!(
                                "Media {}\n- Video URL: {}",
                                media_id, url
                            )));
                        }
                    }
                }

                Ok(ToolResult::success(format!(
                    "Media {}\n- Size: {} bytes\n- Content type: {}",
                    media_id,
                    download.bytes.len(),
                    download.content_type.as_deref().unwrap_or("unknown"),
                )))
            }
            "list" => {
                let filter = args::optional_string(args, "type")?
                    .map(|raw| parse_type(&raw))
                    .transpose()?;
                let records = ctx.store.list_media(filter, Some(false))?;
                if records.is_empty() {
                    return Ok(ToolResult::success("No temporary media recorded"));
                }
                let lines: Vec<String> = records
                    .iter()
                    .map(|record| {
                        format!(
                            "- {} [{}] {} ({})",
                            record.media_id,
                            record.media_type,
                            record.name.as_deref().unwrap_or("-"),
                            record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        )
                    })
                    .collect();
                Ok(ToolResult::success(format!(
                    "Temporary media ({}):\n{}",
                    records.len(),
                    lines.join("\n")
                )))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

fn parse_type(raw: &str) -> Result<MediaType> {
    MediaType::parse(raw).ok_or_else(|| anyhow!("Unsupported media type '{}'", raw))
}

async fn upload(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let media_type = parse_type(&args::required_string_for(args, "type", "upload")?)?;
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
            "/cgi-bin/media/upload",
            &[("type", media_type.as_str().to_string())],
            form,
        )
        .await?;

    let media_id = response
        .get("media_id")
        .or_else(|| response.get("thumb_media_id"))
        .and_then(Value::as_str)
        .context("Upload response carried no media_id")?
        .to_string();
    let created_at = response
        .get("created_at")
        .and_then(Value::as_i64)
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(|| ctx.tokens.now());

    let record = MediaRecord {
        media_id: media_id.clone(),
        media_type,
        created_at,
        url: None,
        name: Some(name.clone()),
        permanent: false,
    };
    // The upload already succeeded remotely; a local bookkeeping failure is not fatal.
    if let Err(e) = ctx.store.save_media(&record) {
        warn!(media_id = %media_id, error = %e, "Failed to record uploaded media");
    }

    Ok(ToolResult::success(format!(
        "Temporary media uploaded\n- Media ID: {}\n- Type: {}\n- File: {}\n- Created: {}\n- Valid for 3 days",
        media_id,
        media_type,
        name,
        created_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )))
}
