//! File input shared by the upload tools: base64 `fileData` or a local `filePath`.

use super::args;
use crate::credentials::MediaType;
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Map, Value};
use std::path::Path;

pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl MediaFile {
    /// Reads `fileData` (preferred) or `filePath` from the arguments.
    pub async fn from_args(args: &Map<String, Value>, default_name: &str) -> Result<Self> {
        let file_name = args::optional_string(args, "fileName")?;

        if let Some(data) = args::optional_string(args, "fileData")? {
            let bytes = BASE64
                .decode(data.trim())
                .context("fileData is not valid base64")?;
            return Ok(Self {
                bytes,
                file_name: file_name.unwrap_or_else(|| default_name.to_string()),
            });
        }

        if let Some(path) = args::optional_string(args, "filePath")? {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read file {}", path))?;
            let file_name = file_name.unwrap_or_else(|| {
                Path::new(&path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(default_name)
                    .to_string()
            });
            return Ok(Self { bytes, file_name });
        }

        bail!("Either filePath or fileData is required")
    }

    /// Rejects files over the WeChat limit for `media_type`.
    pub fn check_size(&self, media_type: MediaType) -> Result<()> {
        if let Some(limit) = media_type.size_limit() {
            if self.bytes.len() > limit {
                bail!(
                    "{} file is {} bytes, the limit is {} bytes",
                    media_type,
                    self.bytes.len(),
                    limit
                );
            }
        }
        Ok(())
    }

    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }

    /// Multipart form with the file under the `media` field.
    pub fn into_form(self) -> Result<Form> {
        let mime = mime_for(&self.extension());
        let part = Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(mime)
            .context("Invalid MIME type")?;
        Ok(Form::new().part("media", part))
    }
}

/// Adds the `description` field WeChat requires for video uploads.
pub fn with_video_description(form: Form, args: &Map<String, Value>) -> Result<Form> {
    let title = args::optional_string(args, "title")?.unwrap_or_else(|| "Video".to_string());
    let introduction = args::optional_string(args, "introduction")?.unwrap_or_default();
    let description = json!({"title": title, "introduction": introduction});
    Ok(form.text("description", description.to_string()))
}

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "amr" => "audio/amr",
        "wma" => "audio/x-ms-wma",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
