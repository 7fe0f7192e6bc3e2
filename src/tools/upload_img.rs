use super::media::MediaFile;
use super::{Tool, ToolContext, ToolResult};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MAX_ARTICLE_IMAGE_BYTES: usize = 1024 * 1024;

/// Uploads an image for use inside article content.
///
/// The returned URL is only valid within WeChat article bodies and does not count
/// against the material quota.
pub struct UploadImgTool;

#[async_trait]
impl Tool for UploadImgTool {
    fn name(&self) -> &str {
        "wechat_upload_img"
    }

    fn description(&self) -> &str {
        "Upload an image (jpg/png, under 1MB) for use inside article content and get its URL"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filePath": {"type": "string", "description": "Local image file"},
                "fileData": {"type": "string", "description": "Base64 image content"},
                "fileName": {"type": "string", "description": "File name, defaults to image.jpg"}
            }
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let file = MediaFile::from_args(args, "image.jpg").await?;

        let extension = file.extension();
        if !matches!(extension.as_str(), "jpg" | "jpeg" | "png") {
            bail!("Only jpg and png images are supported, got '{}'", file.file_name);
        }
        if file.bytes.len() > MAX_ARTICLE_IMAGE_BYTES {
            bail!(
                "Image is {} bytes, the limit is {} bytes",
                file.bytes.len(),
                MAX_ARTICLE_IMAGE_BYTES
            );
        }

        let name = file.file_name.clone();
        let size = file.bytes.len();
        let response = ctx
            .client
            .upload("/cgi-bin/media/uploadimg", &[], file.into_form()?)
            .await?;
        let url = response
            .get("url")
            .and_then(Value::as_str)
            .context("Upload response carried no url")?;

        Ok(ToolResult::success(format!(
            "Article image uploaded\n- URL: {}\n- File: {}\n- Size: {} bytes",
            url, name, size
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::testing::{call, mock_context, offline_context};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde_json::json;

    #[tokio::test]
    async fn uploads_and_returns_url() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let upload = server
            .mock("POST", "/cgi-bin/media/uploadimg")
            .match_query(mockito::Matcher::UrlEncoded("access_token".into(), "TKN1".into()))
            .with_body(r#"{"url":"http://mmbiz.qpic.cn/img.jpg"}"#)
            .create_async()
            .await;

        let result = call(&ctx, "wechat_upload_img", json!({"fileData": BASE64.encode(b"jpeg")})).await;
        assert!(!result.is_error, "{}", result.text());
        assert!(result.text().contains("http://mmbiz.qpic.cn/img.jpg"));
        assert!(result.text().contains("image.jpg"));
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn rejects_other_formats() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_upload_img",
            json!({"fileData": BASE64.encode(b"gif"), "fileName": "a.gif"}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("Only jpg and png"));
    }

    #[tokio::test]
    async fn rejects_large_images() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_upload_img",
            json!({"fileData": BASE64.encode(vec![0u8; 1024 * 1024 + 1]), "fileName": "big.png"}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("limit"));
    }
}
