use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// WeChat only serves chat records for windows of up to one day.
const MAX_RECORD_WINDOW_SECONDS: i64 = 24 * 60 * 60;
const MAX_RECORDS: i64 = 10_000;

/// Customer service (48-hour window) messages.
pub struct CustomerServiceTool;

#[async_trait]
impl Tool for CustomerServiceTool {
    fn name(&self) -> &str {
        "wechat_customer_service"
    }

    fn description(&self) -> &str {
        "Customer service messages: send text, image, voice, video, music or news to a follower, read chat records"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "send_text",
                        "send_image",
                        "send_voice",
                        "send_video",
                        "send_music",
                        "send_news",
                        "send_mpnews",
                        "get_records"
                    ]
                },
                "toUser": {"type": "string", "minLength": 1, "description": "Recipient OpenID"},
                "content": {"type": "string"},
                "mediaId": {"type": "string", "minLength": 1},
                "thumbMediaId": {"type": "string"},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "musicUrl": {"type": "string"},
                "hqMusicUrl": {"type": "string"},
                "articles": {
                    "type": "array",
                    "description": "One article for send_news: {title, description, url, picurl}",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "url": {"type": "string"},
                            "picurl": {"type": "string"}
                        }
                    }
                },
                "startTime": {"type": "integer", "minimum": 1, "description": "Unix seconds (get_records)"},
                "endTime": {"type": "integer", "minimum": 1, "description": "Unix seconds (get_records)"},
                "msgId": {"type": "integer", "minimum": 1, "default": 1},
                "number": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 10000}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        if action == "get_records" {
            return get_records(ctx, args).await;
        }

        let to_user = args::required_string_for(args, "toUser", &action)?;
        let (msgtype, payload) = message_payload(args, &action)?;
        let mut body = json!({"touser": to_user, "msgtype": msgtype});
        body[msgtype] = payload;

        ctx.client.post("/cgi-bin/message/custom/send", &body).await?;
        Ok(ToolResult::success(format!(
            "Customer service {} message sent to {}",
            msgtype, to_user
        )))
    }
}

/// Maps a `send_*` action to the WeChat `msgtype` and its payload object.
fn message_payload(args: &Map<String, Value>, action: &str) -> Result<(&'static str, Value)> {
    let media = |key: &str| args::required_string_for(args, key, action);
    let text = |key: &str| -> Result<String> { Ok(args::optional_string(args, key)?.unwrap_or_default()) };

    Ok(match action {
        "send_text" => ("text", json!({"content": args::required_string_for(args, "content", action)?})),
        "send_image" => ("image", json!({"media_id": media("mediaId")?})),
        "send_voice" => ("voice", json!({"media_id": media("mediaId")?})),
        "send_video" => (
            "video",
            json!({
                "media_id": media("mediaId")?,
                "thumb_media_id": media("thumbMediaId")?,
                "title": text("title")?,
                "description": text("description")?,
            }),
        ),
        "send_music" => (
            "music",
            json!({
                "title": text("title")?,
                "description": text("description")?,
                "musicurl": media("musicUrl")?,
                "hqmusicurl": text("hqMusicUrl")?,
                "thumb_media_id": media("thumbMediaId")?,
            }),
        ),
        "send_news" => {
            let articles = match args::optional_array(args, "articles")? {
                Some(items) if items.len() == 1 => items.clone(),
                Some(items) if items.len() > 1 => {
                    bail!("send_news takes exactly one article, got {}", items.len())
                }
                _ => bail!("send_news requires 'articles'"),
            };
            ("news", json!({"articles": articles}))
        }
        "send_mpnews" => ("mpnews", json!({"media_id": media("mediaId")?})),
        other => bail!("Unknown action: {}", other),
    })
}

async fn get_records(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let start = args::required_i64_for(args, "startTime", "get_records")?;
    let end = args::required_i64_for(args, "endTime", "get_records")?;
    if end <= start {
        bail!("endTime must be after startTime");
    }
    if end - start > MAX_RECORD_WINDOW_SECONDS {
        bail!("startTime and endTime must be at most 24 hours apart");
    }
    let msg_id = args::i64_or(args, "msgId", 1)?;
    let number = args::i64_or(args, "number", MAX_RECORDS)?;

    let response = ctx
        .client
        .post(
            "/customservice/msgrecord/getmsglist",
            &json!({"starttime": start, "endtime": end, "msgid": msg_id, "number": number}),
        )
        .await?;

    let records = response
        .get("recordlist")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let lines: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            format!(
                "{}. {} / {} at {}: {}",
                index + 1,
                args::or_dash(args::str_field(record, "worker")),
                args::str_field(record, "openid"),
                args::format_unix(args::int_field(record, "time")),
                args::str_field(record, "text"),
            )
        })
        .collect();

    let mut text = format!("Chat records ({}):\n{}", records.len(), lines.join("\n"));
    if let Some(next) = response.get("msgid") {
        text.push_str(&format!("\nNext msgId: {}", next));
    }
    Ok(ToolResult::success(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{self, call, mock_context, offline_context};
    use mockito::Matcher;

    #[test]
    fn payloads_use_wire_keys() {
        let a = testing::args(json!({"mediaId": "M", "thumbMediaId": "T", "title": "Clip"}));
        let (msgtype, payload) = message_payload(&a, "send_video").unwrap();
        assert_eq!(msgtype, "video");
        assert_eq!(
            payload,
            json!({"media_id": "M", "thumb_media_id": "T", "title": "Clip", "description": ""})
        );

        let a = testing::args(json!({"musicUrl": "http://m", "thumbMediaId": "T"}));
        let (msgtype, payload) = message_payload(&a, "send_music").unwrap();
        assert_eq!(msgtype, "music");
        assert_eq!(payload["musicurl"], "http://m");
    }

    #[test]
    fn missing_media_names_action() {
        let a = testing::args(json!({}));
        assert_eq!(
            message_payload(&a, "send_image").unwrap_err().to_string(),
            "send_image requires 'mediaId'"
        );
    }

    #[test]
    fn news_takes_one_article() {
        let a = testing::args(json!({"articles": [{"title": "a"}, {"title": "b"}]}));
        assert!(message_payload(&a, "send_news").is_err());
    }

    #[tokio::test]
    async fn send_text_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let send = server
            .mock("POST", "/cgi-bin/message/custom/send")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "touser": "o1",
                "msgtype": "text",
                "text": {"content": "Hello"}
            })))
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_customer_service",
            json!({"action": "send_text", "toUser": "o1", "content": "Hello"}),
        )
        .await;
        assert_eq!(result.text(), "Customer service text message sent to o1");
        send.assert_async().await;
    }

    #[tokio::test]
    async fn outside_window_reports_remote_code() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let _send = server
            .mock("POST", "/cgi-bin/message/custom/send")
            .match_query(Matcher::Any)
            .with_body(r#"{"errcode":45015,"errmsg":"response out of time limit"}"#)
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_customer_service",
            json!({"action": "send_text", "toUser": "o1", "content": "Hello"}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("45015"));
    }

    #[tokio::test]
    async fn record_window_is_checked() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_customer_service",
            json!({"action": "get_records", "startTime": 1000, "endTime": 1000 + 90_000}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("24 hours"));
    }

    #[tokio::test]
    async fn records_are_listed() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let _records = server
            .mock("POST", "/customservice/msgrecord/getmsglist")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"starttime": 100, "endtime": 200, "msgid": 1, "number": 10000})))
            .with_body(
                r#"{"recordlist":[{"openid":"o1","opercode":2002,"text":"hi","time":0,"worker":"kf1"}],"number":1,"msgid":20165267}"#,
            )
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_customer_service",
            json!({"action": "get_records", "startTime": 100, "endTime": 200}),
        )
        .await;
        let text = result.text();
        assert!(text.contains("1. kf1 / o1 at 1970-01-01 00:00:00 UTC: hi"), "{}", text);
        assert!(text.contains("Next msgId: 20165267"));
    }
}
