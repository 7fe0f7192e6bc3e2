use super::{args, Tool, ToolContext, ToolResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MIN_OPENID_RECIPIENTS: usize = 2;
const MAX_OPENID_RECIPIENTS: usize = 10_000;

/// Broadcast messages to all followers, a tag, or an OpenID list.
pub struct MassSendTool;

#[async_trait]
impl Tool for MassSendTool {
    fn name(&self) -> &str {
        "wechat_mass_send"
    }

    fn description(&self) -> &str {
        "Mass send news, text, image, voice, video or card messages by tag or OpenID list, delete or preview them"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["send_by_tag", "send_by_openid", "delete", "preview"]},
                "isToAll": {"type": "boolean", "description": "Send to every follower (send_by_tag)"},
                "tagId": {"type": "integer", "minimum": 1, "description": "Target tag (send_by_tag)"},
                "toUser": {
                    "type": "array",
                    "items": {"type": "string", "minLength": 1},
                    "description": "2 to 10000 OpenIDs (send_by_openid)"
                },
                "msgtype": {"type": "string", "enum": ["mpnews", "text", "voice", "image", "mpvideo", "wxcard"]},
                "mediaId": {"type": "string", "minLength": 1, "description": "Media ID, or card ID for wxcard"},
                "content": {"type": "string", "description": "Text content (text)"},
                "sendIgnoreReprint": {"type": "integer", "enum": [0, 1], "description": "Send even when the article is judged a reprint"},
                "msgId": {"type": "integer", "minimum": 1, "description": "Mass message ID (delete)"},
                "articleIdx": {"type": "integer", "minimum": 0, "description": "Article to delete, 0 deletes all (delete)"},
                "previewToUser": {"type": "string", "minLength": 1, "description": "OpenID receiving the preview (preview)"}
            },
            "required": ["action"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolResult> {
        let action = args::action(args)?;
        match action.as_str() {
            "send_by_tag" => {
                let is_to_all = args::optional_bool(args, "isToAll")?.unwrap_or(false);
                let tag_id = args::optional_i64(args, "tagId")?;
                let mut filter = json!({"is_to_all": is_to_all});
                match (is_to_all, tag_id) {
                    (true, _) => {}
                    (false, Some(tag_id)) => filter["tag_id"] = json!(tag_id),
                    (false, None) => bail!("send_by_tag requires 'tagId' unless 'isToAll' is true"),
                }

                let mut body = message_body(args, &action, true)?;
                body["filter"] = filter;
                let response = ctx.client.post("/cgi-bin/message/mass/sendall", &body).await?;
                Ok(sent("Mass message sent", &response))
            }
            "send_by_openid" => {
                let recipients = args::required_string_array_for(args, "toUser", &action)?;
                if !(MIN_OPENID_RECIPIENTS..=MAX_OPENID_RECIPIENTS).contains(&recipients.len()) {
                    bail!(
                        "send_by_openid needs {} to {} recipients, got {}",
                        MIN_OPENID_RECIPIENTS,
                        MAX_OPENID_RECIPIENTS,
                        recipients.len()
                    );
                }

                let mut body = message_body(args, &action, true)?;
                body["touser"] = json!(recipients);
                let response = ctx.client.post("/cgi-bin/message/mass/send", &body).await?;
                Ok(sent(
                    &format!("Mass message sent to {} users", recipients.len()),
                    &response,
                ))
            }
            "delete" => {
                let msg_id = args::required_i64_for(args, "msgId", &action)?;
                let article_idx = args::i64_or(args, "articleIdx", 0)?;
                ctx.client
                    .post(
                        "/cgi-bin/message/mass/delete",
                        &json!({"msg_id": msg_id, "article_idx": article_idx}),
                    )
                    .await?;
                Ok(ToolResult::success(format!(
                    "Mass message {} deleted{}",
                    msg_id,
                    if article_idx == 0 {
                        String::new()
                    } else {
                        format!(" (article {})", article_idx)
                    }
                )))
            }
            "preview" => {
                let to_user = args::required_string_for(args, "previewToUser", &action)?;
                let mut body = message_body(args, &action, false)?;
                body["touser"] = Value::String(to_user.clone());
                let response = ctx.client.post("/cgi-bin/message/mass/preview", &body).await?;
                Ok(sent(&format!("Preview sent to {}", to_user), &response))
            }
            other => bail!("Unknown action: {}", other),
        }
    }
}

/// `msgtype` plus its payload, keyed the way the mass-send endpoints expect.
fn message_body(args: &Map<String, Value>, action: &str, allow_ignore_reprint: bool) -> Result<Value> {
    let Some(msgtype) = args::optional_string(args, "msgtype")? else {
        bail!("{} requires 'msgtype'", action);
    };

    let payload = match msgtype.as_str() {
        "text" => json!({"content": args::required_string_for(args, "content", &msgtype)?}),
        "wxcard" => json!({"card_id": args::required_string_for(args, "mediaId", &msgtype)?}),
        "mpnews" | "voice" | "image" | "mpvideo" => {
            json!({"media_id": args::required_string_for(args, "mediaId", &msgtype)?})
        }
        other => bail!("Unsupported msgtype '{}'", other),
    };

    let mut body = json!({"msgtype": msgtype});
    body[msgtype.as_str()] = payload;
    if allow_ignore_reprint && msgtype == "mpnews" {
        body["send_ignore_reprint"] = json!(args::i64_or(args, "sendIgnoreReprint", 0)?);
    }
    Ok(body)
}

fn sent(heading: &str, response: &Value) -> ToolResult {
    let mut text = format!("{}\n- Message ID: {}", heading, args::id_field(response, "msg_id"));
    if response.get("msg_data_id").is_some() {
        text.push_str(&format!(
            "\n- Article data ID: {}",
            args::id_field(response, "msg_data_id")
        ));
    }
    ToolResult::success(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{self, call, mock_context, offline_context};
    use mockito::Matcher;

    #[test]
    fn body_uses_snake_case_keys() {
        let a = testing::args(json!({"msgtype": "mpnews", "mediaId": "M", "sendIgnoreReprint": 1}));
        assert_eq!(
            message_body(&a, "send_by_tag", true).unwrap(),
            json!({"msgtype": "mpnews", "mpnews": {"media_id": "M"}, "send_ignore_reprint": 1})
        );
        assert_eq!(
            message_body(&a, "preview", false).unwrap(),
            json!({"msgtype": "mpnews", "mpnews": {"media_id": "M"}})
        );

        let a = testing::args(json!({"msgtype": "wxcard", "mediaId": "CARD"}));
        assert_eq!(message_body(&a, "preview", false).unwrap()["wxcard"], json!({"card_id": "CARD"}));
    }

    #[test]
    fn text_requires_content() {
        let a = testing::args(json!({"msgtype": "text"}));
        assert_eq!(
            message_body(&a, "send_by_tag", true).unwrap_err().to_string(),
            "text requires 'content'"
        );
    }

    #[tokio::test]
    async fn send_to_all() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let send = server
            .mock("POST", "/cgi-bin/message/mass/sendall")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "filter": {"is_to_all": true},
                "msgtype": "text",
                "text": {"content": "Hello all"}
            })))
            .with_body(r#"{"errcode":0,"errmsg":"send job submission success","msg_id":34182,"msg_data_id":206227730}"#)
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_mass_send",
            json!({"action": "send_by_tag", "isToAll": true, "msgtype": "text", "content": "Hello all"}),
        )
        .await;
        assert!(!result.is_error, "{}", result.text());
        assert!(result.text().contains("Message ID: 34182"));
        assert!(result.text().contains("Article data ID: 206227730"));
        send.assert_async().await;
    }

    #[tokio::test]
    async fn send_by_tag_needs_target() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_mass_send",
            json!({"action": "send_by_tag", "msgtype": "text", "content": "x"}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("requires 'tagId'"));
    }

    #[tokio::test]
    async fn openid_send_needs_two_recipients() {
        let ctx = offline_context();
        let result = call(
            &ctx,
            "wechat_mass_send",
            json!({"action": "send_by_openid", "toUser": ["o1"], "msgtype": "text", "content": "x"}),
        )
        .await;
        assert!(result.is_error);
        assert!(result.text().contains("2 to 10000 recipients"));
    }

    #[tokio::test]
    async fn send_by_openid_posts_list() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let send = server
            .mock("POST", "/cgi-bin/message/mass/send")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"touser": ["o1", "o2"], "image": {"media_id": "IMG"}})))
            .with_body(r#"{"errcode":0,"errmsg":"ok","msg_id":1}"#)
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_mass_send",
            json!({"action": "send_by_openid", "toUser": ["o1", "o2"], "msgtype": "image", "mediaId": "IMG"}),
        )
        .await;
        assert!(result.text().starts_with("Mass message sent to 2 users"), "{}", result.text());
        send.assert_async().await;
    }

    #[tokio::test]
    async fn delete_sends_article_index() {
        let mut server = mockito::Server::new_async().await;
        let (ctx, _token) = mock_context(&mut server).await;
        let delete = server
            .mock("POST", "/cgi-bin/message/mass/delete")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"msg_id": 30124, "article_idx": 2})))
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        let result = call(
            &ctx,
            "wechat_mass_send",
            json!({"action": "delete", "msgId": 30124, "articleIdx": 2}),
        )
        .await;
        assert_eq!(result.text(), "Mass message 30124 deleted (article 2)");
        delete.assert_async().await;
    }
}
