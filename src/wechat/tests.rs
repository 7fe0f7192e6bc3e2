use super::*;
use crate::auth::WechatTokenAuthority;
use crate::credentials::{ConfigStore, Credential};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

/// Client whose token authority and API both point at the mock server.
fn client_for(server: &mockito::ServerGuard) -> WechatClient {
    let store = Arc::new(ConfigStore::new(":memory:", None).unwrap());
    let authority = Arc::new(WechatTokenAuthority::new(server.url(), Duration::from_secs(5)).unwrap());
    let tokens = TokenManager::new(store, authority, chrono::Duration::seconds(300));
    tokens
        .set_credential(Credential::new("wx_demo", "s3cr3t"))
        .unwrap();
    WechatClient::new(tokens, server.url(), Duration::from_secs(5)).unwrap()
}

async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/cgi-bin/token")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"TKN1","expires_in":7200}"#)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn get_appends_access_token() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = mock_token(&mut server).await;
    let api_mock = server
        .mock("GET", "/cgi-bin/user/get")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("access_token".into(), "TKN1".into()),
            Matcher::UrlEncoded("next_openid".into(), "OPENID0".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total":2,"count":2,"data":{"openid":["a","b"]}}"#)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let query = [("next_openid", "OPENID0".to_string())];
    let first = client.get("/cgi-bin/user/get", &query).await.unwrap();
    let second = client.get("/cgi-bin/user/get", &query).await.unwrap();

    assert_eq!(first["total"], 2);
    assert_eq!(first, second);
    token_mock.assert_async().await;
    api_mock.assert_async().await;
}

#[tokio::test]
async fn post_sends_json_body() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let api_mock = server
        .mock("POST", "/cgi-bin/tags/create")
        .match_query(Matcher::UrlEncoded("access_token".into(), "TKN1".into()))
        .match_body(Matcher::Json(json!({"tag": {"name": "vip"}})))
        .with_status(200)
        .with_body(r#"{"tag":{"id":134,"name":"vip"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let result = client
        .post("/cgi-bin/tags/create", &json!({"tag": {"name": "vip"}}))
        .await
        .unwrap();

    assert_eq!(result["tag"]["id"], 134);
    api_mock.assert_async().await;
}

#[tokio::test]
async fn errcode_becomes_remote_error() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _api_mock = server
        .mock("POST", "/cgi-bin/menu/create")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"errcode":40018,"errmsg":"invalid button name size"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .post("/cgi-bin/menu/create", &json!({"button": []}))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Remote {
            code: 40018,
            message: "invalid button name size".to_string()
        }
    );
}

#[tokio::test]
async fn zero_errcode_is_success() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _api_mock = server
        .mock("GET", "/cgi-bin/menu/delete")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let result = client.get("/cgi-bin/menu/delete", &[]).await.unwrap();
    assert_eq!(result["errmsg"], "ok");
}

#[tokio::test]
async fn http_failure_and_bad_json() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _down = server
        .mock("GET", "/cgi-bin/get_current_selfmenu_info")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;
    let _garbage = server
        .mock("GET", "/cgi-bin/get_current_autoreply_info")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .get("/cgi-bin/get_current_selfmenu_info", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http(ref msg) if msg.contains("502")));

    let err = client
        .get("/cgi-bin/get_current_autoreply_info", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn unconfigured_client_fails_without_network() {
    let server = mockito::Server::new_async().await;
    let store = Arc::new(ConfigStore::new(":memory:", None).unwrap());
    let authority = Arc::new(WechatTokenAuthority::new(server.url(), Duration::from_secs(5)).unwrap());
    let tokens = TokenManager::new(store, authority, chrono::Duration::seconds(300));
    let client = WechatClient::new(tokens, server.url(), Duration::from_secs(5)).unwrap();

    let err = client.get("/cgi-bin/user/get", &[]).await.unwrap_err();
    assert_eq!(err, ApiError::Auth(AuthError::NotConfigured));
}

#[tokio::test]
async fn download_returns_bytes_and_content_type() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = mock_token(&mut server).await;
    let _media = server
        .mock("GET", "/cgi-bin/media/get")
        .match_query(Matcher::UrlEncoded("media_id".into(), "MEDIA1".into()))
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body([0xFFu8, 0xD8, 0xFF, 0xE0])
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/cgi-bin/media/get")
        .match_query(Matcher::UrlEncoded("media_id".into(), "GONE".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errcode":40007,"errmsg":"invalid media_id"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let download = client
        .download("/cgi-bin/media/get", &[("media_id", "MEDIA1".to_string())], None)
        .await
        .unwrap();
    assert_eq!(download.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(download.content_type.as_deref(), Some("image/jpeg"));

    let err = client
        .download("/cgi-bin/media/get", &[("media_id", "GONE".to_string())], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Remote { code: 40007, .. }));
}

#[test]
fn check_errcode_passes_plain_bodies() {
    let body = json!({"media_id": "M1"});
    assert_eq!(check_errcode(body.clone()).unwrap(), body);
}
