mod common;

use cloudfs_core::{
    AccountDetails, Client, ClientConfig, Error, ErrorFamily, Exists, RestorePolicy,
    ServiceErrorKind, ShareUpdate, TransportError, sign,
};
use common::{TOKEN, client, file_meta, folder_meta, ok, service_error, unlinked_client};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const FORM: &str = "application/x-www-form-urlencoded; charset=utf-8";

fn header_value<'a>(request: &'a Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn authenticate_signs_request_and_links_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/oauth2/token"))
        .and(header("content-type", FORM))
        .and(body_string(
            "grant_type=password&password=p%40ss+word&username=user%40example.com",
        ))
        .and(|request: &Request| {
            let date = header_value(request, "date");
            let expected = sign(
                "/v2/oauth2/token",
                &[
                    ("grant_type", "password"),
                    ("password", "p@ss word"),
                    ("username", "user@example.com"),
                ],
                &[("Content-Type", FORM), ("Date", date)],
                "test-secret",
            )
            .unwrap();
            !date.is_empty()
                && header_value(request, "authorization")
                    == format!("BCS test-client:{expected}")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/ping"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ok(json!({})))
        .mount(&server)
        .await;

    let client = unlinked_client(&server);
    assert!(!client.has_token());
    client
        .authenticate("user@example.com", "p@ss word")
        .await
        .unwrap();
    assert!(client.is_linked().await);

    client.unlink();
    assert!(!client.is_linked().await);
}

#[tokio::test]
async fn create_account_is_signed_with_optional_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/admin/cloudfs/customers/"))
        .and(body_string("password=pw&username=new-user&email=a%40b.c"))
        .and(|request: &Request| {
            header_value(request, "authorization").starts_with("BCS test-client:")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "username": "new-user", "id": "u1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let details = AccountDetails {
        email: Some("a@b.c"),
        first_name: Some("  "),
        last_name: None,
    };
    let profile = unlinked_client(&server)
        .create_account("new-user", "pw", &details)
        .await
        .unwrap();
    assert_eq!(profile["id"], "u1");
}

#[tokio::test]
async fn authenticated_calls_without_token_fail_before_network() {
    let server = MockServer::start().await;
    let client = unlinked_client(&server);

    let err = client.list_folder("/", 1, None, false).await.unwrap_err();
    assert!(matches!(err, Error::SessionNotLinked));
    let err = client.get_file_meta("/a").await.unwrap_err();
    assert!(matches!(err, Error::SessionNotLinked));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_arguments_are_rejected_locally() {
    let server = MockServer::start().await;
    let client = client(&server);

    assert!(matches!(
        client.create_folder("/", " ", Exists::Fail).await,
        Err(Error::Argument(_))
    ));
    assert!(matches!(client.delete_file("", false).await, Err(Error::Argument(_))));
    assert!(matches!(client.create_share(&[]).await, Err(Error::Argument(_))));
    assert!(matches!(
        client.move_file("/a", "/b", "a", Exists::Reuse).await,
        Err(Error::Argument(_))
    ));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_folder_sends_depth_and_filter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/folders/p1"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(query_param("depth", "1"))
        .and(query_param("filter", "name=Docs"))
        .and(query_param("strict-traverse", "false"))
        .respond_with(ok(json!({
            "items": [folder_meta("d1", "Docs"), file_meta("f1", "a.txt", 4)]
        })))
        .mount(&server)
        .await;

    let items = client(&server)
        .list_folder("/p1", 1, Some("name=Docs"), false)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert!(items[0].item_type.is_folder());
    assert_eq!(items[1].size, Some(4));
}

#[tokio::test]
async fn create_folder_posts_name_and_directive() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/folders/p1"))
        .and(query_param("operation", "create"))
        .and(header("content-type", FORM))
        .and(body_string("name=New+Folder&exists=reuse"))
        .respond_with(ok(json!({ "items": [folder_meta("d9", "New Folder")] })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = client(&server)
        .create_folder("/p1", "New Folder", Exists::Reuse)
        .await
        .unwrap();
    assert_eq!(meta.id, "d9");
}

#[tokio::test]
async fn move_file_sends_destination_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/files/p1/f1"))
        .and(query_param("operation", "move"))
        .and(body_string("to=%2Fdest&exists=overwrite&name=b.txt"))
        .respond_with(ok(json!({ "meta": file_meta("f1", "b.txt", 1) })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = client(&server)
        .move_file("/p1/f1", "dest", "b.txt", Exists::Overwrite)
        .await
        .unwrap();
    assert_eq!(meta.name, "b.txt");
}

#[tokio::test]
async fn delete_folder_sends_commit_and_force() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v2/folders/d1"))
        .and(query_param("commit", "true"))
        .and(query_param("force", "true"))
        .respond_with(ok(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_folder("/d1", true, true).await.unwrap();
}

#[tokio::test]
async fn file_versions_use_operation_suffix() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/files/p1/f1/versions"))
        .and(query_param("start-version", "0"))
        .and(query_param("limit", "10"))
        .and(query_param("stop-version", "4"))
        .respond_with(ok(json!([file_meta("f1", "a.txt", 1)])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/files/p1/f1/versions/2"))
        .and(query_param("operation", "promote"))
        .respond_with(ok(json!({ "meta": file_meta("f1", "a.txt", 1) })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let versions = client
        .list_file_versions("/p1/f1", 0, Some(4), 10)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    client.promote_file_version("/p1/f1", 2).await.unwrap();
}

#[tokio::test]
async fn upload_sends_exists_part_before_file_part() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("local.txt");
    std::fs::write(&source, b"hello upload").unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/files/p1"))
        .and(body_string_contains("hello upload"))
        .and(|request: &Request| {
            let body = String::from_utf8_lossy(&request.body);
            let exists = body.find("name=\"exists\"");
            let file = body.find("name=\"file\"; filename=\"hello.txt\"");
            header_value(request, "content-type").starts_with("multipart/form-data")
                && body.contains("application/octet-stream")
                && matches!((exists, file), (Some(e), Some(f)) if e < f)
        })
        .respond_with(ok(json!({ "meta": file_meta("f7", "hello.txt", 12) })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = client(&server)
        .upload("/p1", &source, Some("hello.txt"), Exists::Overwrite)
        .await
        .unwrap();
    assert_eq!(meta.id, "f7");
    assert_eq!(meta.size, Some(12));
}

#[tokio::test]
async fn download_streams_requested_range() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/files/p1/f1"))
        .and(header("range", "bytes=2-5"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(b"cdef".to_vec()),
        )
        .mount(&server)
        .await;

    let mut received = Vec::new();
    client(&server)
        .download("/p1/f1", 2, 4, |chunk| {
            received.extend_from_slice(chunk);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(received, b"cdef");
}

#[tokio::test]
async fn download_rejects_range_past_u64() {
    let server = MockServer::start().await;

    let err = client(&server)
        .download("/p1/f1", u64::MAX, 2, |_| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_share_covers_all_paths_in_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/shares/"))
        .and(body_string("path=%2Fa&path=%2Fb%2Fc"))
        .respond_with(ok(json!({
            "share_key": "k1",
            "share_name": "shared",
            "url": "https://share.example/k1",
            "share_size": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(&server)
        .create_share(&["/a".to_string(), "b/c".to_string()])
        .await
        .unwrap();
    assert_eq!(info.share_key, "k1");
    assert_eq!(info.share_size, Some(10));
}

#[tokio::test]
async fn share_endpoints_build_key_paths() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/shares/k1/unlock"))
        .and(body_string("password=pw"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/shares/k1/info"))
        .and(body_string("current_password=old&name=renamed"))
        .respond_with(ok(json!({ "share_key": "k1", "share_name": "renamed" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/shares/k1/meta"))
        .respond_with(ok(json!({ "items": [file_meta("f1", "a.txt", 1)] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client.unlock_share("k1", "pw").await.unwrap();
    let info = client
        .alter_share_info(
            "k1",
            &ShareUpdate {
                current_password: Some("old"),
                password: None,
                name: Some("renamed"),
            },
        )
        .await
        .unwrap();
    assert_eq!(info.share_name.as_deref(), Some("renamed"));
    assert_eq!(client.browse_share("k1", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recover_trash_item_sends_policy_and_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/trash/f1"))
        .and(body_string("restore=rescue&rescue-path=%2Fsafe"))
        .respond_with(ok(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .recover_trash_item("/f1", RestorePolicy::Rescue, Some("safe"))
        .await
        .unwrap();
}

#[tokio::test]
async fn history_sends_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/history"))
        .and(query_param("start", "-10"))
        .respond_with(ok(json!([{ "action": "upload" }])))
        .expect(1)
        .mount(&server)
        .await;

    let history = client(&server).list_history(-10, 0).await.unwrap();
    assert_eq!(history[0]["action"], "upload");
}

#[tokio::test]
async fn structured_errors_are_translated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/folders/missing/meta"))
        .respond_with(service_error(404, 2002, "Folder does not exist"))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_folder_meta("/missing")
        .await
        .unwrap_err();
    assert_eq!(err.service_kind(), Some(ServiceErrorKind::FolderDoesNotExist));
    assert_eq!(err.family(), Some(ErrorFamily::Folder));
    match err {
        Error::Service(service) => {
            assert_eq!(service.code, Some(2002));
            assert_eq!(service.message, "Folder does not exist");
            assert_eq!(service.failure.status.as_u16(), 404);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unstructured_errors_keep_original_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/files/f1/meta"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_file_meta("/f1").await.unwrap_err();
    match err {
        Error::Service(service) => {
            assert_eq!(service.kind, ServiceErrorKind::Unclassified);
            assert_eq!(service.failure.status.as_u16(), 502);
            assert!(service.failure.body.contains("bad gateway"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let config = ClientConfig::new("id", "secret", "http://127.0.0.1:1").unwrap();
    let client = Client::new(&config).unwrap();
    client.set_access_token(TOKEN);

    let err = client.ping().await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(
        err,
        Error::Transport(TransportError::ConnectionFailed(_) | TransportError::Client(_))
    ));
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/ping"))
        .respond_with(ok(json!({})).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = common::config(&server).with_request_timeout(Duration::from_millis(200));
    let client = Client::new(&config).unwrap();
    client.set_access_token(TOKEN);

    let err = client.ping().await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
}
