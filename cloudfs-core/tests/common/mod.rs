#![allow(dead_code)]

use cloudfs_core::{Client, ClientConfig, FileSystem, Item};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new("test-client", "test-secret", server.uri()).unwrap()
}

pub fn unlinked_client(server: &MockServer) -> Client {
    init_tracing();
    Client::new(&config(server)).unwrap()
}

pub fn client(server: &MockServer) -> Client {
    let client = unlinked_client(server);
    client.set_access_token(TOKEN);
    client
}

pub fn filesystem(server: &MockServer) -> FileSystem {
    FileSystem::new(client(server))
}

pub fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": result }))
}

pub fn service_error(status: u16, code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "code": code, "message": message }
    }))
}

pub fn file_meta(id: &str, name: &str, size: u64) -> Value {
    json!({
        "id": id,
        "type": "file",
        "name": name,
        "version": 3,
        "size": size,
        "mime": "text/plain",
        "extension": "txt"
    })
}

pub fn folder_meta(id: &str, name: &str) -> Value {
    json!({ "id": id, "type": "folder", "name": name, "version": 1 })
}

/// Lists `parent` through a one-shot mock and returns the items.
pub async fn listed(server: &MockServer, parent: &str, items: Value) -> Vec<Item> {
    let mock_path = format!("/v2/folders{parent}");
    let guard = Mock::given(method("GET"))
        .and(path(mock_path))
        .and(query_param("depth", "1"))
        .respond_with(ok(json!({ "items": items })))
        .expect(1)
        .mount_as_scoped(server)
        .await;
    let items = filesystem(server).list(parent).await.unwrap();
    drop(guard);
    items
}

/// A file `f1` named `a.txt` of 10 bytes, listed under `/p1`.
pub async fn listed_file(server: &MockServer) -> Item {
    listed(server, "/p1", json!([file_meta("f1", "a.txt", 10)]))
        .await
        .remove(0)
}
