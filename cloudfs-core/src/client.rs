use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use reqwest::{Method, Response};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use crate::changes::ChangeSet;
use crate::config::ClientConfig;
use crate::conflict::{Exists, Operation, RestorePolicy, VersionConflict};
use crate::connection::{Body, Connection, FORM_CONTENT_TYPE, RawResponse};
use crate::error::Error;
use crate::model::{Metadata, ShareInfo, ShareUpdate, decode, items_of, meta_of};
use crate::path::{self, require};
use crate::signer;

pub const ENDPOINT_OAUTH: &str = "/v2/oauth2/token";
pub const ENDPOINT_PING: &str = "/v2/ping";
pub const ENDPOINT_CUSTOMERS: &str = "/v2/admin/cloudfs/customers/";
pub const ENDPOINT_USER_PROFILE: &str = "/v2/user/profile/";
pub const ENDPOINT_FOLDERS: &str = "/v2/folders/";
pub const ENDPOINT_FILES: &str = "/v2/files/";
pub const ENDPOINT_SHARES: &str = "/v2/shares/";
pub const ENDPOINT_TRASH: &str = "/v2/trash/";
pub const ENDPOINT_HISTORY: &str = "/v2/history";

/// Which filesystem endpoint an item lives behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Folders,
    Files,
}

impl Resource {
    fn endpoint(self) -> &'static str {
        match self {
            Resource::Folders => ENDPOINT_FOLDERS,
            Resource::Files => ENDPOINT_FILES,
        }
    }
}

/// Response of a call whose content type may or may not be JSON.
#[derive(Debug)]
enum Payload {
    Json(Value),
    Raw(Vec<u8>),
}

/// Optional fields for a new end-user account.
#[derive(Debug, Clone, Default)]
pub struct AccountDetails<'a> {
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Low-level REST client. Cloning is cheap; clones share the transport and
/// the access token.
#[derive(Clone)]
pub struct Client {
    connection: Connection,
    base_url: Url,
    client_id: String,
    secret: String,
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("linked", &self.has_token())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        Ok(Self {
            connection: Connection::new(config)?,
            base_url: Url::parse(&config.base_url())?,
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn has_token(&self) -> bool {
        self.access_token().is_some()
    }

    /// Adopts an access token obtained elsewhere.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.is_empty())
    }

    // --- session -----------------------------------------------------------

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), Error> {
        require(username, "username")?;
        require(password, "password")?;
        let form = [
            ("grant_type", "password"),
            ("password", password),
            ("username", username),
        ];
        let response = self.signed_post(ENDPOINT_OAUTH, &form).await?;
        let token = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnexpectedResponse("missing access_token".to_string()))?;
        self.set_access_token(token);
        debug!("session linked");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let url = self.url(ENDPOINT_PING, None, None)?;
        self.call(Method::GET, url, Vec::new(), Body::Empty).await?;
        Ok(())
    }

    /// True when a token is set and the service accepts it.
    pub async fn is_linked(&self) -> bool {
        self.has_token() && self.ping().await.is_ok()
    }

    pub fn unlink(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        details: &AccountDetails<'_>,
    ) -> Result<Value, Error> {
        require(username, "username")?;
        require(password, "password")?;
        let mut form = vec![("password", password), ("username", username)];
        let optional = [
            ("email", details.email),
            ("first_name", details.first_name),
            ("last_name", details.last_name),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                form.push((key, value));
            }
        }
        self.signed_post(ENDPOINT_CUSTOMERS, &form).await
    }

    /// Profile of the linked user as returned by the service.
    pub async fn get_profile(&self) -> Result<Value, Error> {
        let url = self.url(ENDPOINT_USER_PROFILE, None, None)?;
        self.call_json(Method::GET, url, Body::Empty).await
    }

    // --- folders -----------------------------------------------------------

    pub async fn create_folder(
        &self,
        parent: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        require(name, "name")?;
        let exists = exists.check(Operation::CreateFolder)?;
        let mut url = self.url(ENDPOINT_FOLDERS, Some(parent), None)?;
        url.query_pairs_mut().append_pair("operation", "create");
        let form = vec![pair("name", name), pair("exists", exists.as_str())];
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        let items: Vec<Metadata> = decode(items_of(response)?)?;
        items
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedResponse("create returned no items".to_string()))
    }

    pub async fn list_folder(
        &self,
        path: &str,
        depth: u32,
        filter: Option<&str>,
        strict_traverse: bool,
    ) -> Result<Vec<Metadata>, Error> {
        let mut url = self.url(ENDPOINT_FOLDERS, Some(path), None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("depth", &depth.to_string());
            if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
                query.append_pair("filter", filter);
                query.append_pair("strict-traverse", bool_str(strict_traverse));
            }
        }
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(items_of(response)?)
    }

    pub async fn get_folder_meta(&self, path: &str) -> Result<Metadata, Error> {
        self.get_meta(Resource::Folders, path).await
    }

    pub async fn delete_folder(&self, path: &str, commit: bool, force: bool) -> Result<(), Error> {
        self.delete(Resource::Folders, path, commit, force).await
    }

    pub async fn copy_folder(
        &self,
        path: &str,
        destination: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        self.transfer(Resource::Folders, Operation::Copy, path, destination, name, exists)
            .await
    }

    pub async fn move_folder(
        &self,
        path: &str,
        destination: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        self.transfer(Resource::Folders, Operation::Move, path, destination, name, exists)
            .await
    }

    pub async fn alter_folder_meta(
        &self,
        path: &str,
        version: i64,
        conflict: VersionConflict,
        changes: &ChangeSet,
    ) -> Result<Metadata, Error> {
        self.alter_meta(Resource::Folders, path, version, conflict, changes)
            .await
    }

    // --- files -------------------------------------------------------------

    pub async fn get_file_meta(&self, path: &str) -> Result<Metadata, Error> {
        self.get_meta(Resource::Files, path).await
    }

    pub async fn delete_file(&self, path: &str, commit: bool) -> Result<(), Error> {
        self.delete(Resource::Files, path, commit, false).await
    }

    pub async fn copy_file(
        &self,
        path: &str,
        destination: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        self.transfer(Resource::Files, Operation::Copy, path, destination, name, exists)
            .await
    }

    pub async fn move_file(
        &self,
        path: &str,
        destination: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        self.transfer(Resource::Files, Operation::Move, path, destination, name, exists)
            .await
    }

    pub async fn alter_file_meta(
        &self,
        path: &str,
        version: i64,
        conflict: VersionConflict,
        changes: &ChangeSet,
    ) -> Result<Metadata, Error> {
        self.alter_meta(Resource::Files, path, version, conflict, changes)
            .await
    }

    /// Streams a local file into `parent` as a multipart upload.
    pub async fn upload(
        &self,
        parent: &str,
        source: &Path,
        name: Option<&str>,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        require(parent, "path")?;
        let exists = exists.check(Operation::Upload)?;
        let filename = match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(filename)
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("exists", exists.as_str())
            .part("file", part);

        let url = self.url(ENDPOINT_FILES, Some(parent), None)?;
        let response = self
            .call_json(Method::POST, url, Body::Multipart(form))
            .await?;
        decode(meta_of(response))
    }

    /// Downloads `count` bytes from `start` (0 = to the end), handing each
    /// chunk to `on_chunk` as it arrives.
    pub async fn download<F>(
        &self,
        path: &str,
        start: u64,
        count: u64,
        on_chunk: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> Result<(), Error>,
    {
        let (url, headers) = self.download_request(path, start, count)?;
        self.connection
            .request_stream(Method::GET, url, &headers, on_chunk)
            .await
    }

    /// Like [`Client::download`] but returns the response with its body
    /// still unread.
    pub(crate) async fn open_download(
        &self,
        path: &str,
        start: u64,
        count: u64,
    ) -> Result<Response, Error> {
        let (url, headers) = self.download_request(path, start, count)?;
        self.connection.open(Method::GET, url, &headers).await
    }

    fn download_request(
        &self,
        path: &str,
        start: u64,
        count: u64,
    ) -> Result<(Url, Vec<(String, String)>), Error> {
        require(path, "path")?;
        let url = self.url(ENDPOINT_FILES, Some(path), None)?;
        let mut headers = self.bearer()?;
        if start != 0 || count != 0 {
            let range = if count == 0 {
                format!("bytes={start}-")
            } else {
                let end = start
                    .checked_add(count - 1)
                    .ok_or_else(|| Error::argument("byte range exceeds u64"))?;
                format!("bytes={start}-{end}")
            };
            headers.push(pair("Range", &range));
        }
        Ok((url, headers))
    }

    pub async fn list_file_versions(
        &self,
        path: &str,
        start_version: i64,
        stop_version: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Metadata>, Error> {
        require(path, "path")?;
        let mut url = self.url(ENDPOINT_FILES, Some(path), Some("versions"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("start-version", &start_version.to_string());
            query.append_pair("limit", &limit.to_string());
            if let Some(stop) = stop_version.filter(|v| *v > 0) {
                query.append_pair("stop-version", &stop.to_string());
            }
        }
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(items_of(response)?)
    }

    pub async fn list_single_file_version(
        &self,
        path: &str,
        version: i64,
    ) -> Result<Metadata, Error> {
        require(path, "path")?;
        let url = self.url(ENDPOINT_FILES, Some(path), Some(&format!("versions/{version}")))?;
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(meta_of(response))
    }

    pub async fn promote_file_version(&self, path: &str, version: i64) -> Result<Metadata, Error> {
        require(path, "path")?;
        let mut url = self.url(ENDPOINT_FILES, Some(path), Some(&format!("versions/{version}")))?;
        url.query_pairs_mut().append_pair("operation", "promote");
        let response = self.call_json(Method::POST, url, Body::Empty).await?;
        decode(meta_of(response))
    }

    // --- shares ------------------------------------------------------------

    /// Creates one share covering every path in a single request.
    pub async fn create_share(&self, paths: &[String]) -> Result<ShareInfo, Error> {
        if paths.is_empty() {
            return Err(Error::argument("must pass a valid list of paths"));
        }
        let mut form = Vec::with_capacity(paths.len());
        for path in paths {
            require(path, "path")?;
            form.push(pair("path", &path::absolute(path)));
        }
        let url = self.url(ENDPOINT_SHARES, None, None)?;
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        decode(response)
    }

    pub async fn delete_share(&self, share_key: &str) -> Result<(), Error> {
        require(share_key, "share key")?;
        let url = self.url(ENDPOINT_SHARES, Some(&format!("{share_key}/")), None)?;
        self.call(Method::DELETE, url, Vec::new(), Body::Empty).await?;
        Ok(())
    }

    pub async fn browse_share(
        &self,
        share_key: &str,
        path: Option<&str>,
    ) -> Result<Vec<Metadata>, Error> {
        require(share_key, "share key")?;
        let name = format!("{share_key}{}", path.unwrap_or_default());
        let url = self.url(ENDPOINT_SHARES, Some(&name), Some("meta"))?;
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(items_of(response)?)
    }

    pub async fn list_shares(&self) -> Result<Vec<ShareInfo>, Error> {
        let url = self.url(ENDPOINT_SHARES, None, None)?;
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(items_of(response)?)
    }

    pub async fn receive_share(
        &self,
        share_key: &str,
        path: Option<&str>,
        exists: Exists,
    ) -> Result<Vec<Metadata>, Error> {
        require(share_key, "share key")?;
        let exists = exists.check(Operation::ReceiveShare)?;
        let url = self.url(ENDPOINT_SHARES, Some(&format!("{share_key}/")), None)?;
        let mut form = vec![pair("exists", exists.as_str())];
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            form.push(pair("path", path));
        }
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        decode(items_of(response)?)
    }

    pub async fn unlock_share(&self, share_key: &str, password: &str) -> Result<(), Error> {
        require(share_key, "share key")?;
        require(password, "password")?;
        let url = self.url(ENDPOINT_SHARES, Some(share_key), Some("unlock"))?;
        let form = vec![pair("password", password)];
        self.call(Method::POST, url, Vec::new(), Body::Form(form))
            .await?;
        Ok(())
    }

    pub async fn alter_share_info(
        &self,
        share_key: &str,
        update: &ShareUpdate<'_>,
    ) -> Result<ShareInfo, Error> {
        require(share_key, "share key")?;
        let url = self.url(ENDPOINT_SHARES, Some(share_key), Some("info"))?;
        let fields = [
            ("current_password", update.current_password),
            ("password", update.password),
            ("name", update.name),
        ];
        let form = fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| pair(key, v))
            })
            .collect();
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        decode(response)
    }

    // --- history & trash ---------------------------------------------------

    pub async fn list_history(&self, start: i64, stop: i64) -> Result<Value, Error> {
        let mut url = self.url(ENDPOINT_HISTORY, None, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("start", &start.to_string());
            if stop != 0 {
                query.append_pair("stop", &stop.to_string());
            }
        }
        self.call_json(Method::GET, url, Body::Empty).await
    }

    /// Items under `path` in the trash namespace (the whole trash for `None`).
    pub async fn browse_trash(&self, path: Option<&str>) -> Result<Vec<Metadata>, Error> {
        let url = self.url(ENDPOINT_TRASH, path, None)?;
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        match items_of(response) {
            Ok(items) => decode(items),
            Err(_) => Ok(Vec::new()),
        }
    }

    pub async fn delete_trash_item(&self, path: &str) -> Result<(), Error> {
        require(path, "path")?;
        let url = self.url(ENDPOINT_TRASH, Some(path), None)?;
        self.call(Method::DELETE, url, Vec::new(), Body::Empty)
            .await?;
        Ok(())
    }

    pub async fn recover_trash_item(
        &self,
        path: &str,
        policy: RestorePolicy,
        destination: Option<&str>,
    ) -> Result<(), Error> {
        require(path, "path")?;
        let url = self.url(ENDPOINT_TRASH, Some(path), None)?;
        let mut form = vec![pair("restore", policy.as_str())];
        let destination = destination.filter(|d| !d.trim().is_empty());
        match (policy, destination) {
            (RestorePolicy::Rescue, Some(dest)) => {
                form.push(pair("rescue-path", &path::absolute(dest)));
            }
            (RestorePolicy::Recreate, Some(dest)) => {
                form.push(pair("recreate-path", &path::absolute(dest)));
            }
            _ => {}
        }
        self.call(Method::POST, url, Vec::new(), Body::Form(form))
            .await?;
        Ok(())
    }

    // --- shared by file and folder endpoints -------------------------------

    pub(crate) async fn get_meta(&self, resource: Resource, path: &str) -> Result<Metadata, Error> {
        require(path, "path")?;
        let url = self.url(resource.endpoint(), Some(path), Some("meta"))?;
        let response = self.call_json(Method::GET, url, Body::Empty).await?;
        decode(meta_of(response))
    }

    pub(crate) async fn delete(
        &self,
        resource: Resource,
        path: &str,
        commit: bool,
        force: bool,
    ) -> Result<(), Error> {
        require(path, "path")?;
        let mut url = self.url(resource.endpoint(), Some(path), None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("commit", bool_str(commit));
            if force {
                query.append_pair("force", "true");
            }
        }
        self.call(Method::DELETE, url, Vec::new(), Body::Empty)
            .await?;
        Ok(())
    }

    pub(crate) async fn transfer(
        &self,
        resource: Resource,
        operation: Operation,
        path: &str,
        destination: &str,
        name: &str,
        exists: Exists,
    ) -> Result<Metadata, Error> {
        require(path, "path")?;
        require(name, "name")?;
        require(destination, "destination")?;
        let exists = exists.check(operation)?;
        let op = match operation {
            Operation::Move => "move",
            _ => "copy",
        };
        let mut url = self.url(resource.endpoint(), Some(path), None)?;
        url.query_pairs_mut().append_pair("operation", op);
        let form = vec![
            pair("to", &path::absolute(destination)),
            pair("exists", exists.as_str()),
            pair("name", name),
        ];
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        decode(meta_of(response))
    }

    pub(crate) async fn alter_meta(
        &self,
        resource: Resource,
        path: &str,
        version: i64,
        conflict: VersionConflict,
        changes: &ChangeSet,
    ) -> Result<Metadata, Error> {
        require(path, "path")?;
        let url = self.url(resource.endpoint(), Some(path), Some("meta"))?;
        let mut form = changes
            .to_form()
            .map_err(|err| Error::argument(format!("application data: {err}")))?;
        form.push(pair("version", &version.to_string()));
        form.push(pair("version-conflict", conflict.as_str()));
        let response = self.call_json(Method::POST, url, Body::Form(form)).await?;
        decode(meta_of(response))
    }

    // --- plumbing ----------------------------------------------------------

    /// Joins endpoint, item address and operation without doubling slashes.
    fn url(&self, endpoint: &str, name: Option<&str>, operation: Option<&str>) -> Result<Url, Error> {
        let mut name = name.map(str::trim).unwrap_or_default().to_string();
        if let Some(operation) = operation.filter(|op| !op.is_empty()) {
            if !name.is_empty() && !name.ends_with('/') {
                name.push('/');
            }
            name.push_str(operation);
        }
        if !name.is_empty() {
            if endpoint.ends_with('/') && name.starts_with('/') {
                name.remove(0);
            } else if !endpoint.ends_with('/') && !name.starts_with('/') {
                name.insert(0, '/');
            }
        }
        let mut url = self.base_url.clone();
        url.set_path(&format!("{endpoint}{name}"));
        Ok(url)
    }

    fn bearer(&self) -> Result<Vec<(String, String)>, Error> {
        let token = self.access_token().ok_or(Error::SessionNotLinked)?;
        Ok(vec![pair("Authorization", &format!("Bearer {token}"))])
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        mut headers: Vec<(String, String)>,
        body: Body,
    ) -> Result<RawResponse, Error> {
        let mut auth = self.bearer()?;
        auth.append(&mut headers);
        self.connection.request(method, url, &auth, body).await
    }

    async fn call_payload(
        &self,
        method: Method,
        url: Url,
        body: Body,
    ) -> Result<Payload, Error> {
        let response = self.call(method, url, Vec::new(), body).await?;
        parse_response(response)
    }

    async fn call_json(&self, method: Method, url: Url, body: Body) -> Result<Value, Error> {
        match self.call_payload(method, url, body).await? {
            Payload::Json(value) => Ok(value),
            Payload::Raw(_) => Err(Error::UnexpectedResponse(
                "expected a JSON response".to_string(),
            )),
        }
    }

    /// POST signed with the account secret instead of a bearer token.
    async fn signed_post(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<Value, Error> {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let headers = [("Content-Type", FORM_CONTENT_TYPE), ("Date", date.as_str())];
        let signature = signer::sign(endpoint, form, &headers, &self.secret)?;

        let mut header_pairs: Vec<(String, String)> =
            headers.iter().map(|(k, v)| pair(k, v)).collect();
        header_pairs.push(pair(
            "Authorization",
            &signer::authorization(&self.client_id, &signature),
        ));
        let body = Body::Form(form.iter().map(|(k, v)| pair(k, v)).collect());

        let url = self.url(endpoint, None, None)?;
        let response = self
            .connection
            .request(Method::POST, url, &header_pairs, body)
            .await?;
        match parse_response(response)? {
            Payload::Json(value) => Ok(value),
            Payload::Raw(_) => Err(Error::UnexpectedResponse(
                "expected a JSON response".to_string(),
            )),
        }
    }
}

/// JSON bodies are unwrapped from a top-level `result` when present; other
/// content types are returned untouched.
fn parse_response(response: RawResponse) -> Result<Payload, Error> {
    if !response.is_json() {
        return Ok(Payload::Raw(response.content));
    }
    if response.content.is_empty() {
        return Ok(Payload::Json(Value::Null));
    }
    let mut value: Value = serde_json::from_slice(&response.content)
        .map_err(|err| Error::UnexpectedResponse(err.to_string()))?;
    Ok(Payload::Json(match value.get_mut("result") {
        Some(result) => result.take(),
        None => value,
    }))
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
