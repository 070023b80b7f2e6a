use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;
use url::form_urlencoded::Serializer;

use crate::config::ClientConfig;
use crate::error::{Error, ServerFailure, translate};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

pub enum Body {
    Empty,
    /// Ordered pairs; repeated keys are sent as given.
    Form(Vec<(String, String)>),
    Multipart(Form),
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl RawResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }
}

/// HTTP transport shared by every client clone. Safe for concurrent use.
#[derive(Clone, Debug)]
pub struct Connection {
    http: Client,
}

impl Connection {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    pub async fn request(
        &self,
        method: Method,
        url: Url,
        headers: &[(String, String)],
        body: Body,
    ) -> Result<RawResponse, Error> {
        let response = self.send(method, url, headers, body).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            content_type,
            content,
        })
    }

    /// Delivers the response body chunk by chunk as it arrives. Chunk sizes
    /// are whatever the network hands over.
    pub async fn request_stream<F>(
        &self,
        method: Method,
        url: Url,
        headers: &[(String, String)],
        mut on_chunk: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> Result<(), Error>,
    {
        let mut stream = self.open(method, url, headers).await?.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(&chunk)?;
        }
        Ok(())
    }

    /// Sends a bodiless request and hands back the checked response with
    /// its body unread, for callers that consume it as a stream.
    pub async fn open(
        &self,
        method: Method,
        url: Url,
        headers: &[(String, String)],
    ) -> Result<Response, Error> {
        self.send(method, url, headers, Body::Empty).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        headers: &[(String, String)],
        body: Body,
    ) -> Result<Response, Error> {
        debug!(%method, %url, "sending request");
        let mut request = self.http.request(method, url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = attach_body(request, headers, body);
        let response = request.send().await?;
        check_status(response).await
    }
}

fn attach_body(request: RequestBuilder, headers: &[(String, String)], body: Body) -> RequestBuilder {
    match body {
        Body::Empty => request,
        Body::Form(pairs) => {
            let encoded = Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            let has_content_type = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            let request = if has_content_type {
                request
            } else {
                request.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            };
            request.body(encoded)
        }
        Body::Multipart(form) => request.multipart(form),
    }
}

async fn check_status(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or_default().to_string()
    } else {
        body
    };
    debug!(%status, "request failed");
    Err(translate(ServerFailure { status, body }).into())
}
