use std::fmt;
use std::path::{Path, PathBuf};

use tokio_util::io::ReaderStream;

/// HTTP verbs used against the Cloud Functions API and upload URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    /// Only reads are safe to repeat after a transient failure.
    pub fn is_idempotent_read(self) -> bool {
        matches!(self, Method::Get)
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Bytes(Vec<u8>),
    /// Streamed from disk when the request is sent.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes(body));
        self
    }

    pub fn body_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = Some(RequestBody::File(path.into()));
        self
    }

    /// The in-memory body, if any.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Some(RequestBody::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// The file the body is streamed from, if any.
    pub fn body_path(&self) -> Option<&Path> {
        match &self.body {
            Some(RequestBody::File(path)) => Some(path),
            _ => None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP execution for testability.
///
/// Production code uses [`ReqwestExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait HttpExecutor: Send + Sync {
    /// Send a request and return the status and body, whatever the status.
    ///
    /// Errors are reserved for requests that never produced a response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// HTTP executor backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match request.body {
            Some(RequestBody::Bytes(bytes)) => builder = builder.body(bytes),
            Some(RequestBody::File(path)) => {
                let read_error = |e| HttpError::ReadBody {
                    path: path.clone(),
                    source: e,
                };
                let file = tokio::fs::File::open(&path).await.map_err(read_error)?;
                let len = file.metadata().await.map_err(read_error)?.len();
                builder = builder
                    .header(reqwest::header::CONTENT_LENGTH, len)
                    .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
            }
            None => {}
        }

        let response = builder.send().await.map_err(|e| HttpError::Network {
            method: request.method,
            url: request.url.clone(),
            detail: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| HttpError::Network {
            method: request.method,
            url: request.url.clone(),
            detail: e.to_string(),
        })?;

        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("{method} {url} failed: {detail}")]
    Network {
        method: Method,
        url: String,
        detail: String,
    },

    #[error("failed to read request body from {path}")]
    ReadBody {
        path: PathBuf,
        source: std::io::Error,
    },
}
