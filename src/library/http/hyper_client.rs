use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::http::{uri::InvalidUri, Request, Uri};
use hyper::{Body, Client};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, trace};

use super::{HttpClient, HttpRequest, HttpResponse};
use crate::library::BoxedError;

/// Errors raised while exchanging a request with a remote end
#[derive(Debug, Error)]
pub enum TransportError {
    /// Base URL and request path did not form a valid URI
    #[error("invalid request uri")]
    InvalidUri(#[from] InvalidUri),
    /// HTTP request composition failed
    #[error("HTTP request composition failed")]
    RequestCompositionFailed(#[from] hyper::http::Error),
    /// HTTP connection failed
    #[error("http connection failed")]
    ConnectionFailed(#[from] hyper::Error),
    /// No complete response arrived in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// [`HttpClient`] implementation backed by a pooled hyper client
///
/// Request paths are appended to the base URL so remote ends mounted below a prefix
/// (e.g. `http://grid:4444/wd/hub`) work without further configuration.
#[derive(Clone, Debug)]
pub struct HyperClient {
    client: Client<HttpConnector>,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl HyperClient {
    /// Creates a new client talking to the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client: Client::new(),
            base_url,
            request_timeout: None,
        }
    }

    /// Limits how long a single exchange, including reading the body, may take
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Base URL all request paths are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn uri_for(&self, path: &str) -> Result<Uri, InvalidUri> {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path).parse()
        } else {
            format!("{}/{}", self.base_url, path).parse()
        }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let uri = self.uri_for(&request.path)?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let req = builder.body(Body::from(request.body))?;

        trace!(method = %req.method(), uri = %req.uri(), "Sending request");
        let res = self.client.request(req).await?;
        let (parts, body) = res.into_parts();
        let body = hyper::body::to_bytes(body).await?;

        Ok(HttpResponse {
            status: parts.status,
            headers: parts.headers,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxedError> {
        let path = request.path.clone();

        let result = match self.request_timeout {
            Some(duration) => match timeout(duration, self.exchange(request)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(duration)),
            },
            None => self.exchange(request).await,
        };

        result.map_err(|e| {
            error!(base = %self.base_url, %path, error = %e, "Failed to fulfill request");
            e.into()
        })
    }
}
