use async_trait::async_trait;
use hyper::http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderMap, HeaderValue, Method, StatusCode,
};
use serde::Serialize;

use crate::library::BoxedError;

/// Content type attached to every JSON body
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Outgoing request with a fully buffered body
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Path (and query) relative to the base URL of the remote end
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Raw request body
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request without a body
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Serializes the value as the JSON body of the request
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = serde_json::to_vec(value)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Ok(self)
    }

    /// Body interpreted as UTF-8, replacing invalid sequences
    pub fn content_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Incoming response with a fully buffered body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates an empty response with the given status
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Replaces the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header, silently skipping values that are not valid header values
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Body interpreted as UTF-8, replacing invalid sequences
    pub fn content_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a header if it is present and valid ASCII
    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Transport capable of exchanging exactly one request for one response
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request and waits for the complete response
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxedError>;
}
