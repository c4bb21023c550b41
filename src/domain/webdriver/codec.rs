//! Translation between HTTP responses and typed command outcomes

use hyper::http::{header::CONTENT_TYPE, StatusCode};
use serde_json::{json, Map, Value};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use super::{Dialect, ErrorKind, WebDriverError, SUCCESS_CODE};
use crate::library::communication::BlackboxError;
use crate::library::http::HttpResponse;

/// Message used when a remote end reports an error without describing it
pub const DEFAULT_ERROR_MESSAGE: &str = "An unknown error has occurred";

/// State of a successful response
pub const SUCCESS_STATE: &str = "success";

/// Transformation applied to every successfully decoded value
///
/// Used by callers to e.g. turn raw element references into richer handles.
pub type ValueResolver = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Errors raised while translating responses
#[derive(Debug, Error)]
pub enum CodecError {
    /// The body was expected to be JSON but could not be parsed
    #[error("malformed JSON in response body: {body}")]
    MalformedJson {
        /// Offending body
        body: String,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },
    /// The body of an error response was JSON but not an object
    #[error("error response is not a JSON object: {0}")]
    UnexpectedShape(String),
    /// A response could not be serialized
    #[error("unable to serialize response")]
    Serialization(#[source] serde_json::Error),
}

/// Payload of a [`WireResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// Arbitrary result of a successful command, `Null` if there was none
    Value(Value),
    /// Error reported by the remote end
    Error(WebDriverError),
}

/// Typed outcome of a single HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    /// HTTP status of the response
    pub http_status: u16,
    /// `"success"` or the wire error string
    pub state: String,
    /// Legacy numeric status code
    pub status: i64,
    /// Command result or error
    pub value: ResponseValue,
}

impl WireResponse {
    /// Successful response carrying the given value
    pub fn success(value: Value) -> Self {
        Self {
            http_status: StatusCode::OK.as_u16(),
            state: SUCCESS_STATE.to_string(),
            status: SUCCESS_CODE,
            value: ResponseValue::Value(value),
        }
    }

    /// Error response with the status codes derived from the error kind
    pub fn error(error: WebDriverError) -> Self {
        Self {
            http_status: error.kind.http_status(),
            state: error.kind.wire_name().to_string(),
            status: error.kind.legacy_code(),
            value: ResponseValue::Error(error),
        }
    }

    /// Error response for a local failure, its source chain becomes the stacktrace
    pub fn failure(kind: ErrorKind, cause: &(dyn StdError + 'static)) -> Self {
        Self::error(WebDriverError::from((kind, BlackboxError::from(cause))))
    }

    /// Whether the response carries a command result
    pub fn is_success(&self) -> bool {
        matches!(self.value, ResponseValue::Value(_))
    }

    /// Converts the response into a result of the command
    pub fn into_result(self) -> Result<Value, WebDriverError> {
        match self.value {
            ResponseValue::Value(value) => Ok(value),
            ResponseValue::Error(error) => Err(error),
        }
    }
}

/// Decodes HTTP responses into [`WireResponse`]s and encodes them back for a server role
#[derive(Clone)]
pub struct ResponseCodec {
    dialect: Dialect,
    resolver: Option<ValueResolver>,
}

impl fmt::Debug for ResponseCodec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResponseCodec")
            .field("dialect", &self.dialect)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new(Dialect::W3c)
    }
}

fn parse_json(content: &str) -> Result<Value, CodecError> {
    serde_json::from_str(content).map_err(|source| CodecError::MalformedJson {
        body: content.to_string(),
        source,
    })
}

fn is_json(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type
            .to_ascii_lowercase()
            .starts_with("application/json")
}

fn string_at<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

/// Builds an error from a legacy `{"status": <code>, "value": {"message": ...}}` body
fn legacy_error(http_status: u16, code: i64, object: &Map<String, Value>) -> WireResponse {
    let kind = ErrorKind::from_legacy_code(code).unwrap_or(ErrorKind::UnknownError);
    let value = object.get("value");
    let message = value
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ERROR_MESSAGE);

    let error = if kind == ErrorKind::UnhandledAlert {
        let text = value
            .and_then(|v| v.get("alert"))
            .and_then(|a| a.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        WebDriverError::unhandled_alert(message, text)
    } else {
        WebDriverError::new(kind, message)
    };

    WireResponse {
        http_status,
        state: kind.wire_name().to_string(),
        status: kind.legacy_code(),
        value: ResponseValue::Error(error),
    }
}

impl ResponseCodec {
    /// Creates a codec for responses of a remote end speaking the given dialect
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            resolver: None,
        }
    }

    /// Passes every successfully decoded value through the resolver
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Dialect this codec expects
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Interprets a response received from a remote end
    ///
    /// Any status other than 200 yields an error value. A 200 response with an empty body
    /// yields a `Null` value. Bodies which should be JSON but can not be parsed are rejected.
    /// A 200 response is parsed as JSON when its content type is JSON or absent, any other
    /// content type is passed through verbatim as a string value.
    pub fn decode(&self, response: &HttpResponse) -> Result<WireResponse, CodecError> {
        let raw = response.content_string();
        let content = raw.trim();
        let status = response.status.as_u16();
        let content_type = response.header(CONTENT_TYPE).unwrap_or_default();

        debug!(status, %content, "Decoding response");

        if response.status != StatusCode::OK {
            return self.decode_error(status, content);
        }

        let mut value = if content.is_empty() {
            Value::Null
        } else if is_json(content_type) {
            match parse_json(content)? {
                Value::Object(mut object) => {
                    if self.dialect == Dialect::Legacy {
                        if let Some(code) = object.get("status").and_then(Value::as_i64) {
                            if code != SUCCESS_CODE {
                                trace!(code, "Legacy error reported with 200 OK");
                                return Ok(legacy_error(status, code, &object));
                            }
                        }
                    }

                    match object.remove("value") {
                        Some(value) => value,
                        // Some drivers do not wrap their responses
                        None => Value::Object(object),
                    }
                }
                other => other,
            }
        } else {
            Value::String(content.to_string())
        };

        if let Value::String(text) = &mut value {
            *text = text.replace("\r\n", "\n");
        }

        if let Some(resolver) = &self.resolver {
            value = resolver(value);
        }

        Ok(WireResponse::success(value))
    }

    fn decode_error(&self, status: u16, content: &str) -> Result<WireResponse, CodecError> {
        trace!("Processing an error");

        let mut object = if content.is_empty() {
            Map::new()
        } else {
            match parse_json(content)? {
                Value::Object(object) => object,
                _ => return Err(CodecError::UnexpectedShape(content.to_string())),
            }
        };

        // Unwrap {"value": {"error": ...}}
        let nested = match object.get("value") {
            Some(Value::Object(inner)) if inner.contains_key("error") => Some(inner.clone()),
            _ => None,
        };
        if let Some(inner) = nested {
            object = inner;
        }

        if !object.contains_key("error") {
            if let Some(code) = object.get("status").and_then(Value::as_i64) {
                return Ok(legacy_error(status, code, &object));
            }
        }

        let message = string_at(&object, "message").unwrap_or(DEFAULT_ERROR_MESSAGE);
        let state = string_at(&object, "error").unwrap_or("unknown error");
        let stacktrace = string_at(&object, "stacktrace").unwrap_or_default();
        let kind = ErrorKind::from_wire(state, Some(status));

        let error = if state == "unexpected alert open"
            && status == StatusCode::INTERNAL_SERVER_ERROR.as_u16()
        {
            let text = object
                .get("data")
                .and_then(|data| data.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            WebDriverError::unhandled_alert(message, text)
        } else {
            WebDriverError::new(kind, message)
        };

        Ok(WireResponse {
            http_status: status,
            state: state.to_string(),
            status: kind.legacy_code(),
            value: ResponseValue::Error(error.with_stacktrace(stacktrace)),
        })
    }

    /// Produces the HTTP response a remote end would send for the given outcome
    pub fn encode(&self, response: &WireResponse) -> Result<HttpResponse, CodecError> {
        let (status, body) = match &response.value {
            ResponseValue::Error(error) => {
                let state = if response.state.is_empty() || response.state == SUCCESS_STATE {
                    error.kind.wire_name()
                } else {
                    response.state.as_str()
                };

                let mut payload = Map::new();
                payload.insert("error".into(), json!(state));
                payload.insert("message".into(), json!(error.message));
                payload.insert("stacktrace".into(), json!(error.stacktrace));

                if error.kind == ErrorKind::UnhandledAlert {
                    let text = error.alert_text().unwrap_or_default();
                    payload.insert("data".into(), json!({ "text": text }));
                }

                let status = if response.http_status == StatusCode::OK.as_u16() {
                    error.kind.http_status()
                } else {
                    response.http_status
                };

                (status, json!({ "value": Value::Object(payload) }))
            }
            ResponseValue::Value(value) => (StatusCode::OK.as_u16(), json!({ "value": value })),
        };

        let body = serde_json::to_vec(&body).map_err(CodecError::Serialization)?;
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        Ok(HttpResponse::new(status)
            .with_header(CONTENT_TYPE, crate::library::http::JSON_CONTENT_TYPE)
            .with_body(body))
    }
}
