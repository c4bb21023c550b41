use hyper::http::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::{
    CapabilityBag, CodecError, Dialect, ErrorKind, ResponseCodec, WebDriverError, PROXY,
    SUCCESS_CODE, UNEXPECTED_ALERT_BEHAVIOUR, UNHANDLED_PROMPT_BEHAVIOUR, W3C_CAPABILITY_NAMES,
};
use crate::library::helpers::split_into_two;
use crate::library::http::{HttpClient, HttpRequest, HttpResponse};
use crate::library::BoxedError;

/// Path of the session-creation endpoint relative to the remote end
pub const NEW_SESSION_PATH: &str = "/session";

/// Failures while negotiating a new session
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The capabilities could not be serialized
    #[error("unable to encode new session payload")]
    Encoding(#[source] serde_json::Error),
    /// The request could not be delivered or no response was received
    #[error("new session request failed")]
    Transport(#[source] BoxedError),
    /// The response body could not be interpreted
    #[error("unable to decode new session response")]
    Codec(#[from] CodecError),
    /// The response matched none of the known new-session shapes
    #[error("unrecognized new session response: {0}")]
    UnrecognizedResponse(String),
    /// The remote end refused to create a session
    #[error("remote end refused to create a session")]
    Remote(#[from] WebDriverError),
}

impl HandshakeError {
    /// Whether the remote end answered with something that does not follow any known dialect
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            HandshakeError::Codec(_) | HandshakeError::UnrecognizedResponse(_)
        )
    }
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResult {
    /// Dialect the remote end replied in
    pub dialect: Dialect,
    /// Identifier of the created session
    pub session_id: String,
    /// Capabilities reported by the remote end
    pub capabilities: CapabilityBag,
}

#[derive(Deserialize)]
struct SessionBody {
    #[serde(rename = "sessionId")]
    session_id: String,
    capabilities: CapabilityBag,
}

#[derive(Deserialize)]
struct NestedSessionBody {
    #[serde(rename = "sessionId")]
    session_id: String,
    value: CapabilityBag,
}

/// Known shapes of a new-session response, in order of precedence
#[derive(Deserialize)]
#[serde(untagged)]
enum NewSessionResponse {
    W3cFlat(SessionBody),
    W3cWrapped {
        value: SessionBody,
    },
    /// Older geckodriver releases nest the legacy body below `value`
    W3cNested {
        value: NestedSessionBody,
    },
    Legacy {
        #[serde(rename = "sessionId")]
        session_id: String,
        status: i64,
        value: CapabilityBag,
    },
}

impl From<NewSessionResponse> for HandshakeResult {
    fn from(response: NewSessionResponse) -> Self {
        let (dialect, session_id, capabilities) = match response {
            NewSessionResponse::W3cFlat(body) | NewSessionResponse::W3cWrapped { value: body } => {
                (Dialect::W3c, body.session_id, body.capabilities)
            }
            NewSessionResponse::W3cNested { value } => (Dialect::W3c, value.session_id, value.value),
            NewSessionResponse::Legacy {
                session_id, value, ..
            } => (Dialect::Legacy, session_id, value),
        };

        Self {
            dialect,
            session_id,
            capabilities,
        }
    }
}

fn is_w3c_capability(key: &str) -> bool {
    if W3C_CAPABILITY_NAMES.contains(&key) {
        return true;
    }

    match split_into_two(key, ":") {
        Some((namespace, name)) => !namespace.is_empty() && !name.contains(':'),
        None => false,
    }
}

fn with_prompt_behaviour(bag: &CapabilityBag) -> Map<String, Value> {
    let mut map = bag.as_map().clone();

    if !map.contains_key(UNHANDLED_PROMPT_BEHAVIOUR) {
        if let Some(behaviour) = map.get(UNEXPECTED_ALERT_BEHAVIOUR).cloned() {
            map.insert(UNHANDLED_PROMPT_BEHAVIOUR.to_string(), behaviour);
        }
    }

    map
}

fn w3c_filtered(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| is_w3c_capability(key))
        .map(|(key, value)| {
            let mut value = value.clone();

            if key == PROXY {
                if let Some(Value::String(proxy_type)) = value.get_mut("proxyType") {
                    *proxy_type = proxy_type.to_lowercase();
                }
            }

            (key.clone(), value)
        })
        .collect()
}

/// Builds a single new-session payload understood by every supported dialect
///
/// The legacy `desiredCapabilities`/`requiredCapabilities` keys are present both at the top
/// level and within `capabilities`, next to the W3C `alwaysMatch`/`firstMatch` pair. Only
/// standard and vendor prefixed (`ns:name`) capabilities make it into the W3C objects, other
/// keys are silently left out of them.
pub fn encode_capabilities(desired: &CapabilityBag, required: &CapabilityBag) -> Value {
    let desired = with_prompt_behaviour(desired);
    let required = with_prompt_behaviour(required);

    let always_match = w3c_filtered(&desired);
    let first_match = w3c_filtered(&required);

    json!({
        "desiredCapabilities": desired,
        "requiredCapabilities": required,
        "capabilities": {
            "desiredCapabilities": desired,
            "requiredCapabilities": required,
            "alwaysMatch": always_match,
            "firstMatch": [first_match],
        }
    })
}

/// Failure reported in the legacy format despite a successful HTTP status
fn legacy_failure(response: &HttpResponse) -> Option<WebDriverError> {
    ResponseCodec::new(Dialect::Legacy)
        .decode(response)
        .ok()
        .and_then(|decoded| decoded.into_result().err())
}

/// Creates a new session and determines the dialect the remote end speaks
///
/// Exactly one request is sent. Its payload satisfies every dialect at once and the dialect
/// is derived from the shape of the response.
pub async fn create_session(
    client: &dyn HttpClient,
    desired: &CapabilityBag,
    required: &CapabilityBag,
) -> Result<HandshakeResult, HandshakeError> {
    let payload = encode_capabilities(desired, required);
    let request = HttpRequest::new(Method::POST, NEW_SESSION_PATH)
        .with_json(&payload)
        .map_err(HandshakeError::Encoding)?;

    debug!(payload = %request.content_string(), "Requesting new session");

    let response = client
        .execute(request)
        .await
        .map_err(HandshakeError::Transport)?;

    if !response.status.is_success() {
        let error = ResponseCodec::default()
            .decode(&response)?
            .into_result()
            .err()
            .unwrap_or_else(|| {
                WebDriverError::new(
                    ErrorKind::UnknownError,
                    format!("unexpected response status {}", response.status),
                )
            });

        warn!(%error, "Session creation failed");
        return Err(HandshakeError::Remote(error));
    }

    let content = response.content_string();
    let body: Value = serde_json::from_str(content.trim()).map_err(|source| {
        HandshakeError::Codec(CodecError::MalformedJson {
            body: content.clone(),
            source,
        })
    })?;

    let result = match serde_json::from_value::<NewSessionResponse>(body) {
        Ok(NewSessionResponse::Legacy { status, .. }) if status != SUCCESS_CODE => {
            trace!(status, "Legacy new session response carries an error status");
            return Err(match legacy_failure(&response) {
                Some(error) => HandshakeError::Remote(error),
                None => HandshakeError::UnrecognizedResponse(content),
            });
        }
        Ok(shape) => HandshakeResult::from(shape),
        Err(_) => {
            return Err(match legacy_failure(&response) {
                Some(error) => HandshakeError::Remote(error),
                None => HandshakeError::UnrecognizedResponse(content),
            })
        }
    };

    info!(dialect = %result.dialect, session_id = %result.session_id, "Session created");

    Ok(result)
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::webdriver::{Proxy, ProxyType, UnexpectedAlertBehaviour};
    use hyper::http::StatusCode;
    use async_trait::async_trait;
    use hyper::http::header::CONTENT_TYPE;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::io;
    use std::sync::Mutex;

    struct RecordingHttpClient {
        response: HttpResponse,
        request: Mutex<Option<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn new(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse::new(StatusCode::from_u16(status).unwrap())
                    .with_header(CONTENT_TYPE, "application/json")
                    .with_body(body),
                request: Mutex::new(None),
            }
        }

        fn request(&self) -> HttpRequest {
            self.request.lock().unwrap().clone().unwrap()
        }

        fn payload(&self) -> Value {
            serde_json::from_slice(&self.request().body).unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingHttpClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxedError> {
            *self.request.lock().unwrap() = Some(request);
            Ok(self.response.clone())
        }
    }

    struct FailingHttpClient;

    #[async_trait]
    impl HttpClient for FailingHttpClient {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, BoxedError> {
            Err(Box::new(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    const W3C_WRAPPED: &str = r#"{"value": {"sessionId": "23456789", "capabilities": {}}}"#;
    const LEGACY: &str = r#"{"sessionId": "23456789", "status": 0, "value": {}}"#;

    async fn negotiate(body: &str, desired: &CapabilityBag) -> RecordingHttpClient {
        let client = RecordingHttpClient::new(200, body);
        create_session(&client, desired, &CapabilityBag::new())
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn include_legacy_capabilities() {
        let client = negotiate(W3C_WRAPPED, &CapabilityBag::new()).await;
        let payload = client.payload();

        assert_eq!(payload["desiredCapabilities"], json!({}));
        assert_eq!(payload["requiredCapabilities"], json!({}));
    }

    #[tokio::test]
    async fn include_older_geckodriver_capabilities() {
        let client = negotiate(W3C_WRAPPED, &CapabilityBag::new()).await;
        let capabilities = &client.payload()["capabilities"];

        assert_eq!(capabilities["desiredCapabilities"], json!({}));
        assert_eq!(capabilities["requiredCapabilities"], json!({}));
    }

    #[tokio::test]
    async fn include_w3c_capabilities() {
        let client = negotiate(LEGACY, &CapabilityBag::new()).await;
        let capabilities = &client.payload()["capabilities"];

        assert_eq!(capabilities["alwaysMatch"], json!({}));
        assert_eq!(capabilities["firstMatch"], json!([{}]));
    }

    #[tokio::test]
    async fn post_to_session_endpoint() {
        let client = negotiate(W3C_WRAPPED, &CapabilityBag::new()).await;
        let request = client.request();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, NEW_SESSION_PATH);
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn fill_every_dialect_slot() {
        let mut desired = CapabilityBag::chrome();
        desired.set("goog:chromeOptions", json!({ "args": ["--headless"] }));
        let mut required = CapabilityBag::new();
        required.set("browserVersion", "91");

        let payload = encode_capabilities(&desired, &required);

        assert!(payload["desiredCapabilities"].is_object());
        assert!(payload["requiredCapabilities"].is_object());
        assert!(payload["capabilities"]["alwaysMatch"].is_object());
        assert_eq!(
            payload["capabilities"]["firstMatch"],
            json!([{ "browserVersion": "91" }])
        );
    }

    #[test]
    fn drop_unprefixed_custom_keys_from_w3c_objects() {
        let mut desired = CapabilityBag::new();
        desired
            .set("se:option", "cheese")
            .set("option", "I like sausages")
            .set("browserName", "amazing cake browser");
        let mut required = CapabilityBag::new();
        required.set("cheese", "brie").set("moz:debug", true);

        let payload = encode_capabilities(&desired, &required);
        let capabilities = &payload["capabilities"];

        let mut w3c_keys: HashSet<String> = capabilities["alwaysMatch"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        for entry in capabilities["firstMatch"].as_array().unwrap() {
            w3c_keys.extend(entry.as_object().unwrap().keys().cloned());
        }

        assert!(w3c_keys.contains("browserName"));
        assert!(w3c_keys.contains("se:option"));
        assert!(w3c_keys.contains("moz:debug"));
        assert!(!w3c_keys.contains("option"));
        assert!(!w3c_keys.contains("cheese"));

        assert_eq!(payload["desiredCapabilities"]["option"], json!("I like sausages"));
        assert_eq!(payload["desiredCapabilities"]["se:option"], json!("cheese"));
        assert_eq!(payload["requiredCapabilities"]["cheese"], json!("brie"));
    }

    #[test]
    fn reject_malformed_vendor_keys() {
        assert!(is_w3c_capability("goog:chromeOptions"));
        assert!(is_w3c_capability("platformName"));
        assert!(!is_w3c_capability(":option"));
        assert!(!is_w3c_capability("a:b:c"));
        assert!(!is_w3c_capability("version"));
        assert!(!is_w3c_capability("platform"));
    }

    #[tokio::test]
    async fn lower_case_proxy_type_for_w3c() {
        let mut desired = CapabilityBag::new();
        desired.set_proxy(&Proxy::new(ProxyType::Autodetect));

        let client = negotiate(LEGACY, &desired).await;
        let payload = client.payload();

        assert_eq!(
            payload["capabilities"]["alwaysMatch"]["proxy"]["proxyType"],
            json!("autodetect")
        );
        assert_eq!(
            payload["capabilities"]["desiredCapabilities"]["proxy"]["proxyType"],
            json!("AUTODETECT")
        );
        assert_eq!(
            payload["desiredCapabilities"]["proxy"]["proxyType"],
            json!("AUTODETECT")
        );
    }

    #[test]
    fn remap_legacy_alert_behaviour() {
        let mut stripped = CapabilityBag::new();
        stripped.set(UNEXPECTED_ALERT_BEHAVIOUR, "ignore");
        stripped.remove(UNHANDLED_PROMPT_BEHAVIOUR);
        assert!(!stripped.contains_key(UNHANDLED_PROMPT_BEHAVIOUR));

        let payload = encode_capabilities(&stripped, &CapabilityBag::new());

        assert_eq!(
            payload["desiredCapabilities"][UNEXPECTED_ALERT_BEHAVIOUR],
            json!("ignore")
        );
        assert_eq!(
            payload["desiredCapabilities"][UNHANDLED_PROMPT_BEHAVIOUR],
            json!("ignore")
        );
        assert_eq!(
            payload["capabilities"]["alwaysMatch"][UNHANDLED_PROMPT_BEHAVIOUR],
            json!("ignore")
        );
        assert!(payload["capabilities"]["alwaysMatch"]
            .get(UNEXPECTED_ALERT_BEHAVIOUR)
            .is_none());
    }

    #[test]
    fn keep_explicit_prompt_behaviour() {
        let mut desired = CapabilityBag::new();
        desired.set_unexpected_alert_behaviour(UnexpectedAlertBehaviour::Dismiss);
        desired.set(UNHANDLED_PROMPT_BEHAVIOUR, "accept");

        let payload = encode_capabilities(&desired, &CapabilityBag::new());

        assert_eq!(
            payload["capabilities"]["alwaysMatch"][UNHANDLED_PROMPT_BEHAVIOUR],
            json!("accept")
        );
    }

    #[tokio::test]
    async fn detect_wrapped_w3c_response() {
        let client = RecordingHttpClient::new(200, W3C_WRAPPED);
        let result = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap();

        assert_eq!(result.dialect, Dialect::W3c);
        assert_eq!(result.session_id, "23456789");
    }

    #[tokio::test]
    async fn detect_flat_w3c_response() {
        let client = RecordingHttpClient::new(
            200,
            r#"{"sessionId": "abc", "capabilities": {"browserName": "firefox"}}"#,
        );
        let result = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap();

        assert_eq!(result.dialect, Dialect::W3c);
        assert_eq!(result.session_id, "abc");
        assert_eq!(result.capabilities.browser_name(), Some("firefox"));
    }

    #[tokio::test]
    async fn detect_nested_w3c_response() {
        let client = RecordingHttpClient::new(
            200,
            r#"{"value": {"sessionId": "23456789", "value": {"browserName": "firefox"}}}"#,
        );
        let result = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap();

        assert_eq!(result.dialect, Dialect::W3c);
        assert_eq!(result.capabilities.browser_name(), Some("firefox"));
    }

    #[tokio::test]
    async fn detect_legacy_response() {
        let client = RecordingHttpClient::new(
            200,
            r#"{"sessionId": "23456789", "status": 0, "value": {"browserName": "chrome"}}"#,
        );
        let result = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap();

        assert_eq!(result.dialect, Dialect::Legacy);
        assert_eq!(result.session_id, "23456789");
        assert_eq!(result.capabilities.browser_name(), Some("chrome"));
    }

    #[tokio::test]
    async fn reject_unknown_response_shape() {
        let client = RecordingHttpClient::new(200, r#"{"value": {"ready": true}}"#);
        let error = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap_err();

        assert!(matches!(error, HandshakeError::UnrecognizedResponse(_)));
        assert!(error.is_protocol_error());
    }

    #[tokio::test]
    async fn reject_malformed_response() {
        let client = RecordingHttpClient::new(200, "not json at all");
        let error = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap_err();

        assert!(error.is_protocol_error());
    }

    #[tokio::test]
    async fn surface_w3c_errors() {
        let client = RecordingHttpClient::new(
            500,
            r#"{"value": {"error": "session not created", "message": "No matching capabilities found"}}"#,
        );
        let error = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap_err();

        match error {
            HandshakeError::Remote(error) => {
                assert_eq!(error.kind, ErrorKind::SessionNotCreated);
                assert_eq!(error.message, "No matching capabilities found");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn surface_legacy_errors_reported_as_success() {
        let client = RecordingHttpClient::new(
            200,
            r#"{"sessionId": null, "status": 33, "value": {"message": "Unable to create session"}}"#,
        );
        let error = create_session(&client, &CapabilityBag::new(), &CapabilityBag::new())
            .await
            .unwrap_err();

        match error {
            HandshakeError::Remote(error) => {
                assert_eq!(error.kind, ErrorKind::SessionNotCreated);
                assert_eq!(error.message, "Unable to create session");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn propagate_transport_failures() {
        let error = create_session(
            &FailingHttpClient,
            &CapabilityBag::new(),
            &CapabilityBag::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, HandshakeError::Transport(_)));
        assert!(!error.is_protocol_error());
    }
}
