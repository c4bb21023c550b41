use hyper::http::Method;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::{
    create_session, CapabilityBag, CodecError, Dialect, HandshakeError, HandshakeResult,
    ResponseCodec, WebDriverError,
};
use crate::library::http::{HttpClient, HttpRequest};
use crate::library::BoxedError;

/// Failures while executing a command within a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command body could not be serialized
    #[error("unable to encode command")]
    Encoding(#[source] serde_json::Error),
    /// The request could not be delivered or no response was received
    #[error("command request failed")]
    Transport(#[source] BoxedError),
    /// The response could not be decoded
    #[error("unable to decode command response")]
    Codec(#[from] CodecError),
    /// The remote end reported an error
    #[error("remote end reported an error")]
    Remote(#[from] WebDriverError),
}

/// Session created by a successful handshake
///
/// All commands are sent through the same transport and decoded by a codec matching the
/// negotiated dialect.
#[derive(Clone)]
pub struct RemoteSession {
    client: Arc<dyn HttpClient>,
    codec: ResponseCodec,
    handshake: HandshakeResult,
}

impl RemoteSession {
    /// Wraps the result of a previous handshake
    pub fn new(client: Arc<dyn HttpClient>, handshake: HandshakeResult) -> Self {
        Self {
            client,
            codec: ResponseCodec::new(handshake.dialect),
            handshake,
        }
    }

    /// Negotiates a new session with the remote end behind the client
    pub async fn create(
        client: Arc<dyn HttpClient>,
        desired: &CapabilityBag,
        required: &CapabilityBag,
    ) -> Result<Self, HandshakeError> {
        let handshake = create_session(client.as_ref(), desired, required).await?;
        Ok(Self::new(client, handshake))
    }

    /// Replaces the codec, e.g. to attach a value resolver
    pub fn with_codec(mut self, codec: ResponseCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Dialect spoken by the remote end
    pub fn dialect(&self) -> Dialect {
        self.handshake.dialect
    }

    /// Identifier assigned by the remote end
    pub fn session_id(&self) -> &str {
        &self.handshake.session_id
    }

    /// Capabilities reported on session creation
    pub fn capabilities(&self) -> &CapabilityBag {
        &self.handshake.capabilities
    }

    async fn send(
        &self,
        method: Method,
        path: String,
        body: Option<&Value>,
    ) -> Result<Value, SessionError> {
        let mut request = HttpRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_json(body).map_err(SessionError::Encoding)?;
        }

        debug!(method = %request.method, path = %request.path, "Executing command");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(SessionError::Transport)?;

        Ok(self.codec.decode(&response)?.into_result()?)
    }

    /// Executes a command relative to `/session/{id}`
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SessionError> {
        let path = format!(
            "/session/{}/{}",
            self.handshake.session_id,
            path.trim_start_matches('/')
        );

        self.send(method, path, body).await
    }

    /// Queries the readiness of the remote end
    pub async fn status(&self) -> Result<Value, SessionError> {
        self.send(Method::GET, "/status".to_string(), None).await
    }

    /// Deletes the session
    pub async fn quit(&self) -> Result<(), SessionError> {
        let path = format!("/session/{}", self.handshake.session_id);
        self.send(Method::DELETE, path, None).await?;

        info!(session_id = %self.handshake.session_id, "Session terminated");
        Ok(())
    }
}
