use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    CapabilityBag, DriverService, DriverServiceBuilder, DriverVariant, HandshakeError,
    RemoteSession, ServiceError, SessionError,
};
use crate::constants::REMOTE_STARTUP_TIMEOUT;
use crate::library::helpers::{wait_for, WaitError};
use crate::library::http::HyperClient;

/// Failures while obtaining a session
#[derive(Debug, Error)]
pub enum SupplierError {
    /// The remote end did not become available
    #[error("remote end unavailable")]
    Unavailable(#[from] WaitError),
    /// The local driver could not be started or stopped
    #[error("driver service failure")]
    Service(#[from] ServiceError),
    /// The service reported to be started but has no address
    #[error("driver service is not ready")]
    ServiceNotReady,
    /// No session could be negotiated
    #[error("session negotiation failed")]
    Handshake(#[from] HandshakeError),
    /// The session could not be terminated
    #[error("unable to terminate session")]
    Session(#[from] SessionError),
}

/// Session along with the driver process backing it, if any
pub struct SuppliedSession {
    session: RemoteSession,
    service: Option<DriverService>,
}

impl SuppliedSession {
    /// Negotiated session
    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    /// Locally spawned driver the session runs in
    pub fn service(&self) -> Option<&DriverService> {
        self.service.as_ref()
    }

    /// Terminates the session and stops the driver process
    ///
    /// The driver is stopped even if terminating the session fails.
    pub async fn close(mut self) -> Result<(), SupplierError> {
        let quit = self.session.quit().await;

        if let Some(service) = self.service.as_mut() {
            service.stop().await?;
        }

        quit.map_err(SupplierError::from)
    }
}

/// Source of new sessions
#[async_trait]
pub trait SessionSupplier: Send + Sync {
    /// Provides a new session matching the capabilities
    async fn supply(
        &self,
        desired: &CapabilityBag,
        required: &CapabilityBag,
    ) -> Result<SuppliedSession, SupplierError>;
}

/// Supplies sessions from an already running remote end
#[derive(Debug, Clone)]
pub struct RemoteSupplier {
    url: String,
    readiness_timeout: Duration,
}

impl RemoteSupplier {
    /// Creates a supplier for the remote end at the given base URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            readiness_timeout: REMOTE_STARTUP_TIMEOUT,
        }
    }

    /// Maximum duration the remote end may take to answer its status route
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }
}

#[async_trait]
impl SessionSupplier for RemoteSupplier {
    async fn supply(
        &self,
        desired: &CapabilityBag,
        required: &CapabilityBag,
    ) -> Result<SuppliedSession, SupplierError> {
        let status_url = format!("{}/status", self.url);
        wait_for(&status_url, self.readiness_timeout).await?;

        debug!(url = %self.url, "Remote end is available");

        let client = Arc::new(HyperClient::new(self.url.clone()));
        let session = RemoteSession::create(client, desired, required).await?;

        Ok(SuppliedSession {
            session,
            service: None,
        })
    }
}

/// Supplies sessions from a freshly spawned local driver executable
#[derive(Debug, Clone)]
pub struct LocalServiceSupplier {
    builder: DriverServiceBuilder,
}

impl LocalServiceSupplier {
    /// Creates a supplier which launches one service per session using the builder
    pub fn new(builder: DriverServiceBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl SessionSupplier for LocalServiceSupplier {
    async fn supply(
        &self,
        desired: &CapabilityBag,
        required: &CapabilityBag,
    ) -> Result<SuppliedSession, SupplierError> {
        let mut service = self.builder.clone().build()?;
        service.start().await?;

        let url = match service.url() {
            Some(url) => url,
            None => {
                service.stop().await?;
                return Err(SupplierError::ServiceNotReady);
            }
        };

        let client = Arc::new(HyperClient::new(url));
        match RemoteSession::create(client, desired, required).await {
            Ok(session) => Ok(SuppliedSession {
                session,
                service: Some(service),
            }),
            Err(e) => {
                if let Err(stop_error) = service.stop().await {
                    warn!(error = %stop_error, "Unable to stop driver after failed handshake");
                }
                Err(e.into())
            }
        }
    }
}

/// Source of sessions, selected by configuration
#[derive(Debug, Clone)]
pub enum SupplierStrategy {
    /// Remote end reachable at the given base URL
    Remote {
        /// Base URL of the remote end
        url: String,
        /// Maximum duration the remote end may take to answer its status route
        readiness_timeout: Duration,
    },
    /// Local driver executable launched for every session
    Local(DriverServiceBuilder),
}

impl SupplierStrategy {
    /// Remote strategy with the default readiness timeout
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            readiness_timeout: REMOTE_STARTUP_TIMEOUT,
        }
    }

    /// Local strategy for the variant, optionally with an explicit executable
    pub fn local(variant: DriverVariant, executable: Option<PathBuf>) -> Self {
        let builder = DriverServiceBuilder::new(variant);

        match executable {
            Some(executable) => Self::Local(builder.executable(executable)),
            None => Self::Local(builder),
        }
    }

    /// Instantiates the selected supplier
    pub fn into_supplier(self) -> Box<dyn SessionSupplier> {
        match self {
            SupplierStrategy::Remote {
                url,
                readiness_timeout,
            } => Box::new(RemoteSupplier::new(url).readiness_timeout(readiness_timeout)),
            SupplierStrategy::Local(builder) => Box::new(LocalServiceSupplier::new(builder)),
        }
    }
}
