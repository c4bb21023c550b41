use std::collections::HashMap;
use std::io::Error as IoError;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace, warn};

use super::DriverVariant;
use crate::constants::{
    SERVICE_CONNECT_ATTEMPT_TIMEOUT, SERVICE_HOST, SERVICE_POLL_INTERVAL, SERVICE_STARTUP_TIMEOUT,
};
use crate::library::helpers::probe_port;

/// Errors raised while configuring or running a driver service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// unable to spawn or terminate the driver process
    #[error("unable to spawn or terminate the driver process")]
    Io(#[from] IoError),
    /// an explicitly configured executable does not exist
    #[error("driver executable does not exist: {0}")]
    ExecutableNotFound(PathBuf),
    /// no executable could be located for the variant
    #[error("no executable found for {0} driver")]
    NoExecutable(DriverVariant),
    /// unable to obtain a free port from the operating system
    #[error("unable to allocate a free port")]
    PortAllocation(#[source] IoError),
    /// the driver did not accept connections in time
    #[error("timed out after {timeout:?} while waiting for driver startup")]
    StartupTimeout {
        /// Configured startup timeout
        timeout: Duration,
        /// Error of the last connection attempt
        #[source]
        source: IoError,
    },
    /// the driver process terminated before it became ready
    #[error("driver process exited before it became ready ({0})")]
    ProcessExited(ExitStatus),
    /// the service has been started before and can no longer be changed or started again
    #[error("service has already been started")]
    AlreadyStarted,
}

/// Lifecycle stage of a [`DriverService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Fully configured, no process exists yet
    Configured,
    /// Process spawned, waiting for it to listen on its port
    Started,
    /// Process accepts connections
    Ready,
    /// Process has been terminated
    Stopped,
    /// Process exited prematurely or never became ready
    Failed,
}

/// Everything required to launch a driver executable
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Vendor of the executable, determines the port arguments
    pub variant: DriverVariant,
    /// Location of the executable
    pub executable: PathBuf,
    /// Port the driver listens on, `0` requests a free port on start
    pub port: u16,
    /// Arguments passed before the port arguments
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub env: HashMap<String, String>,
    /// Maximum duration the driver may take to accept connections
    pub startup_timeout: Duration,
}

impl ServiceConfig {
    /// Complete argument list, user arguments followed by the port arguments
    pub fn arguments(&self) -> Vec<String> {
        let mut arguments = self.args.clone();
        arguments.extend(self.variant.port_arguments(self.port));
        arguments
    }
}

/// Asks the operating system for a currently unused local port
fn free_port() -> Result<u16, IoError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Locates the executable for a variant, first at its default locations and then on the `PATH`
pub fn locate_executable(variant: DriverVariant) -> Option<PathBuf> {
    if let Some(location) = variant
        .default_locations()
        .into_iter()
        .find(|location| location.is_file())
    {
        return Some(location);
    }

    if variant.searches_path() {
        return which::which(variant.executable_name()).ok();
    }

    None
}

/// Builder for a [`DriverService`]
#[derive(Debug, Clone)]
pub struct DriverServiceBuilder {
    variant: DriverVariant,
    executable: Option<PathBuf>,
    port: u16,
    args: Vec<String>,
    env: HashMap<String, String>,
    startup_timeout: Duration,
}

impl DriverServiceBuilder {
    /// Creates a builder with default settings for the given variant
    pub fn new(variant: DriverVariant) -> Self {
        Self {
            variant,
            executable: None,
            port: 0,
            args: Vec::new(),
            env: HashMap::new(),
            startup_timeout: SERVICE_STARTUP_TIMEOUT,
        }
    }

    /// Sets the location of the driver executable, skipping discovery
    pub fn executable(mut self, location: impl Into<PathBuf>) -> Self {
        self.executable = Some(location.into());
        self
    }

    /// Sets the port to listen on, `0` picks a free one
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Appends an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Updates the maximum duration the driver may take to become ready
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Resolves the executable and port and creates the service
    pub fn build(self) -> Result<DriverService, ServiceError> {
        let executable = match self.executable {
            Some(path) if path.exists() => path,
            Some(path) => return Err(ServiceError::ExecutableNotFound(path)),
            None => locate_executable(self.variant)
                .ok_or(ServiceError::NoExecutable(self.variant))?,
        };

        let port = match self.port {
            0 => free_port().map_err(ServiceError::PortAllocation)?,
            port => port,
        };

        debug!(variant = %self.variant, executable = ?executable, port, "Configured driver service");

        Ok(DriverService {
            config: ServiceConfig {
                variant: self.variant,
                executable,
                port,
                args: self.args,
                env: self.env,
                startup_timeout: self.startup_timeout,
            },
            state: ServiceState::Configured,
            process: None,
        })
    }
}

/// Supervisor of one locally spawned driver process
///
/// A service is started at most once. The child process is killed when the service is
/// stopped or dropped.
#[derive(Debug)]
pub struct DriverService {
    config: ServiceConfig,
    state: ServiceState,
    process: Option<Child>,
}

impl DriverService {
    /// Creates a builder for the given variant
    pub fn builder(variant: DriverVariant) -> DriverServiceBuilder {
        DriverServiceBuilder::new(variant)
    }

    /// Service with default settings, `None` if no executable can be found for the variant
    pub fn create_default(variant: DriverVariant) -> Option<DriverService> {
        match DriverServiceBuilder::new(variant).build() {
            Ok(service) => Some(service),
            Err(e) => {
                debug!(%variant, error = %e, "No driver service available");
                None
            }
        }
    }

    /// Current lifecycle stage
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Configuration the process is (or will be) launched with
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Port the driver listens on
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Address of the driver, only available once it accepts connections
    pub fn url(&self) -> Option<String> {
        match self.state {
            ServiceState::Ready => Some(format!("http://{}:{}", SERVICE_HOST, self.config.port)),
            _ => None,
        }
    }

    /// Modifies the configuration, rejected once the service has been started
    pub fn update_config<F>(&mut self, update: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut ServiceConfig),
    {
        if self.state != ServiceState::Configured {
            return Err(ServiceError::AlreadyStarted);
        }

        update(&mut self.config);
        Ok(())
    }

    /// Spawns the driver and waits until it accepts connections on its port
    ///
    /// Fails if the process exits prematurely or does not listen within the startup timeout.
    /// In both cases the process is gone afterwards and the service ends up [`ServiceState::Failed`].
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Configured {
            return Err(ServiceError::AlreadyStarted);
        }

        if self.config.port == 0 {
            self.config.port = free_port().map_err(ServiceError::PortAllocation)?;
        }

        self.state = ServiceState::Started;

        match self.spawn_process() {
            Ok(child) => self.process = Some(child),
            Err(e) => {
                self.state = ServiceState::Failed;
                return Err(e.into());
            }
        }

        match self.await_readiness().await {
            Ok(()) => {
                self.state = ServiceState::Ready;
                info!(port = self.config.port, "Driver became responsive");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Driver did not become ready");
                self.state = ServiceState::Failed;

                if let Some(mut child) = self.process.take() {
                    if let Err(kill_error) = child.kill().await {
                        warn!(error = %kill_error, "Unable to kill failed driver");
                    }
                }

                Err(e)
            }
        }
    }

    fn spawn_process(&self) -> Result<Child, IoError> {
        let arguments = self.config.arguments();
        debug!(executable = ?self.config.executable, ?arguments, "Spawning driver");

        Command::new(&self.config.executable)
            .args(&arguments)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }

    async fn await_readiness(&mut self) -> Result<(), ServiceError> {
        let timeout = self.config.startup_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let last_error =
                match probe_port(SERVICE_HOST, self.config.port, SERVICE_CONNECT_ATTEMPT_TIMEOUT)
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };

            if let Some(child) = self.process.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(ServiceError::ProcessExited(status));
                }
            }

            if Instant::now() >= deadline {
                return Err(ServiceError::StartupTimeout {
                    timeout,
                    source: last_error,
                });
            }

            trace!(error = %last_error, "Driver not listening yet");
            sleep(SERVICE_POLL_INTERVAL).await;
        }
    }

    /// Terminates the driver process, does nothing if it is not running
    pub async fn stop(&mut self) -> Result<(), ServiceError> {
        let mut child = match self.process.take() {
            Some(child) => child,
            None => return Ok(()),
        };

        self.state = ServiceState::Stopped;
        match child.try_wait()? {
            Some(status) => debug!(%status, "Driver exited on its own"),
            None => child.kill().await?,
        }
        info!(port = self.config.port, "Driver stopped");

        Ok(())
    }

    /// Location of the executable
    pub fn executable(&self) -> &Path {
        &self.config.executable
    }
}

#[cfg(all(test, unix))]
mod does {
    use super::*;
    use tokio::net::TcpListener as AsyncTcpListener;

    const SHELL: &str = "/bin/sh";

    fn shell(script: &str) -> DriverServiceBuilder {
        DriverService::builder(DriverVariant::Firefox)
            .executable(SHELL)
            .args(vec!["-c", script])
    }

    #[test]
    fn allocate_port_and_place_port_arguments_last() {
        let service = shell("true").arg("--verbose").build().unwrap();
        let config = service.config();

        assert_ne!(config.port, 0);
        assert_eq!(
            config.arguments(),
            vec![
                "-c".to_string(),
                "true".to_string(),
                "--verbose".to_string(),
                "--port".to_string(),
                config.port.to_string(),
            ]
        );
        assert_eq!(service.state(), ServiceState::Configured);
        assert_eq!(service.url(), None);
    }

    #[test]
    fn reject_missing_explicit_executable() {
        let directory = tempfile::tempdir().unwrap();
        let missing = directory.path().join("geckodriver");

        let result = DriverService::builder(DriverVariant::Firefox)
            .executable(&missing)
            .build();

        assert!(matches!(result, Err(ServiceError::ExecutableNotFound(path)) if path == missing));
    }

    #[test]
    fn provide_no_default_service_without_executable() {
        let variant = DriverVariant::SafariTechnologyPreview;
        if variant.default_locations().iter().any(|location| location.is_file()) {
            return;
        }

        assert!(DriverService::create_default(variant).is_none());
        assert!(matches!(
            DriverService::builder(variant).build(),
            Err(ServiceError::NoExecutable(DriverVariant::SafariTechnologyPreview))
        ));
    }

    #[tokio::test]
    async fn time_out_when_port_never_opens() {
        let mut service = shell("sleep 30")
            .startup_timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        let started = Instant::now();
        let result = service.start().await;

        assert!(matches!(result, Err(ServiceError::StartupTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(service.state(), ServiceState::Failed);
        assert_eq!(service.url(), None);
    }

    #[tokio::test]
    async fn detect_premature_exit() {
        let mut service = shell("exit $EXIT_CODE")
            .env("EXIT_CODE", "7")
            .startup_timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        match service.start().await {
            Err(ServiceError::ProcessExited(status)) => assert_eq!(status.code(), Some(7)),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(service.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn become_ready_and_stop_idempotently() {
        let listener = AsyncTcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut service = shell("sleep 30").port(port).build().unwrap();
        service.start().await.unwrap();

        assert_eq!(service.state(), ServiceState::Ready);
        assert_eq!(service.url(), Some(format!("http://localhost:{}", port)));

        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.url(), None);

        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn freeze_config_after_start() {
        let mut service = shell("sleep 30")
            .startup_timeout(Duration::from_millis(300))
            .build()
            .unwrap();

        service
            .update_config(|config| config.args.push("--verbose".into()))
            .unwrap();
        assert!(service.config().args.contains(&"--verbose".to_string()));

        service.start().await.ok();

        assert!(matches!(
            service.update_config(|config| config.port = 1),
            Err(ServiceError::AlreadyStarted)
        ));
        assert!(matches!(
            service.start().await,
            Err(ServiceError::AlreadyStarted)
        ));
    }
}
