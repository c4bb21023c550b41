//! Default values shared across modules

use std::time::Duration;

/// Maximum duration a local driver executable may take to accept connections on its port
pub const SERVICE_STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Upper bound for a single connection attempt while waiting for a driver to come up
pub const SERVICE_CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between two consecutive readiness probes
pub const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Maximum duration a remote endpoint may take to answer its `/status` route
pub const REMOTE_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Host name used in the URL of locally spawned driver services
pub const SERVICE_HOST: &str = "localhost";

/// Location of the `safaridriver` executable shipped with macOS
pub const SAFARI_DRIVER_EXECUTABLE: &str = "/usr/bin/safaridriver";

/// Location of the `safaridriver` executable bundled with Safari Technology Preview
pub const SAFARI_TP_DRIVER_EXECUTABLE: &str =
    "/Applications/Safari Technology Preview.app/Contents/MacOS/safaridriver";
