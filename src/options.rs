use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use structopt::StructOpt;
use webgrid_dialect::domain::webdriver::{CapabilityBag, DriverVariant};
use webgrid_dialect::library::helpers::parse_seconds;

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Negotiates a WebDriver session and reports the dialect spoken by the remote end.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct MainOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        global = true,
        default_value = "info,hyper=warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,

    /// Format of log output
    ///
    /// Formats: text, compact, json
    #[structopt(long, global = true, default_value = "text", env, value_name = "format")]
    pub log_format: LogFormat,

    /// Desired capabilities as a JSON object
    ///
    /// Defaults to the browser defaults when launching a local driver
    #[structopt(long, global = true, parse(try_from_str = parse_capabilities), value_name = "json")]
    pub capabilities: Option<CapabilityBag>,

    /// Required capabilities as a JSON object
    #[structopt(long, global = true, parse(try_from_str = parse_capabilities), value_name = "json")]
    pub required: Option<CapabilityBag>,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Negotiate with an already running remote end
    Remote(RemoteOptions),
    /// Launch a local driver executable and negotiate with it
    Local(LocalOptions),
}

#[derive(Debug, StructOpt)]
pub struct RemoteOptions {
    /// Base URL of the remote end, e.g. http://localhost:4444/wd/hub
    pub url: String,

    /// Maximum duration in seconds the remote end may take to answer its status route
    #[structopt(long, default_value = "60", parse(try_from_str = parse_seconds), value_name = "secs")]
    pub readiness_timeout: Duration,
}

#[derive(Debug, StructOpt)]
pub struct LocalOptions {
    /// Driver variant: chrome, firefox, safari, safari-tp
    pub variant: DriverVariant,

    /// Location of the driver executable, discovered automatically if omitted
    #[structopt(long, env = "WEBDRIVER", parse(from_os_str), value_name = "path")]
    pub driver: Option<PathBuf>,

    /// Port the driver should listen on, 0 picks a free one
    #[structopt(long, default_value = "0")]
    pub port: u16,

    /// Maximum duration in seconds the driver may take to accept connections
    #[structopt(long, default_value = "20", parse(try_from_str = parse_seconds), value_name = "secs")]
    pub startup_timeout: Duration,

    /// Additional argument passed to the driver, may be repeated
    #[structopt(long = "driver-arg", value_name = "arg")]
    pub driver_args: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Text,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err("unknown log format"),
        }
    }
}

fn parse_capabilities(src: &str) -> Result<CapabilityBag, serde_json::Error> {
    serde_json::from_str(src)
}
