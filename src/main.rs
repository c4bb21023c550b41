use anyhow::{Context, Result};
use options::{Command, LogFormat, MainOptions};
use structopt::StructOpt;
use tracing::info;
use webgrid_dialect::domain::webdriver::{
    CapabilityBag, DriverServiceBuilder, DriverVariant, SupplierStrategy,
};

mod options;

#[tokio::main]
async fn main() -> Result<()> {
    let options = init();

    let required = options.required.unwrap_or_default();
    let (strategy, desired) = match options.command {
        Command::Remote(remote) => (
            SupplierStrategy::Remote {
                url: remote.url,
                readiness_timeout: remote.readiness_timeout,
            },
            options.capabilities.unwrap_or_default(),
        ),
        Command::Local(local) => {
            let mut builder = DriverServiceBuilder::new(local.variant)
                .port(local.port)
                .startup_timeout(local.startup_timeout)
                .args(local.driver_args);

            if let Some(driver) = local.driver {
                builder = builder.executable(driver);
            }

            let desired = options
                .capabilities
                .unwrap_or_else(|| browser_defaults(local.variant));

            (SupplierStrategy::Local(builder), desired)
        }
    };

    let supplied = strategy
        .into_supplier()
        .supply(&desired, &required)
        .await
        .context("unable to obtain a session")?;

    let session = supplied.session();
    info!(dialect = %session.dialect(), session_id = %session.session_id(), "Negotiated session");

    if let Some(url) = supplied.service().and_then(|service| service.url()) {
        info!(%url, "Driver service running");
    }

    println!("{}", serde_json::to_string_pretty(session.capabilities())?);

    supplied
        .close()
        .await
        .context("unable to close the session")?;

    Ok(())
}

fn init() -> MainOptions {
    let options = MainOptions::from_args();

    let formatter = tracing_subscriber::fmt().with_env_filter(options.log.as_str());

    match options.log_format {
        LogFormat::Text => formatter.init(),
        LogFormat::Compact => formatter.compact().init(),
        LogFormat::Json => formatter.json().init(),
    };

    info!("webgrid-dialect {}", env!("CARGO_PKG_VERSION"));

    options
}

fn browser_defaults(variant: DriverVariant) -> CapabilityBag {
    match variant {
        DriverVariant::Chrome => CapabilityBag::chrome(),
        DriverVariant::Firefox => CapabilityBag::firefox(),
        DriverVariant::Safari | DriverVariant::SafariTechnologyPreview => CapabilityBag::safari(),
    }
}
