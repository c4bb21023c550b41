use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{SAFARI_DRIVER_EXECUTABLE, SAFARI_TP_DRIVER_EXECUTABLE};

/// Vendors for WebDriver executables
///
/// Used to determine the executable name, its default install location and the command line
/// arguments that tell it which port to listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverVariant {
    /// [Google Chrome](http://chrome.google.com) controlled through [`chromedriver`](https://sites.google.com/chromium.org/driver/)
    Chrome,
    /// Mozilla [Firefox](https://www.mozilla.org/en-US/firefox/) controlled through [`geckodriver`](https://github.com/mozilla/geckodriver)
    Firefox,
    /// [Safari](https://www.apple.com/safari/) browser developed by Apple and controlled by the `safaridriver` executable available on macOS
    Safari,
    /// Preview release of Safari which ships its own `safaridriver`
    SafariTechnologyPreview,
}

impl FromStr for DriverVariant {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            "safari" => Ok(Self::Safari),
            "safari-tp" | "safaritechnologypreview" => Ok(Self::SafariTechnologyPreview),
            _ => Err("unknown webdriver variant"),
        }
    }
}

impl fmt::Display for DriverVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DriverVariant::Chrome => "chrome",
            DriverVariant::Firefox => "firefox",
            DriverVariant::Safari => "safari",
            DriverVariant::SafariTechnologyPreview => "safari-tp",
        };

        write!(f, "{}", name)
    }
}

impl DriverVariant {
    /// Name of the executable as it would be found on the `PATH`
    pub fn executable_name(&self) -> String {
        let name = match self {
            DriverVariant::Chrome => "chromedriver",
            DriverVariant::Firefox => "geckodriver",
            DriverVariant::Safari | DriverVariant::SafariTechnologyPreview => "safaridriver",
        };

        if cfg!(windows) {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }

    /// Platform specific install locations checked before falling back to the `PATH`
    pub fn default_locations(&self) -> Vec<PathBuf> {
        match self {
            DriverVariant::Safari => vec![PathBuf::from(SAFARI_DRIVER_EXECUTABLE)],
            DriverVariant::SafariTechnologyPreview => {
                vec![PathBuf::from(SAFARI_TP_DRIVER_EXECUTABLE)]
            }
            DriverVariant::Chrome | DriverVariant::Firefox => Vec::new(),
        }
    }

    /// Whether the executable may be discovered through the `PATH`
    ///
    /// The preview build lives outside of it and would otherwise resolve to the regular `safaridriver`.
    pub fn searches_path(&self) -> bool {
        !matches!(self, DriverVariant::SafariTechnologyPreview)
    }

    /// Arguments instructing the driver to listen on the given port
    pub fn port_arguments(&self, port: u16) -> Vec<String> {
        match self {
            DriverVariant::Chrome => vec![format!("--port={}", port)],
            DriverVariant::Firefox
            | DriverVariant::Safari
            | DriverVariant::SafariTechnologyPreview => {
                vec!["--port".to_string(), port.to_string()]
            }
        }
    }
}
