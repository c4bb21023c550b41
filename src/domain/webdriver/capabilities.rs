//! Capability storage and typed capability values
//!
//! A [`CapabilityBag`] is an ordered mapping of capability names to arbitrary JSON values. It
//! deliberately does not validate its contents: keys unknown to this crate are passed through
//! verbatim so vendor specific options reach the remote end untouched. The typed structures in
//! this module mirror the objects described in the [W3C WebDriver Specification](https://www.w3.org/TR/webdriver1/#capabilities)
//! and the legacy wire protocol and can be stored in a bag through the dedicated setters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

/// Identifies the user agent.
pub const BROWSER_NAME: &str = "browserName";
/// Version of the user agent in the legacy dialect.
pub const VERSION: &str = "version";
/// Version of the user agent in the W3C dialect.
pub const BROWSER_VERSION: &str = "browserVersion";
/// Operating system of the endpoint node in the legacy dialect.
pub const PLATFORM: &str = "platform";
/// Operating system of the endpoint node in the W3C dialect.
pub const PLATFORM_NAME: &str = "platformName";
/// Proxy configuration of the session.
pub const PROXY: &str = "proxy";
/// Whether untrusted and self-signed TLS certificates are implicitly trusted.
pub const ACCEPT_INSECURE_CERTS: &str = "acceptInsecureCerts";
/// Page load strategy of the session.
pub const PAGE_LOAD_STRATEGY: &str = "pageLoadStrategy";
/// Whether the window may be resized and repositioned.
pub const SET_WINDOW_RECT: &str = "setWindowRect";
/// Timeouts imposed on certain session operations.
pub const TIMEOUTS: &str = "timeouts";
/// User prompt handler in the legacy dialect.
pub const UNEXPECTED_ALERT_BEHAVIOUR: &str = "unexpectedAlertBehaviour";
/// User prompt handler in the W3C dialect.
pub const UNHANDLED_PROMPT_BEHAVIOUR: &str = "unhandledPromptBehavior";
/// Strict interactability checks for `input type=file` elements.
pub const STRICT_FILE_INTERACTABILITY: &str = "strictFileInteractability";
/// Whether JavaScript execution is supported (legacy dialect only).
pub const SUPPORTS_JAVASCRIPT: &str = "javascriptEnabled";
/// Requests a fresh browser profile (legacy Internet Explorer server only).
pub const ENSURING_CLEAN_SESSION: &str = "ensureCleanSession";

/// Capability names defined by the W3C specification
///
/// Together with vendor extension keys (`namespace:name`) these are the only names a
/// W3C compliant remote end accepts in `alwaysMatch` and `firstMatch`.
pub const W3C_CAPABILITY_NAMES: &[&str] = &[
    ACCEPT_INSECURE_CERTS,
    BROWSER_NAME,
    BROWSER_VERSION,
    PLATFORM_NAME,
    PAGE_LOAD_STRATEGY,
    PROXY,
    SET_WINDOW_RECT,
    STRICT_FILE_INTERACTABILITY,
    TIMEOUTS,
    UNHANDLED_PROMPT_BEHAVIOUR,
];

/// Timeout values for requests to the browser
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    /// Determines when to interrupt a script that is being evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<u64>,
    /// Provides the timeout limit used to interrupt navigation of the browsing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_load: Option<u64>,
    /// Gives the timeout of when to abort locating an element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implicit: Option<u64>,
}

/// Describes which DOM event is used to determine whether or not a page has finished loading
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PageLoadStrategy {
    /// Only page download, no parsing or asset loading
    None,
    /// Wait until all HTML content has been parsed, discarding assets
    ///
    /// This strategy waits until the [DOMContentLoaded](https://developer.mozilla.org/en-US/docs/Web/API/Document/DOMContentLoaded_event) event is fired
    Eager,
    /// Wait until all assets have been parsed and executed
    ///
    /// This strategy waits until the [load](https://developer.mozilla.org/en-US/docs/Web/API/Window/load_event) event is fired.
    /// Note that this may not indicate that async JavaScript has finished executing!
    Normal,
}

/// How popups like alerts or prompts should be handled
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UnexpectedAlertBehaviour {
    /// All simple dialogs encountered should be dismissed.
    Dismiss,
    /// All simple dialogs encountered should be accepted.
    Accept,
    /// All simple dialogs encountered should be dismissed, and an error returned that the dialog was handled.
    #[serde(rename = "dismiss and notify")]
    DismissAndNotify,
    /// All simple dialogs encountered should be accepted, and an error returned that the dialog was handled.
    #[serde(rename = "accept and notify")]
    AcceptAndNotify,
    /// All simple dialogs encountered should be left to the user to handle.
    Ignore,
}

/// Kind of proxy configuration
///
/// Serialized in the upper case spelling of the legacy wire protocol. The W3C dialect expects
/// lower case values which is taken care of when the capabilities are encoded.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyType {
    /// Direct connection, no proxy
    Direct,
    /// Manual proxy settings (e.g. for http_proxy)
    Manual,
    /// Proxy auto-configuration from URL
    Pac,
    /// Never used
    #[serde(rename = "RESERVED_1")]
    Reserved1,
    /// Proxy auto-detection (presumably with WPAD)
    Autodetect,
    /// Use system settings
    System,
    /// Not initialized
    Unspecified,
}

/// HTTP proxy settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    /// Indicates the type of proxy configuration.
    pub proxy_type: ProxyType,
    /// Defines the URL for a proxy auto-config file if proxy_type is equal to "pac".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_autoconfig_url: Option<String>,
    /// Defines the proxy host for FTP traffic when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftp_proxy: Option<String>,
    /// Defines the proxy host for HTTP traffic when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    /// Lists the address for which the proxy should be bypassed when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<Vec<String>>,
    /// Defines the proxy host for encrypted TLS traffic when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_proxy: Option<String>,
    /// Defines the proxy host for a SOCKS proxy when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socks_proxy: Option<String>,
    /// Defines the SOCKS proxy version when the proxy_type is "manual".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socks_version: Option<u8>,
}

impl Proxy {
    /// Proxy settings of the given type without any further details
    pub fn new(proxy_type: ProxyType) -> Self {
        Self {
            proxy_type,
            proxy_autoconfig_url: None,
            ftp_proxy: None,
            http_proxy: None,
            no_proxy: None,
            ssl_proxy: None,
            socks_proxy: None,
            socks_version: None,
        }
    }
}

fn to_value_lossy<T: Serialize>(key: &str, value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(key, error = %e, "Unable to serialize capability value");
        Value::Null
    })
}

/// Ordered mapping of capability names to arbitrary values
///
/// Keys are case sensitive. Setting the legacy [`UNEXPECTED_ALERT_BEHAVIOUR`] key also sets
/// [`UNHANDLED_PROMPT_BEHAVIOUR`] so both dialects see the setting under their own name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityBag(Map<String, Value>);

impl CapabilityBag {
    /// Empty bag, contains not even default values
    pub fn new() -> Self {
        Self(Map::new())
    }

    fn for_browser(browser: &str, platform: &str) -> Self {
        let mut bag = Self::new();
        bag.set(BROWSER_NAME, browser)
            .set(VERSION, "")
            .set(PLATFORM, platform);
        bag
    }

    /// Capabilities requesting Google Chrome
    pub fn chrome() -> Self {
        Self::for_browser("chrome", "ANY")
    }

    /// Capabilities requesting Mozilla Firefox
    pub fn firefox() -> Self {
        let mut bag = Self::for_browser("firefox", "ANY");
        bag.set(ACCEPT_INSECURE_CERTS, true);
        bag
    }

    /// Capabilities requesting Apple Safari
    pub fn safari() -> Self {
        Self::for_browser("safari", "MAC")
    }

    /// Capabilities requesting Microsoft Edge
    pub fn edge() -> Self {
        Self::for_browser("MicrosoftEdge", "WINDOWS")
    }

    /// Capabilities requesting Internet Explorer with a clean profile
    pub fn internet_explorer() -> Self {
        let mut bag = Self::for_browser("internet explorer", "WINDOWS");
        bag.set(ENSURING_CLEAN_SESSION, true);
        bag
    }

    /// Capabilities requesting Opera
    pub fn opera() -> Self {
        Self::for_browser("opera", "ANY")
    }

    /// Capabilities requesting the HtmlUnit headless browser
    pub fn html_unit() -> Self {
        Self::for_browser("htmlunit", "ANY")
    }

    /// Value stored for a capability
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether a value is stored for the capability
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Stores a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();

        if key == UNEXPECTED_ALERT_BEHAVIOUR {
            self.0
                .insert(UNHANDLED_PROMPT_BEHAVIOUR.to_string(), value.clone());
        }

        self.0.insert(key, value);
        self
    }

    /// Removes a capability and returns its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Stores the proxy configuration
    pub fn set_proxy(&mut self, proxy: &Proxy) -> &mut Self {
        let value = to_value_lossy(PROXY, proxy);
        self.set(PROXY, value)
    }

    /// Stores the page load strategy
    pub fn set_page_load_strategy(&mut self, strategy: PageLoadStrategy) -> &mut Self {
        let value = to_value_lossy(PAGE_LOAD_STRATEGY, &strategy);
        self.set(PAGE_LOAD_STRATEGY, value)
    }

    /// Stores the prompt handler under its legacy name (and thereby also its W3C name)
    pub fn set_unexpected_alert_behaviour(
        &mut self,
        behaviour: UnexpectedAlertBehaviour,
    ) -> &mut Self {
        let value = to_value_lossy(UNEXPECTED_ALERT_BEHAVIOUR, &behaviour);
        self.set(UNEXPECTED_ALERT_BEHAVIOUR, value)
    }

    /// Stores the session timeouts
    pub fn set_timeouts(&mut self, timeouts: &Timeouts) -> &mut Self {
        let value = to_value_lossy(TIMEOUTS, timeouts);
        self.set(TIMEOUTS, value)
    }

    /// Name of the requested or provided browser
    pub fn browser_name(&self) -> Option<&str> {
        self.get(BROWSER_NAME).and_then(Value::as_str)
    }

    /// Stored proxy configuration, if it can be parsed
    pub fn proxy(&self) -> Option<Proxy> {
        self.get(PROXY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether insecure certificates are accepted, defaults to `true` when unset or unparsable
    pub fn accept_insecure_certs(&self) -> bool {
        match self.get(ACCEPT_INSECURE_CERTS) {
            Some(Value::Bool(accept)) => *accept,
            Some(Value::String(raw)) => raw.eq_ignore_ascii_case("true"),
            _ => true,
        }
    }

    /// Combines two bags into a new one, values from `other` win on conflict
    pub fn merge(&self, other: &CapabilityBag) -> CapabilityBag {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.set(key.clone(), value.clone());
        }
        merged
    }

    /// Read-only view of the underlying mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Iterates over all capabilities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of stored capabilities
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no capability is stored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the bag and returns the underlying mapping
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for CapabilityBag {
    fn from(map: Map<String, Value>) -> Self {
        let mut bag = Self(map);

        if let Some(behaviour) = bag.get(UNEXPECTED_ALERT_BEHAVIOUR).cloned() {
            bag.0
                .insert(UNHANDLED_PROMPT_BEHAVIOUR.to_string(), behaviour);
        }

        bag
    }
}

impl Serialize for CapabilityBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilityBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from)
    }
}
