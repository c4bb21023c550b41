//! Standardised WebDriver error taxonomy
//!
//! Every error a remote end may report is classified as an [`ErrorKind`]. The W3C dialect
//! identifies errors by a string (e.g. `"no such element"`) and an HTTP status, the legacy
//! dialect by a numeric status code. Both spellings are kept in one immutable table which is
//! indexed once on first use and shared read-only afterwards.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::library::communication::BlackboxError;

/// Legacy numeric status of a successful command
pub const SUCCESS_CODE: i64 = 0;

/// Classification of a protocol level failure, independent of its wire spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A command could not be executed because the session does not exist or is no longer active.
    NoSuchSession,
    /// An element could not be located on the page using the given search parameters.
    NoSuchElement,
    /// A command to switch to a frame could not be satisfied because the frame could not be found.
    NoSuchFrame,
    /// A command could not be executed because the remote end is not aware of it.
    UnknownCommand,
    /// The referenced element is no longer attached to the DOM.
    StaleElementReference,
    /// The element is present in the DOM but not visible (legacy dialect).
    ElementNotVisible,
    /// The element is in a state that does not allow the command.
    InvalidElementState,
    /// An unknown error occurred in the remote end while processing the command.
    UnknownError,
    /// The element can not be selected (legacy dialect).
    ElementNotSelectable,
    /// An error occurred while executing JavaScript supplied by the user.
    JavascriptError,
    /// An XPath expression could not be evaluated (legacy dialect).
    XPathLookupError,
    /// An operation did not complete before its timeout expired.
    Timeout,
    /// A command to switch to a window could not be satisfied because the window could not be found.
    NoSuchWindow,
    /// A cookie was set on a domain different from the current page.
    InvalidCookieDomain,
    /// A command to set a cookie's value could not be satisfied.
    UnableToSetCookie,
    /// A modal dialog was open, blocking this operation.
    UnhandledAlert,
    /// An attempt was made to operate on a modal dialog when one was not open.
    NoSuchAlert,
    /// A script did not complete before its timeout expired.
    ScriptTimeout,
    /// The coordinates provided to an interaction are invalid (legacy dialect).
    InvalidElementCoordinates,
    /// Input method editors are not available (legacy dialect).
    ImeNotAvailable,
    /// An input method editor engine could not be started (legacy dialect).
    ImeEngineActivationFailed,
    /// The selector used to find an element does not identify an element.
    InvalidSelector,
    /// A new session could not be created.
    SessionNotCreated,
    /// The target for mouse interaction is not in the browser's viewport.
    MoveTargetOutOfBounds,
    /// The XPath selector is syntactically invalid (legacy dialect).
    InvalidXPathSelector,
    /// The XPath selector does not select elements (legacy dialect).
    InvalidXPathSelectorReturnType,
    /// The element can not be interacted with because it is not pointer or keyboard interactable.
    ElementNotInteractable,
    /// The arguments passed to a command are either invalid or malformed.
    InvalidArgument,
    /// No cookie matching the given path name was found.
    NoSuchCookie,
    /// A screen capture was made impossible.
    UnableToCaptureScreen,
    /// The element click command could not be completed because another element would receive the click.
    ElementClickIntercepted,
    /// The requested command matched a known URL but did not match a method for that URL.
    UnknownMethod,
}

struct KnownError {
    kind: ErrorKind,
    code: i64,
    state: &'static str,
    http_status: u16,
    canonical: bool,
}

macro_rules! known_errors {
    ($($kind:ident = ($code:expr, $state:expr, $status:expr, $canonical:expr);)+) => {
        const KNOWN_ERRORS: &[KnownError] = &[
            $(
                KnownError {
                    kind: ErrorKind::$kind,
                    code: $code,
                    state: $state,
                    http_status: $status,
                    canonical: $canonical,
                },
            )+
        ];
    };
}

known_errors! {
    NoSuchSession = (6, "invalid session id", 404, true);
    NoSuchElement = (7, "no such element", 404, true);
    NoSuchFrame = (8, "no such frame", 404, true);
    UnknownCommand = (9, "unknown command", 404, true);
    StaleElementReference = (10, "stale element reference", 404, true);
    ElementNotVisible = (11, "element not visible", 400, true);
    InvalidElementState = (12, "invalid element state", 400, true);
    UnknownError = (13, "unknown error", 500, true);
    ElementNotSelectable = (15, "element not selectable", 400, true);
    JavascriptError = (17, "javascript error", 500, true);
    XPathLookupError = (19, "invalid selector", 400, false);
    Timeout = (21, "timeout", 500, true);
    NoSuchWindow = (23, "no such window", 404, true);
    InvalidCookieDomain = (24, "invalid cookie domain", 400, true);
    UnableToSetCookie = (25, "unable to set cookie", 500, true);
    UnhandledAlert = (26, "unexpected alert open", 500, true);
    NoSuchAlert = (27, "no such alert", 404, true);
    ScriptTimeout = (28, "script timeout", 500, true);
    InvalidElementCoordinates = (29, "invalid element coordinates", 400, true);
    ImeNotAvailable = (30, "unsupported operation", 500, true);
    ImeEngineActivationFailed = (31, "unsupported operation", 500, false);
    InvalidSelector = (32, "invalid selector", 400, true);
    SessionNotCreated = (33, "session not created", 500, true);
    MoveTargetOutOfBounds = (34, "move target out of bounds", 500, true);
    InvalidXPathSelector = (51, "invalid selector", 400, false);
    InvalidXPathSelectorReturnType = (52, "invalid selector", 400, false);
    ElementNotInteractable = (60, "element not interactable", 400, true);
    InvalidArgument = (61, "invalid argument", 400, true);
    NoSuchCookie = (62, "no such cookie", 404, true);
    UnableToCaptureScreen = (63, "unable to capture screen", 500, true);
    ElementClickIntercepted = (64, "element click intercepted", 400, true);
    UnknownMethod = (405, "unknown method", 405, true);
}

const UNKNOWN_ERROR: KnownError = KnownError {
    kind: ErrorKind::UnknownError,
    code: 13,
    state: "unknown error",
    http_status: 500,
    canonical: true,
};

lazy_static! {
    static ref BY_STATE: HashMap<&'static str, Vec<&'static KnownError>> = {
        let mut map: HashMap<&'static str, Vec<&'static KnownError>> = HashMap::new();
        for entry in KNOWN_ERRORS {
            map.entry(entry.state).or_default().push(entry);
        }
        // Kinds native to the W3C dialect come first among entries sharing a wire string
        for candidates in map.values_mut() {
            candidates.sort_by_key(|entry| !entry.canonical);
        }
        map
    };
    static ref BY_CODE: HashMap<i64, &'static KnownError> =
        KNOWN_ERRORS.iter().map(|entry| (entry.code, entry)).collect();
    static ref BY_KIND: HashMap<ErrorKind, &'static KnownError> =
        KNOWN_ERRORS.iter().map(|entry| (entry.kind, entry)).collect();
}

impl ErrorKind {
    fn entry(self) -> &'static KnownError {
        BY_KIND.get(&self).copied().unwrap_or(&UNKNOWN_ERROR)
    }

    /// Resolves a wire error string to its kind
    ///
    /// Some strings are shared by multiple kinds, in which case the W3C native one registered
    /// for the given HTTP status is preferred, falling back to the W3C native one regardless
    /// of status.
    /// Unrecognized strings resolve to [`ErrorKind::UnknownError`].
    pub fn from_wire(error: &str, http_status: Option<u16>) -> ErrorKind {
        let candidates = match BY_STATE.get(error) {
            Some(candidates) => candidates,
            None => return ErrorKind::UnknownError,
        };

        http_status
            .and_then(|status| candidates.iter().find(|c| c.http_status == status))
            .or_else(|| candidates.first())
            .map(|entry| entry.kind)
            .unwrap_or(ErrorKind::UnknownError)
    }

    /// Resolves a legacy numeric status code
    ///
    /// Returns `None` for [`SUCCESS_CODE`], unknown codes resolve to [`ErrorKind::UnknownError`].
    pub fn from_legacy_code(code: i64) -> Option<ErrorKind> {
        if code == SUCCESS_CODE {
            return None;
        }

        Some(
            BY_CODE
                .get(&code)
                .map(|entry| entry.kind)
                .unwrap_or(ErrorKind::UnknownError),
        )
    }

    /// Error string used by the W3C dialect
    pub fn wire_name(self) -> &'static str {
        self.entry().state
    }

    /// Numeric status code used by the legacy dialect
    pub fn legacy_code(self) -> i64 {
        self.entry().code
    }

    /// HTTP status a remote end responds with
    pub fn http_status(self) -> u16 {
        self.entry().http_status
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Error thrown while parsing an [`ErrorKind`] from its wire name
#[derive(Debug, Error)]
#[error("unknown webdriver error string '{0}'")]
pub struct ErrorKindParseError(String);

impl FromStr for ErrorKind {
    type Err = ErrorKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BY_STATE
            .get(s)
            .and_then(|candidates| candidates.first())
            .map(|entry| entry.kind)
            .ok_or_else(|| ErrorKindParseError(s.to_string()))
    }
}

/// Error reported by a remote end or to be reported to a local end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDriverError {
    /// Classification of the error
    pub kind: ErrorKind,
    /// Human readable description
    pub message: String,
    /// Text of the open dialog for [`ErrorKind::UnhandledAlert`] errors
    pub alert_text: Option<String>,
    /// Textual stacktrace, possibly empty
    pub stacktrace: String,
}

impl WebDriverError {
    /// Creates a new error without stacktrace
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            alert_text: None,
            stacktrace: String::new(),
        }
    }

    /// Creates an error for a dialog that blocked the command
    pub fn unhandled_alert(message: impl Into<String>, alert_text: impl Into<String>) -> Self {
        Self {
            alert_text: Some(alert_text.into()),
            ..Self::new(ErrorKind::UnhandledAlert, message)
        }
    }

    /// Attaches a stacktrace
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = stacktrace.into();
        self
    }

    /// Text of the dialog which caused the error, if any
    pub fn alert_text(&self) -> Option<&str> {
        self.alert_text.as_deref()
    }
}

impl fmt::Display for WebDriverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(text) = &self.alert_text {
            write!(f, " (alert text: {})", text)?;
        }

        Ok(())
    }
}

impl std::error::Error for WebDriverError {}

impl From<(ErrorKind, BlackboxError)> for WebDriverError {
    fn from((kind, blackbox): (ErrorKind, BlackboxError)) -> Self {
        let message = blackbox.message().unwrap_or(kind.wire_name()).to_owned();

        Self::new(kind, message).with_stacktrace(blackbox.stacktrace())
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn resolve_wire_strings() {
        assert_eq!(
            ErrorKind::from_wire("no such element", Some(404)),
            ErrorKind::NoSuchElement
        );
        assert_eq!(
            ErrorKind::from_wire("stale element reference", None),
            ErrorKind::StaleElementReference
        );
        assert_eq!(
            ErrorKind::from_wire("unexpected alert open", Some(500)),
            ErrorKind::UnhandledAlert
        );
    }

    #[test]
    fn fall_back_to_unknown_error() {
        assert_eq!(
            ErrorKind::from_wire("cheese too mouldy", Some(500)),
            ErrorKind::UnknownError
        );
        assert_eq!(ErrorKind::from_wire("", None), ErrorKind::UnknownError);
        assert_eq!(ErrorKind::from_legacy_code(9999), Some(ErrorKind::UnknownError));
    }

    #[test]
    fn prefer_w3c_native_kind_for_shared_strings() {
        // "invalid selector" is shared by four legacy codes, all reported with 400
        assert_eq!(
            ErrorKind::from_wire("invalid selector", Some(400)),
            ErrorKind::InvalidSelector
        );
        assert_eq!(
            ErrorKind::from_wire("invalid selector", None),
            ErrorKind::InvalidSelector
        );
        assert_eq!(ErrorKind::InvalidSelector.legacy_code(), 32);
        assert_eq!(
            "invalid selector".parse::<ErrorKind>().unwrap(),
            ErrorKind::InvalidSelector
        );
        assert_eq!(
            ErrorKind::from_wire("unsupported operation", Some(418)),
            ErrorKind::ImeNotAvailable
        );
    }

    #[test]
    fn resolve_each_wire_string_back_to_a_w3c_native_kind() {
        for entry in KNOWN_ERRORS.iter().filter(|entry| entry.canonical) {
            assert_eq!(
                ErrorKind::from_wire(entry.state, Some(entry.http_status)),
                entry.kind
            );
        }
    }

    #[test]
    fn map_every_kind_consistently() {
        for entry in KNOWN_ERRORS {
            assert_eq!(entry.kind.wire_name(), entry.state);
            assert_eq!(entry.kind.legacy_code(), entry.code);
            assert_eq!(entry.kind.http_status(), entry.http_status);
            assert_eq!(ErrorKind::from_legacy_code(entry.code), Some(entry.kind));
        }
    }

    #[test]
    fn treat_zero_as_success() {
        assert_eq!(ErrorKind::from_legacy_code(SUCCESS_CODE), None);
    }

    #[test]
    fn parse_from_wire_name() {
        let kind: ErrorKind = "session not created".parse().unwrap();
        assert_eq!(kind, ErrorKind::SessionNotCreated);
        assert_eq!(kind.to_string(), "session not created");
        assert!("definitely not an error".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn build_from_blackbox() {
        let blackbox = BlackboxError::from_message("driver crashed");
        let error: WebDriverError = (ErrorKind::SessionNotCreated, blackbox).into();

        assert_eq!(error.kind, ErrorKind::SessionNotCreated);
        assert_eq!(error.message, "driver crashed");
        assert_eq!(error.stacktrace, "driver crashed");
        assert_eq!(error.alert_text(), None);
    }

    #[test]
    fn display_alert_text() {
        let error = WebDriverError::unhandled_alert("modal dialog present", "Hello");
        assert_eq!(
            error.to_string(),
            "unexpected alert open: modal dialog present (alert text: Hello)"
        );
    }
}
