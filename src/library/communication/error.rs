use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::iter::successors;

use crate::library::BoxedError;

/// Type erased error which retains the error chain information
///
/// A remote end only understands a message and a textual stacktrace. This type flattens
/// an arbitrary error and its `source()` chain into a list of causes so both can be derived
/// from it without knowing the concrete error types involved.
///
/// When the Error from which this is created contains another BlackboxError in its
/// source chain, it will be consumed and integrated so that one nicely formatted
/// stacktrace can be provided at the top-most level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackboxError {
    causes: Vec<String>,
}

impl BlackboxError {
    /// Creates a new instance from any error type
    ///
    /// Due to std providing default implementations for the `From<T> where T: T` trait,
    /// we can't both implement `Error` and `From<Error>` and have to decide on one.
    pub fn new<E: Error + 'static>(e: E) -> Self {
        (&e as &(dyn Error + 'static)).into()
    }

    /// Creates a new instance from a boxed error type
    pub fn from_boxed(e: BoxedError) -> Self {
        (e.as_ref() as &(dyn Error + 'static)).into()
    }

    /// Creates an instance from a plain message without any causes
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            causes: vec![message.into()],
        }
    }

    /// Top-most error message, if any
    pub fn message(&self) -> Option<&str> {
        self.causes.first().map(String::as_str)
    }

    /// All messages in the chain, outermost first
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Renders the cause chain as a textual stacktrace, one frame per line
    pub fn stacktrace(&self) -> String {
        self.causes.join("\n")
    }
}

impl Error for BlackboxError {}

impl Display for BlackboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.causes.split_first() {
            None => f.write_str("unknown error"),
            Some((message, causes)) => {
                f.write_str(message)?;
                for cause in causes {
                    write!(f, "\n  caused by: {}", cause)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&(dyn Error + 'static)> for BlackboxError {
    fn from(e: &(dyn Error + 'static)) -> Self {
        let causes = successors(Some(e), |&error| error.source())
            .flat_map(|error| match error.downcast_ref::<BlackboxError>() {
                // Nested chains are spliced in instead of being rendered as one line
                Some(nested) => nested.causes.clone(),
                None => vec![error.to_string()],
            })
            .collect();

        Self { causes }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    enum TestError {
        #[error("driver did not come up")]
        Startup(#[from] BlackboxError),
        #[error("unable to reach driver")]
        Connect(#[from] std::io::Error),
    }

    fn with_causes(causes: &[&str]) -> BlackboxError {
        BlackboxError {
            causes: causes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn handle_no_cause() {
        let error = with_causes(&[]);
        assert_eq!(error.to_string(), "unknown error");
        assert_eq!(error.message(), None);
    }

    #[test]
    fn consume_nested() {
        let lower_error = with_causes(&["connection refused", "os error 111"]);
        let middle_error = TestError::from(lower_error);
        let high_error = BlackboxError::from(&middle_error as &(dyn Error + 'static));

        assert_eq!(
            high_error.causes(),
            ["driver did not come up", "connection refused", "os error 111"]
        );
    }

    #[test]
    fn walk_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let error = TestError::from(io);
        let blackbox = BlackboxError::from(&error as &(dyn Error + 'static));

        assert_eq!(
            blackbox.causes(),
            ["unable to reach driver", "connection refused"]
        );
    }

    #[test]
    fn format_correctly() {
        let formatted = with_causes(&["cause1", "cause2", "cause3"]).to_string();

        assert_eq!(
            formatted,
            "cause1\n  caused by: cause2\n  caused by: cause3"
        )
    }

    #[test]
    fn render_stacktrace() {
        let error = with_causes(&["no such element", "lookup failed"]);
        assert_eq!(error.stacktrace(), "no such element\nlookup failed");
        assert_eq!(error.message(), Some("no such element"));
    }
}
