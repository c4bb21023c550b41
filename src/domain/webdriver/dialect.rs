use std::fmt;

/// Wire format spoken by a remote end
///
/// Only ever determined from a response to the new-session request, never assumed upfront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The JSON wire protocol which predates the W3C specification
    Legacy,
    /// The protocol standardised by the W3C
    W3c,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dialect::Legacy => write!(f, "legacy"),
            Dialect::W3c => write!(f, "W3C"),
        }
    }
}
