//! Independent and project agnostic libraries
//!
//! Ideally, any of the library submodules in this module can be extracted into their own crate
//! at any given time. Everything WebDriver specific has been extracted into the
//! [`domain`](super::domain) module.

pub mod communication;
pub mod helpers;
pub mod http;

/// Generic error type
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;
