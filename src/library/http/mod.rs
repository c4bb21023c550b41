//! Structures for sending single HTTP requests to remote endpoints
//!
//! The [`HttpClient`] trait is the seam between the protocol logic and the network. Everything
//! above it only ever sends one request and looks at one response.

mod client;
mod hyper_client;

pub(crate) use client::JSON_CONTENT_TYPE;
pub use client::{HttpClient, HttpRequest, HttpResponse};
pub use hyper_client::{HyperClient, TransportError};
