//! This library crate contains the client side of the WebDriver remote-control wire protocol.
//!
//! Submodules have been introduced to split responsibilities. The project agnostic [`library`]
//! contains the transport seam and small helpers, while the WebDriver specific logic lives in
//! [`domain`]. That includes negotiating the protocol dialect spoken by a remote end, encoding
//! and decoding wire responses, and supervising a locally spawned driver executable.

#![deny(missing_docs)]

pub mod constants;
pub mod domain;
pub mod library;
