//! Types and logic in accordance with the [WebDriver](https://github.com/w3c/webdriver) specification
//! and the legacy JSON wire protocol that preceded it
//!
//! A remote end may speak either [`Dialect`]. The [`handshake`](create_session) sends a single
//! new-session request that satisfies both at once and determines the dialect from the shape
//! of the reply. Responses to that and all subsequent commands are interpreted by the
//! [`ResponseCodec`]. Local driver executables are supervised by a [`DriverService`].

mod capabilities;
mod codec;
mod dialect;
mod error;
mod handshake;
mod service;
mod session;
mod supplier;
mod variant;

pub use capabilities::*;
pub use codec::*;
pub use dialect::*;
pub use error::*;
pub use handshake::*;
pub use service::*;
pub use session::*;
pub use supplier::*;
pub use variant::*;
