//! Structures for carrying errors across process boundaries

mod error;

pub use error::BlackboxError;
