//! Structural atoms shared by every binast crate.
//!
//! This crate holds the pieces with no opinion about ASTs or probability
//! models: the error types every fallible operation returns, and the
//! byte-level integer encoding the container format is built from.

pub mod error;
pub mod varint;

pub use error::{Error, Result};
pub use varint::{read_bytes, read_u8, read_varint, write_varint};
