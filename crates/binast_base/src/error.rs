//! Error types for encoding and decoding.
//!
//! Every failure is fatal to the current operation; nothing is retried.
//! Each variant carries enough context to diagnose the failure: the
//! attribute path for schema violations, the model id for coder
//! disagreements, the offending section for malformed containers.
//!
//! # Example
//!
//! ```
//! use binast_base::{Error, Result};
//!
//! fn reject(version: u8) -> Result<()> {
//!     Err(Error::format(format!("unsupported format version {version}")))
//! }
//!
//! let err = reject(7).unwrap_err();
//! assert!(err.to_string().contains("version 7"));
//! ```

use std::fmt;
use std::io;

/// A fatal encoding or decoding failure.
#[derive(Debug)]
pub enum Error {
    /// The tree does not conform to the schema. The caller supplied an
    /// invalid input; `path` names the offending attribute.
    SchemaViolation {
        /// Attribute path from the root, e.g. `Script.statements[3].expression`.
        path: String,
        /// What did not conform.
        message: String,
    },
    /// A symbol to be encoded is absent from its distribution, or a decoded
    /// symbol is not of the kind the tree position requires.
    ModelMismatch {
        /// Which model the disagreement occurred in.
        context: String,
        /// What disagreed.
        message: String,
    },
    /// Wrong magic, unsupported version, truncated section, or a failure in
    /// the generic compression layer.
    FormatMismatch(String),
    /// The decoder's position after a lazy piece does not equal the piece
    /// boundary declared in the lazy index.
    LazyFrameMismatch {
        /// Byte offset the index declared.
        expected: u64,
        /// Byte offset the decoder actually reached.
        found: u64,
    },
    /// An I/O failure on a caller-provided stream.
    Io(io::Error),
}

impl Error {
    /// Creates a [`Error::SchemaViolation`].
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaViolation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a [`Error::ModelMismatch`].
    pub fn model(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ModelMismatch {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a [`Error::FormatMismatch`].
    pub fn format(message: impl Into<String>) -> Self {
        Error::FormatMismatch(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SchemaViolation { path, message } => {
                write!(f, "schema violation at {path}: {message}")
            }
            Error::ModelMismatch { context, message } => {
                write!(f, "model mismatch in {context}: {message}")
            }
            Error::FormatMismatch(message) => write!(f, "format mismatch: {message}"),
            Error::LazyFrameMismatch { expected, found } => write!(
                f,
                "lazy frame mismatch: piece boundary declared at {expected}, decoder stopped at {found}"
            ),
            Error::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violation_display_names_the_path() {
        let err = Error::schema("Script.statements[0]", "expected a node");
        let text = err.to_string();
        assert!(text.contains("Script.statements[0]"));
        assert!(text.contains("expected a node"));
    }

    #[test]
    fn model_mismatch_display_names_the_context() {
        let err = Error::model("model 17", "symbol has zero weight");
        assert!(err.to_string().contains("model 17"));
    }

    #[test]
    fn lazy_frame_mismatch_reports_both_offsets() {
        let err = Error::LazyFrameMismatch {
            expected: 120,
            found: 118,
        };
        let text = err.to_string();
        assert!(text.contains("120"));
        assert!(text.contains("118"));
    }

    #[test]
    fn io_errors_convert_and_expose_a_source() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
