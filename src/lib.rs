//! BinAST context-0.1: a compact binary container for ECMAScript ASTs.
//!
//! A tree typed by an IDL schema is compressed into a self-delimited byte
//! sequence: magic and version, then a brotli frame carrying the per-file
//! string table, a per-AST probability model, an arithmetic-coded
//! serialization of the tree, and deferred ("lazy") subtrees addressed by
//! an intra-stream offset index.
//!
//! The three workspace crates split the work the way the pipeline does:
//! `binast-base` holds varints and error types, `binast-schema` the type
//! universe, trees and conformance passes, `binast-codec` the coder,
//! models and container. This crate re-exports the public surface.
//!
//! # Example
//!
//! ```
//! use binast::{from_json, parse_idl, read, write};
//!
//! let schema = parse_idl(r#"
//!     interface Script { attribute FrozenArray<Directive> directives; };
//!     interface Directive { attribute DOMString rawValue; };
//! "#)?;
//! let root = schema.interface("Script").unwrap();
//! let tree = from_json(&schema, &serde_json::json!({
//!     "type": "Script",
//!     "directives": [{ "type": "Directive", "rawValue": "use strict" }],
//! }))?;
//!
//! let mut bytes = Vec::new();
//! let mut input = tree.clone();
//! write(&schema, &[], root, &mut input, &mut bytes)?;
//!
//! let decoded = read(&schema, &[], root, &mut bytes.as_slice())?;
//! assert_eq!(decoded, tree);
//! # Ok::<(), binast::Error>(())
//! ```

pub use binast_base::{Error, Result};
pub use binast_codec::{prepare_dict, read, write, MAGIC, VERSION};
pub use binast_schema::{
    from_json, matching_member, parse_idl, to_json, walk_types, Attribute, FloatFixer, Primitive,
    Schema, SchemaBuilder, TypeChecker, TypeDef, TypeId, TypeVisitor, Value,
};

#[cfg(feature = "cli")]
pub mod cli;
