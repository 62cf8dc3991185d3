//! The IDL type universe and the trees that inhabit it.
//!
//! A [`Schema`] is an arena of types reachable from a designated root
//! interface (`Script` for whole programs): interfaces with ordered
//! attributes, tagged alternations, enumerations, primitives and frozen
//! arrays. Trees are [`Value`]s whose shape the schema constrains; the
//! [`tycheck`] passes coerce and verify that shape before any encoding
//! happens.
//!
//! The schema is built once, either programmatically through
//! [`SchemaBuilder`] or by parsing the WebIDL subset in [`idl`], and is
//! immutable and shareable afterwards.

pub mod ast;
pub mod idl;
pub mod types;
pub mod tycheck;
pub mod value;
pub mod walker;

pub use ast::{from_json, to_json};
pub use idl::parse_idl;
pub use types::{Attribute, Primitive, Schema, SchemaBuilder, TypeDef, TypeId};
pub use tycheck::{FloatFixer, TypeChecker};
pub use value::{matching_member, Value};
pub use walker::{walk_types, TypeVisitor};
