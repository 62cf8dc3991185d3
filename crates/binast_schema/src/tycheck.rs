//! Pre-encode conformance passes.
//!
//! Two passes run over (schema, tree) before anything is encoded:
//!
//! 1. [`FloatFixer`] rewrites, in place, unsigned-integer values sitting in
//!    double-typed slots into their double equivalents. Upstream AST
//!    producers narrow `3.0` to `3`; the type-directed encoder needs the
//!    value space the schema declares, and the probability models must be
//!    built over the coerced values, so this pass runs first.
//! 2. [`TypeChecker`] verifies full structural conformance. Failures are
//!    [`binast_base::Error::SchemaViolation`]s carrying the attribute path
//!    of the offending value.
//!
//! The decoder re-runs the checker over restored trees.

use binast_base::{Error, Result};

use crate::types::{Primitive, Schema, TypeDef, TypeId};
use crate::value::{matching_member, Value};

/// Coerces integers in double slots, in place.
pub struct FloatFixer<'a> {
    schema: &'a Schema,
}

impl<'a> FloatFixer<'a> {
    /// Creates a fixer over `schema`.
    pub fn new(schema: &'a Schema) -> Self {
        FloatFixer { schema }
    }

    /// Rewrites `value` as a `ty`, descending only where the tree's shape
    /// matches the schema. Nonconforming corners are left untouched for
    /// the [`TypeChecker`] to report.
    pub fn rewrite(&self, ty: TypeId, value: &mut Value) {
        match self.schema.def(ty) {
            TypeDef::Primitive(Primitive::Double) => {
                if let Value::Unsigned(n) = *value {
                    *value = Value::Double(n as f64);
                }
            }
            TypeDef::Interface { attrs, .. } => {
                if let Value::Node { ty: nty, fields } = value {
                    if *nty == ty {
                        for (attr, field) in attrs.iter().zip(fields.iter_mut()) {
                            self.rewrite(attr.ty, field);
                        }
                    }
                }
            }
            TypeDef::Alternation { members } => {
                if let Some(i) = matching_member(self.schema, members, value) {
                    self.rewrite(members[i], value);
                }
            }
            TypeDef::FrozenArray { element } => {
                if let Value::Array(items) = value {
                    for item in items {
                        self.rewrite(*element, item);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Verifies that a tree structurally conforms to its declared type.
pub struct TypeChecker<'a> {
    schema: &'a Schema,
}

impl<'a> TypeChecker<'a> {
    /// Creates a checker over `schema`.
    pub fn new(schema: &'a Schema) -> Self {
        TypeChecker { schema }
    }

    /// Checks `value` against `ty`.
    pub fn check(&self, ty: TypeId, value: &Value) -> Result<()> {
        let mut path = vec![self.schema.type_name(ty)];
        self.check_inner(ty, value, &mut path)
    }

    fn check_inner(&self, ty: TypeId, value: &Value, path: &mut Vec<String>) -> Result<()> {
        if let Value::Lazy(_) = value {
            return Err(fail(path, "lazy placeholder in input tree"));
        }
        match self.schema.def(ty) {
            TypeDef::Interface { name, attrs } => {
                let Value::Node { ty: nty, fields } = value else {
                    return Err(fail(
                        path,
                        format!("expected a {name} node, found {}", describe(self.schema, value)),
                    ));
                };
                if *nty != ty {
                    return Err(fail(
                        path,
                        format!(
                            "expected a {name} node, found a {} node",
                            self.schema.type_name(*nty)
                        ),
                    ));
                }
                if fields.len() != attrs.len() {
                    return Err(fail(
                        path,
                        format!(
                            "{name} declares {} attributes, node has {} fields",
                            attrs.len(),
                            fields.len()
                        ),
                    ));
                }
                for (attr, field) in attrs.iter().zip(fields) {
                    path.push(format!(".{}", attr.name));
                    self.check_inner(attr.ty, field, path)?;
                    path.pop();
                }
                Ok(())
            }
            TypeDef::Alternation { members } => {
                let Some(i) = matching_member(self.schema, members, value) else {
                    return Err(fail(
                        path,
                        format!(
                            "no variant of {} accepts {}",
                            self.schema.type_name(ty),
                            describe(self.schema, value)
                        ),
                    ));
                };
                let member = members[i];
                if matches!(self.schema.def(member), TypeDef::Primitive(Primitive::Null)) {
                    return Ok(());
                }
                self.check_inner(member, value, path)
            }
            TypeDef::Enumeration { name, symbols } => match value {
                Value::String(s) if symbols.iter().any(|sym| sym == s) => Ok(()),
                Value::String(s) => Err(fail(
                    path,
                    format!("\"{s}\" is not a symbol of {name}"),
                )),
                other => Err(fail(
                    path,
                    format!("expected a {name} symbol, found {}", describe(self.schema, other)),
                )),
            },
            TypeDef::Primitive(p) => self.check_primitive(*p, value, path),
            TypeDef::FrozenArray { element } => {
                let Value::Array(items) = value else {
                    return Err(fail(
                        path,
                        format!("expected an array, found {}", describe(self.schema, value)),
                    ));
                };
                for (i, item) in items.iter().enumerate() {
                    path.push(format!("[{i}]"));
                    self.check_inner(*element, item, path)?;
                    path.pop();
                }
                Ok(())
            }
        }
    }

    fn check_primitive(&self, p: Primitive, value: &Value, path: &[String]) -> Result<()> {
        let ok = matches!(
            (p, value),
            (Primitive::Bool, Value::Bool(_))
                | (Primitive::UnsignedLong, Value::Unsigned(_))
                | (Primitive::Double, Value::Double(_))
                | (Primitive::String, Value::String(_))
                | (Primitive::IdentifierName, Value::String(_))
                | (Primitive::Null, Value::Null)
        );
        if ok {
            return Ok(());
        }
        if let (Primitive::Double, Value::Unsigned(_)) = (p, value) {
            return Err(fail(
                path,
                "integer in a double slot; the tree has not been through FloatFixer",
            ));
        }
        Err(fail(
            path,
            format!(
                "expected {}, found {}",
                match p {
                    Primitive::Bool => "a boolean",
                    Primitive::UnsignedLong => "an unsigned integer",
                    Primitive::Double => "a double",
                    Primitive::String => "a string",
                    Primitive::IdentifierName => "an identifier",
                    Primitive::Null => "null",
                },
                describe(self.schema, value)
            ),
        ))
    }
}

fn fail(path: &[String], message: impl Into<String>) -> Error {
    Error::schema(path.concat(), message)
}

fn describe(schema: &Schema, value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Unsigned(_) => "an unsigned integer".to_string(),
        Value::Double(_) => "a double".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Node { ty, .. } => format!("a {} node", schema.type_name(*ty)),
        Value::Lazy(_) => "a lazy placeholder".to_string(),
    }
}
