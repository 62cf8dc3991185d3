//! Extracting and restoring deferred subtrees.
//!
//! An attribute marked lazy in the schema never contributes its value to
//! the enclosing token stream. [`extract`] clones the tree with each such
//! value replaced by a [`Value::Lazy`] placeholder carrying its position in
//! the extraction order, and hands back the siphoned values; the encoder
//! writes them as self-contained pieces behind the main body. Extraction
//! does not descend into a siphoned value: its own lazy attributes belong
//! to the piece and are extracted when the piece is encoded.
//!
//! [`restore`] is the decoder's other half: it substitutes decoded pieces
//! back by placeholder index. Both sides follow the type-directed
//! traversal order, so index `i` always names the same subtree.

use binast_base::{Error, Result};
use binast_schema::{matching_member, Primitive, Schema, TypeDef, TypeId, Value};

/// The siphoned values of one extraction, in traversal order, each with
/// the interface type its piece decodes under.
pub struct LazyParts {
    /// `(resolved type, value)` per placeholder index.
    pub parts: Vec<(TypeId, Value)>,
}

/// Clones `value`, replacing every lazy-attribute value with a placeholder.
pub fn extract(schema: &Schema, ty: TypeId, value: &Value) -> Result<(Value, LazyParts)> {
    let mut parts = LazyParts { parts: Vec::new() };
    let stripped = extract_inner(schema, ty, value, &mut parts)?;
    Ok((stripped, parts))
}

fn extract_inner(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    parts: &mut LazyParts,
) -> Result<Value> {
    match schema.def(ty) {
        TypeDef::Interface { name, attrs } => {
            let Value::Node { ty: nty, fields } = value else {
                return Err(shape_err(schema, ty));
            };
            if *nty != ty || fields.len() != attrs.len() {
                return Err(shape_err(schema, ty));
            }
            let mut stripped = Vec::with_capacity(fields.len());
            for (attr, field) in attrs.iter().zip(fields) {
                if attr.lazy {
                    if let Value::Lazy(_) = field {
                        return Err(Error::schema(
                            format!("{name}.{}", attr.name),
                            "tree was already extracted",
                        ));
                    }
                    let index = parts.parts.len() as u32;
                    parts.parts.push((attr.ty, field.clone()));
                    stripped.push(Value::Lazy(index));
                } else {
                    stripped.push(extract_inner(schema, attr.ty, field, parts)?);
                }
            }
            Ok(Value::Node {
                ty: *nty,
                fields: stripped,
            })
        }
        TypeDef::Alternation { members } => {
            let Some(i) = matching_member(schema, members, value) else {
                return Err(shape_err(schema, ty));
            };
            let member = members[i];
            if matches!(schema.def(member), TypeDef::Primitive(Primitive::Null)) {
                return Ok(Value::Null);
            }
            extract_inner(schema, member, value, parts)
        }
        TypeDef::FrozenArray { element } => {
            let Value::Array(items) = value else {
                return Err(shape_err(schema, ty));
            };
            let mut stripped = Vec::with_capacity(items.len());
            for item in items {
                stripped.push(extract_inner(schema, *element, item, parts)?);
            }
            Ok(Value::Array(stripped))
        }
        TypeDef::Enumeration { .. } | TypeDef::Primitive(_) => Ok(value.clone()),
    }
}

/// Replaces each placeholder in `value` with `pieces[index]`, consuming
/// the pieces. A missing, repeated or out-of-range index is a malformed
/// stream.
pub fn restore(value: &mut Value, pieces: &mut [Option<Value>]) -> Result<()> {
    match value {
        Value::Lazy(index) => {
            let piece = pieces
                .get_mut(*index as usize)
                .and_then(Option::take)
                .ok_or_else(|| {
                    Error::format(format!("lazy placeholder {index} has no piece"))
                })?;
            *value = piece;
            Ok(())
        }
        Value::Node { fields, .. } => {
            for field in fields {
                restore(field, pieces)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                restore(item, pieces)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn shape_err(schema: &Schema, ty: TypeId) -> Error {
    Error::schema(
        schema.type_name(ty),
        "value does not conform to its declared type",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use binast_schema::{Attribute, SchemaBuilder};

    /// Fn { name: IdentifierName, body: Body (lazy) }
    /// Body { calls: FrozenArray<Fn> }
    fn fixture() -> (Schema, TypeId, TypeId) {
        let mut b = SchemaBuilder::new();
        let func = b.declare_interface("Fn").unwrap();
        let body = b.declare_interface("Body").unwrap();
        let ident = b.primitive(Primitive::IdentifierName);
        b.define_interface(
            func,
            vec![
                Attribute { name: "name".into(), ty: ident, lazy: false },
                Attribute { name: "body".into(), ty: body, lazy: true },
            ],
        )
        .unwrap();
        let funcs = b.array_of(func);
        b.define_interface(
            body,
            vec![Attribute { name: "calls".into(), ty: funcs, lazy: false }],
        )
        .unwrap();
        let schema = b.finish().unwrap();
        (schema, func, body)
    }

    fn func(fty: TypeId, bty: TypeId, name: &str, calls: Vec<Value>) -> Value {
        Value::Node {
            ty: fty,
            fields: vec![
                Value::String(name.into()),
                Value::Node {
                    ty: bty,
                    fields: vec![Value::Array(calls)],
                },
            ],
        }
    }

    #[test]
    fn lazy_value_becomes_an_indexed_placeholder() {
        let (schema, fty, bty) = fixture();
        let tree = func(fty, bty, "f", Vec::new());
        let (stripped, parts) = extract(&schema, fty, &tree).unwrap();
        let Value::Node { fields, .. } = &stripped else { unreachable!() };
        assert_eq!(fields[1], Value::Lazy(0));
        assert_eq!(parts.parts.len(), 1);
        assert_eq!(parts.parts[0].0, bty);
    }

    #[test]
    fn extraction_does_not_descend_into_siphoned_values() {
        let (schema, fty, bty) = fixture();
        let inner = func(fty, bty, "g", Vec::new());
        let tree = func(fty, bty, "f", vec![inner.clone()]);
        let (_, parts) = extract(&schema, fty, &tree).unwrap();
        // Only the outer body is extracted; the nested function inside it
        // keeps its body inline until the piece itself is encoded.
        assert_eq!(parts.parts.len(), 1);
        assert_eq!(parts.parts[0].1, Value::Node {
            ty: bty,
            fields: vec![Value::Array(vec![inner])],
        });
    }

    #[test]
    fn restore_substitutes_by_index() {
        let (schema, fty, bty) = fixture();
        let tree = func(fty, bty, "f", Vec::new());
        let (mut stripped, parts) = extract(&schema, fty, &tree).unwrap();
        let mut pieces: Vec<Option<Value>> =
            parts.parts.into_iter().map(|(_, v)| Some(v)).collect();
        restore(&mut stripped, &mut pieces).unwrap();
        assert_eq!(stripped, tree);
    }

    #[test]
    fn restore_rejects_missing_pieces() {
        let mut value = Value::Lazy(2);
        let mut pieces = vec![Some(Value::Null)];
        assert!(restore(&mut value, &mut pieces).is_err());
    }

    #[test]
    fn restore_rejects_duplicate_indices() {
        let mut value = Value::Array(vec![Value::Lazy(0), Value::Lazy(0)]);
        let mut pieces = vec![Some(Value::Null)];
        assert!(restore(&mut value, &mut pieces).is_err());
    }

    #[test]
    fn already_extracted_trees_are_rejected() {
        let (schema, fty, _) = fixture();
        let tree = Value::Node {
            ty: fty,
            fields: vec![Value::String("f".into()), Value::Lazy(0)],
        };
        assert!(extract(&schema, fty, &tree).is_err());
    }
}
