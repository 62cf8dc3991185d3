//! Tree values.
//!
//! A [`Value`] is a node of an AST the schema can type: interface nodes
//! carry one field per declared attribute in order, arrays carry their
//! elements, primitives carry themselves. Enumeration values are carried as
//! their symbol string, the way Shift-style JSON dumps deliver them.
//!
//! Equality is structural, with doubles compared by IEEE 754 bit pattern so
//! NaNs round-trip and `-0.0 != 0.0`; the codec's round-trip guarantee is
//! stated in terms of this equality.

use crate::types::{Primitive, Schema, TypeDef, TypeId};

/// A tree node.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absent variant of an alternation.
    Null,
    /// A `boolean` leaf.
    Bool(bool),
    /// An `unsigned long` leaf.
    Unsigned(u64),
    /// A `double` leaf.
    Double(f64),
    /// A `DOMString` / `IdentifierName` leaf, or an enumeration symbol.
    String(String),
    /// A frozen array.
    Array(Vec<Value>),
    /// An interface node: one field per declared attribute, in order.
    Node {
        /// The node's interface.
        ty: TypeId,
        /// Field values in attribute declaration order.
        fields: Vec<Value>,
    },
    /// A placeholder for a deferred subtree, carrying its index into the
    /// lazy piece list. Produced by the encoder's extraction pass and by
    /// the decoder; illegal in caller-supplied trees.
    Lazy(u32),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unsigned(a), Value::Unsigned(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (
                Value::Node { ty: ta, fields: fa },
                Value::Node { ty: tb, fields: fb },
            ) => ta == tb && fa == fb,
            (Value::Lazy(a), Value::Lazy(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Finds the alternation member a runtime value selects.
///
/// Members are scanned twice in declaration order: first for an exact
/// match, then allowing the unsigned-integer-in-double-slot coercion the
/// [`crate::tycheck::FloatFixer`] exists to repair. Returns the member
/// index, or `None` when no member accepts the value.
pub fn matching_member(schema: &Schema, members: &[TypeId], value: &Value) -> Option<usize> {
    for (i, m) in members.iter().enumerate() {
        if accepts(schema, *m, value, false) {
            return Some(i);
        }
    }
    for (i, m) in members.iter().enumerate() {
        if accepts(schema, *m, value, true) {
            return Some(i);
        }
    }
    None
}

fn accepts(schema: &Schema, member: TypeId, value: &Value, coerce: bool) -> bool {
    match (schema.def(member), value) {
        (TypeDef::Primitive(Primitive::Null), Value::Null) => true,
        (TypeDef::Primitive(Primitive::Bool), Value::Bool(_)) => true,
        (TypeDef::Primitive(Primitive::UnsignedLong), Value::Unsigned(_)) => true,
        (TypeDef::Primitive(Primitive::Double), Value::Double(_)) => true,
        (TypeDef::Primitive(Primitive::Double), Value::Unsigned(_)) => coerce,
        (TypeDef::Primitive(Primitive::String), Value::String(_)) => true,
        (TypeDef::Primitive(Primitive::IdentifierName), Value::String(_)) => true,
        (TypeDef::Enumeration { symbols, .. }, Value::String(s)) => {
            symbols.iter().any(|sym| sym == s)
        }
        (TypeDef::Interface { .. }, Value::Node { ty, .. }) => *ty == member,
        (TypeDef::FrozenArray { .. }, Value::Array(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, Primitive, SchemaBuilder};

    fn schema_with_alt() -> (Schema, Vec<TypeId>) {
        let mut b = SchemaBuilder::new();
        let iface = b.declare_interface("Leaf").unwrap();
        b.define_interface(iface, Vec::new()).unwrap();
        let kind = b
            .enumeration("Kind", vec!["var".into(), "let".into()])
            .unwrap();
        let members = vec![
            iface,
            kind,
            b.primitive(Primitive::UnsignedLong),
            b.primitive(Primitive::Double),
            b.primitive(Primitive::Null),
        ];
        (b.finish().unwrap(), members)
    }

    #[test]
    fn doubles_compare_by_bit_pattern() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
    }

    #[test]
    fn unsigned_and_double_are_distinct() {
        assert_ne!(Value::Unsigned(1), Value::Double(1.0));
    }

    #[test]
    fn null_matches_the_null_member() {
        let (schema, members) = schema_with_alt();
        assert_eq!(matching_member(&schema, &members, &Value::Null), Some(4));
    }

    #[test]
    fn node_matches_its_own_interface() {
        let (schema, members) = schema_with_alt();
        let node = Value::Node {
            ty: members[0],
            fields: Vec::new(),
        };
        assert_eq!(matching_member(&schema, &members, &node), Some(0));
    }

    #[test]
    fn enum_symbol_matches_the_enumeration() {
        let (schema, members) = schema_with_alt();
        let v = Value::String("let".into());
        assert_eq!(matching_member(&schema, &members, &v), Some(1));
        let miss = Value::String("const".into());
        assert_eq!(matching_member(&schema, &members, &miss), None);
    }

    #[test]
    fn unsigned_prefers_the_exact_member_over_double() {
        let (schema, members) = schema_with_alt();
        assert_eq!(
            matching_member(&schema, &members, &Value::Unsigned(3)),
            Some(2)
        );
    }

    #[test]
    fn unsigned_coerces_to_double_when_no_exact_member() {
        let (schema, members) = schema_with_alt();
        let no_uint: Vec<TypeId> = members
            .iter()
            .copied()
            .filter(|m| !matches!(schema.def(*m), TypeDef::Primitive(Primitive::UnsignedLong)))
            .collect();
        let idx = matching_member(&schema, &no_uint, &Value::Unsigned(3)).unwrap();
        assert!(matches!(
            schema.def(no_uint[idx]),
            TypeDef::Primitive(Primitive::Double)
        ));
    }
}
