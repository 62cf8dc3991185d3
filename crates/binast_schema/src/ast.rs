//! Loading and dumping trees as Shift-style JSON.
//!
//! Reference ASTs arrive as JSON dumps in which every interface node is an
//! object carrying a `"type"` discriminator, enumeration values are plain
//! strings, and numbers may have been narrowed to integers even in double
//! slots (which [`crate::tycheck::FloatFixer`] later repairs).
//!
//! Decoded trees dump with attributes in declaration order, so dumping is
//! deterministic and a re-loaded dump is structurally identical.

use binast_base::{Error, Result};
use serde_json::{Map, Number, Value as Json};

use crate::types::{Schema, TypeDef};
use crate::value::Value;

/// Converts a Shift-style JSON dump into a tree.
///
/// The conversion is shape-directed, not type-directed: it resolves
/// `"type"` discriminators against the schema and orders fields by the
/// interface's attribute declarations, but leaves conformance to the
/// [`crate::tycheck::TypeChecker`].
pub fn from_json(schema: &Schema, json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(Value::Unsigned(u))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Double(f))
            } else {
                Err(Error::schema("json", format!("unrepresentable number {n}")))
            }
        }
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => {
            let values: Result<Vec<Value>> = items.iter().map(|i| from_json(schema, i)).collect();
            Ok(Value::Array(values?))
        }
        Json::Object(obj) => node_from_json(schema, obj),
    }
}

fn node_from_json(schema: &Schema, obj: &Map<String, Json>) -> Result<Value> {
    let name = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::schema("json", "object is missing its \"type\" discriminator"))?;
    let ty = schema
        .interface(name)
        .ok_or_else(|| Error::schema(name, "unknown interface"))?;
    let TypeDef::Interface { attrs, .. } = schema.def(ty) else {
        return Err(Error::schema(name, "not an interface"));
    };
    for key in obj.keys() {
        if key != "type" && !attrs.iter().any(|a| a.name == *key) {
            return Err(Error::schema(
                name,
                format!("unexpected field \"{key}\""),
            ));
        }
    }
    let mut fields = Vec::with_capacity(attrs.len());
    for attr in attrs {
        let field = obj.get(&attr.name).ok_or_else(|| {
            Error::schema(format!("{}.{}", name, attr.name), "missing field")
        })?;
        fields.push(from_json(schema, field)?);
    }
    Ok(Value::Node { ty, fields })
}

/// Dumps a tree back to JSON with attributes in declaration order.
///
/// Fails on non-finite doubles (JSON cannot carry them) and on unresolved
/// lazy placeholders.
pub fn to_json(schema: &Schema, value: &Value) -> Result<Json> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Unsigned(u) => Ok(Json::Number(Number::from(*u))),
        Value::Double(d) => Number::from_f64(*d)
            .map(Json::Number)
            .ok_or_else(|| Error::schema("json", "cannot represent a non-finite double in JSON")),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Array(items) => {
            let json: Result<Vec<Json>> = items.iter().map(|i| to_json(schema, i)).collect();
            Ok(Json::Array(json?))
        }
        Value::Node { ty, fields } => {
            let TypeDef::Interface { name, attrs } = schema.def(*ty) else {
                return Err(Error::schema("json", "node handle is not an interface"));
            };
            if attrs.len() != fields.len() {
                return Err(Error::schema(
                    name,
                    "node field count disagrees with the interface",
                ));
            }
            let mut map = Map::new();
            map.insert("type".to_string(), Json::String(name.clone()));
            for (attr, field) in attrs.iter().zip(fields) {
                map.insert(attr.name.clone(), to_json(schema, field)?);
            }
            Ok(Json::Object(map))
        }
        Value::Lazy(_) => Err(Error::schema("json", "unresolved lazy placeholder")),
    }
}
