//! Shared fixtures for the container test suites.
//!
//! The fixture grammar is a small ES6 subset exercising every type kind
//! the codec knows: enumerations, nullable alternations, recursive
//! interfaces, frozen arrays, doubles, booleans, identifiers and a lazily
//! deferred function body.

use binast::{from_json, Schema, TypeId, Value};

pub const ES6_SUBSET_IDL: &str = r#"
enum VariableDeclarationKind { "var", "let", "const" };
enum BinaryOperator { "+", "-", "*", "/" };

typedef (ExpressionStatement or VariableDeclaration or FunctionDeclaration or EmptyStatement) Statement;
typedef (IdentifierExpression or LiteralNumericExpression or LiteralBooleanExpression or LiteralStringExpression or CallExpression or BinaryExpression) Expression;

interface Script {
  attribute FrozenArray<Directive> directives;
  attribute FrozenArray<Statement> statements;
};
interface Directive {
  attribute DOMString rawValue;
};
interface EmptyStatement { };
interface ExpressionStatement {
  attribute Expression expression;
};
interface IdentifierExpression {
  attribute IdentifierName name;
};
interface LiteralNumericExpression {
  attribute double value;
};
interface LiteralBooleanExpression {
  attribute boolean value;
};
interface LiteralStringExpression {
  attribute DOMString value;
};
interface BinaryExpression {
  attribute BinaryOperator operator;
  attribute Expression left;
  attribute Expression right;
};
interface CallExpression {
  attribute Expression callee;
  attribute FrozenArray<Expression> arguments;
};
interface VariableDeclaration {
  attribute VariableDeclarationKind kind;
  attribute FrozenArray<VariableDeclarator> declarators;
};
interface VariableDeclarator {
  attribute BindingIdentifier binding;
  attribute Expression? init;
};
interface BindingIdentifier {
  attribute IdentifierName name;
};
interface FunctionDeclaration {
  attribute BindingIdentifier name;
  attribute FormalParameters params;
  [Lazy] attribute FunctionBody body;
};
interface FormalParameters {
  attribute FrozenArray<BindingIdentifier> items;
};
interface FunctionBody {
  attribute FrozenArray<Statement> statements;
};
"#;

pub fn schema() -> Schema {
    binast::parse_idl(ES6_SUBSET_IDL).expect("fixture IDL parses")
}

pub fn script_ty(schema: &Schema) -> TypeId {
    schema.interface("Script").expect("Script is defined")
}

/// Loads a tree from an inline Shift-style JSON dump.
pub fn load(schema: &Schema, json: serde_json::Value) -> Value {
    from_json(schema, &json).expect("fixture tree loads")
}

/// Encodes, decodes, and returns `(bytes, decoded)`.
pub fn roundtrip(schema: &Schema, shared: &[String], tree: &Value) -> (Vec<u8>, Value) {
    let root = script_ty(schema);
    let mut input = tree.clone();
    let mut bytes = Vec::new();
    binast::write(schema, shared, root, &mut input, &mut bytes).expect("encoding succeeds");
    let decoded =
        binast::read(schema, shared, root, &mut bytes.as_slice()).expect("decoding succeeds");
    (bytes, decoded)
}
