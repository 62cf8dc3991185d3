//! Parsing the WebIDL subset the BinAST ES6 definition is written in.
//!
//! The parser runs in two stages, lexer then recursive descent, and the
//! result is resolved in two passes so interfaces can reference each other
//! and themselves freely:
//!
//! 1. register every enumeration and declare every interface by name,
//!    recording typedefs as unresolved type expressions;
//! 2. resolve each interface's attribute types, chasing typedefs with
//!    cycle detection, and freeze the schema.
//!
//! ## Supported grammar
//!
//! ```text
//! enum VariableDeclarationKind { "var", "let", "const" };
//! typedef (SpreadElement or Expression) Argument;
//! typedef FrozenArray<Statement> StatementList;
//! interface Script {
//!   attribute StatementList statements;
//!   [Lazy] attribute FunctionBody body;
//! };
//! ```
//!
//! Type expressions: named types, `boolean`, `unsigned long`, `double`,
//! `DOMString`, `IdentifierName`, `FrozenArray<T>`, `(A or B or …)`, and a
//! trailing `?` that appends the null variant. `//` and `/* */` comments
//! are skipped.

use std::collections::HashMap;

use binast_base::{Error, Result};

use crate::types::{Attribute, Primitive, Schema, SchemaBuilder, TypeId};

/// Parses IDL text into a frozen [`Schema`].
pub fn parse_idl(source: &str) -> Result<Schema> {
    let toks = tokenize(source)?;
    let defs = Parser { toks, pos: 0 }.parse_defs()?;

    let mut builder = SchemaBuilder::new();
    let mut typedefs: HashMap<String, TypeExpr> = HashMap::new();
    for def in &defs {
        match def {
            Def::Enum { name, symbols } => {
                builder.enumeration(name, symbols.clone())?;
            }
            Def::Interface { name, .. } => {
                builder.declare_interface(name)?;
            }
            Def::Typedef { name, ty } => {
                if typedefs.insert(name.clone(), ty.clone()).is_some() {
                    return Err(Error::schema(name.clone(), "typedef defined twice"));
                }
            }
        }
    }
    for name in typedefs.keys() {
        if builder.named(name).is_some() {
            return Err(Error::schema(name.clone(), "name defined twice"));
        }
    }

    for def in &defs {
        if let Def::Interface { name, members } = def {
            let id = builder
                .named(name)
                .expect("interface was declared in the first pass");
            let mut attrs = Vec::with_capacity(members.len());
            for m in members {
                let ty = resolve_type(&mut builder, &typedefs, &m.ty, &mut Vec::new())?;
                attrs.push(Attribute {
                    name: m.name.clone(),
                    ty,
                    lazy: m.lazy,
                });
            }
            builder.define_interface(id, attrs)?;
        }
    }
    builder.finish()
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    Comma,
    Semi,
    Question,
}

fn tokenize(source: &str) -> Result<Vec<(Tok, usize)>> {
    let bytes = source.as_bytes();
    let mut toks = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos += 2;
                loop {
                    if pos + 1 >= bytes.len() {
                        return Err(lex_err(start, "unterminated block comment"));
                    }
                    if bytes[pos] == b'*' && bytes[pos + 1] == b'/' {
                        pos += 2;
                        break;
                    }
                    pos += 1;
                }
            }
            b'"' => {
                pos += 1;
                let content_start = pos;
                while pos < bytes.len() && bytes[pos] != b'"' {
                    pos += 1;
                }
                if pos == bytes.len() {
                    return Err(lex_err(start, "unterminated string"));
                }
                toks.push((Tok::Str(source[content_start..pos].to_string()), start));
                pos += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                toks.push((Tok::Ident(source[start..pos].to_string()), start));
            }
            c => {
                let tok = match c {
                    b'{' => Tok::LBrace,
                    b'}' => Tok::RBrace,
                    b'(' => Tok::LParen,
                    b')' => Tok::RParen,
                    b'[' => Tok::LBracket,
                    b']' => Tok::RBracket,
                    b'<' => Tok::LAngle,
                    b'>' => Tok::RAngle,
                    b',' => Tok::Comma,
                    b';' => Tok::Semi,
                    b'?' => Tok::Question,
                    other => {
                        return Err(lex_err(
                            start,
                            format!("unexpected character '{}'", other as char),
                        ))
                    }
                };
                toks.push((tok, start));
                pos += 1;
            }
        }
    }
    Ok(toks)
}

fn lex_err(offset: usize, message: impl Into<String>) -> Error {
    Error::schema("idl", format!("{} at byte {offset}", message.into()))
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone)]
enum TypeExpr {
    Primitive(Primitive),
    Named(String),
    Array(Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Nullable(Box<TypeExpr>),
}

#[derive(Debug)]
struct Member {
    name: String,
    ty: TypeExpr,
    lazy: bool,
}

#[derive(Debug)]
enum Def {
    Enum { name: String, symbols: Vec<String> },
    Typedef { name: String, ty: TypeExpr },
    Interface { name: String, members: Vec<Member> },
}

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn parse_defs(mut self) -> Result<Vec<Def>> {
        let mut defs = Vec::new();
        while self.pos < self.toks.len() {
            let keyword = self.expect_ident("a definition")?;
            let def = match keyword.as_str() {
                "enum" => self.parse_enum()?,
                "typedef" => self.parse_typedef()?,
                "interface" => self.parse_interface()?,
                other => {
                    return Err(self.err_here(format!(
                        "expected enum, typedef or interface, found \"{other}\""
                    )))
                }
            };
            defs.push(def);
        }
        Ok(defs)
    }

    fn parse_enum(&mut self) -> Result<Def> {
        let name = self.expect_ident("an enum name")?;
        self.expect(Tok::LBrace, "{")?;
        let mut symbols = Vec::new();
        loop {
            match self.next("an enum symbol or }")? {
                Tok::Str(s) => symbols.push(s),
                Tok::RBrace if !symbols.is_empty() => break,
                _ => return Err(self.err_here("expected a quoted enum symbol")),
            }
            match self.next("a comma or }")? {
                Tok::Comma => {
                    // Tolerate a trailing comma before the closing brace.
                    if matches!(self.peek(), Some(Tok::RBrace)) {
                        self.pos += 1;
                        break;
                    }
                }
                Tok::RBrace => break,
                _ => return Err(self.err_here("expected ',' or '}'")),
            }
        }
        self.expect(Tok::Semi, ";")?;
        Ok(Def::Enum { name, symbols })
    }

    fn parse_typedef(&mut self) -> Result<Def> {
        let ty = self.parse_type()?;
        let name = self.expect_ident("a typedef name")?;
        self.expect(Tok::Semi, ";")?;
        Ok(Def::Typedef { name, ty })
    }

    fn parse_interface(&mut self) -> Result<Def> {
        let name = self.expect_ident("an interface name")?;
        self.expect(Tok::LBrace, "{")?;
        let mut members = Vec::new();
        loop {
            if matches!(self.peek(), Some(Tok::RBrace)) {
                self.pos += 1;
                break;
            }
            let lazy = if matches!(self.peek(), Some(Tok::LBracket)) {
                self.pos += 1;
                let ext = self.expect_ident("an extended attribute")?;
                if ext != "Lazy" {
                    return Err(self.err_here(format!(
                        "unsupported extended attribute \"{ext}\""
                    )));
                }
                self.expect(Tok::RBracket, "]")?;
                true
            } else {
                false
            };
            let kw = self.expect_ident("attribute")?;
            if kw != "attribute" {
                return Err(self.err_here(format!("expected \"attribute\", found \"{kw}\"")));
            }
            let ty = self.parse_type()?;
            let attr_name = self.expect_ident("an attribute name")?;
            self.expect(Tok::Semi, ";")?;
            members.push(Member {
                name: attr_name,
                ty,
                lazy,
            });
        }
        self.expect(Tok::Semi, ";")?;
        Ok(Def::Interface { name, members })
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let base = match self.next("a type")? {
            Tok::Ident(name) => match name.as_str() {
                "boolean" => TypeExpr::Primitive(Primitive::Bool),
                "double" => TypeExpr::Primitive(Primitive::Double),
                "DOMString" => TypeExpr::Primitive(Primitive::String),
                "IdentifierName" => TypeExpr::Primitive(Primitive::IdentifierName),
                "unsigned" => {
                    let next = self.expect_ident("long")?;
                    if next != "long" {
                        return Err(self.err_here("expected \"long\" after \"unsigned\""));
                    }
                    TypeExpr::Primitive(Primitive::UnsignedLong)
                }
                "FrozenArray" => {
                    self.expect(Tok::LAngle, "<")?;
                    let element = self.parse_type()?;
                    self.expect(Tok::RAngle, ">")?;
                    TypeExpr::Array(Box::new(element))
                }
                _ => TypeExpr::Named(name),
            },
            Tok::LParen => {
                let mut parts = vec![self.parse_type()?];
                loop {
                    match self.next("\"or\" or )")? {
                        Tok::Ident(kw) if kw == "or" => parts.push(self.parse_type()?),
                        Tok::RParen if parts.len() >= 2 => break,
                        Tok::RParen => {
                            return Err(self.err_here("a union needs at least two members"))
                        }
                        _ => return Err(self.err_here("expected \"or\" or ')'")),
                    }
                }
                TypeExpr::Union(parts)
            }
            _ => return Err(self.err_here("expected a type")),
        };
        if matches!(self.peek(), Some(Tok::Question)) {
            self.pos += 1;
            return Ok(TypeExpr::Nullable(Box::new(base)));
        }
        Ok(base)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self, what: &str) -> Result<Tok> {
        match self.toks.get(self.pos) {
            Some((t, _)) => {
                self.pos += 1;
                Ok(t.clone())
            }
            None => Err(Error::schema(
                "idl",
                format!("expected {what}, found end of input"),
            )),
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        let found = self.next(what)?;
        if found == tok {
            Ok(())
        } else {
            Err(self.err_here(format!("expected '{what}'")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.next(what)? {
            Tok::Ident(name) => Ok(name),
            _ => Err(self.err_here(format!("expected {what}"))),
        }
    }

    fn err_here(&self, message: impl Into<String>) -> Error {
        let offset = self
            .toks
            .get(self.pos.saturating_sub(1))
            .map(|(_, o)| *o)
            .unwrap_or(0);
        Error::schema("idl", format!("{} at byte {offset}", message.into()))
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn resolve_type(
    builder: &mut SchemaBuilder,
    typedefs: &HashMap<String, TypeExpr>,
    expr: &TypeExpr,
    stack: &mut Vec<String>,
) -> Result<TypeId> {
    match expr {
        TypeExpr::Primitive(p) => Ok(builder.primitive(*p)),
        TypeExpr::Named(name) => {
            if let Some(id) = builder.named(name) {
                return Ok(id);
            }
            let Some(inner) = typedefs.get(name) else {
                return Err(Error::schema(name.clone(), "unknown type"));
            };
            if stack.iter().any(|s| s == name) {
                return Err(Error::schema(name.clone(), "typedef cycle"));
            }
            stack.push(name.clone());
            let id = resolve_type(builder, typedefs, inner, stack)?;
            stack.pop();
            Ok(id)
        }
        TypeExpr::Array(element) => {
            let element = resolve_type(builder, typedefs, element, stack)?;
            Ok(builder.array_of(element))
        }
        TypeExpr::Union(parts) => {
            let mut members = Vec::with_capacity(parts.len());
            for part in parts {
                members.push(resolve_type(builder, typedefs, part, stack)?);
            }
            builder.alternation(members)
        }
        TypeExpr::Nullable(inner) => {
            let inner = resolve_type(builder, typedefs, inner, stack)?;
            builder.nullable(inner)
        }
    }
}
