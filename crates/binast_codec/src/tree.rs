//! The type-directed tree codec.
//!
//! [`write_piece`] encodes one self-contained piece: the arithmetic-coded
//! main body (with lazy values stripped to placeholders), then the lazy
//! index (a varint piece count and one varint byte length per piece), then
//! the pieces themselves end to end, each encoded by re-entering
//! [`write_piece`] with a fresh extraction. The whole tree is simply the
//! outermost piece.
//!
//! [`read_piece`] mirrors it: decode the body (placeholders are positional,
//! so the decoder materialises them without reading a token), read the
//! index, turn the cumulative sizes into absolute offsets, decode each
//! piece at its recorded type and check it ends exactly on its declared
//! boundary, substitute, and leave the stream positioned past the last
//! piece.
//!
//! The decoder checks every symbol against the kind its tree position
//! requires, and bounds nesting, array lengths and total node counts so
//! corrupt input terminates with an error instead of exhausting the
//! machine.

use std::io::{Cursor, Write};

use binast_base::{read_varint, write_varint, Error, Result};
use binast_schema::{Primitive, Schema, TypeDef, TypeId, Value};

use crate::coder::{RangeDecoder, RangeEncoder};
use crate::lazy::{extract, restore};
use crate::model::{each_token, Model, ModelId, ModelIds, Symbol};
use crate::strings::StringTable;

/// Deepest value nesting the decoder accepts within one piece body.
const MAX_DEPTH: usize = 4096;

/// Deepest piece-within-piece nesting the decoder accepts.
const MAX_PIECE_DEPTH: usize = 1024;

/// Longest array the decoder accepts.
const MAX_ARRAY_LEN: u64 = 1 << 24;

/// Most values the decoder materialises for one piece body.
const MAX_NODES: u64 = 1 << 26;

/// Encodes `value` as one self-contained piece.
pub fn write_piece<W: Write + ?Sized>(
    schema: &Schema,
    ids: &ModelIds,
    model: &Model,
    strings: &StringTable,
    ty: TypeId,
    value: &Value,
    out: &mut W,
) -> Result<()> {
    let (stripped, lazies) = extract(schema, ty, value)?;

    let mut enc = RangeEncoder::new(out);
    each_token(schema, ids, strings, ty, &stripped, &mut |id, symbol| {
        let Some((cum, freq, total)) = model.get(id).encode_params(symbol) else {
            return Err(Error::model(
                format!("model {}", id.index()),
                "symbol to encode is missing from its distribution",
            ));
        };
        enc.encode(cum, freq, total)
    })?;
    enc.finish()?;

    let mut encoded = Vec::with_capacity(lazies.parts.len());
    for (piece_ty, piece) in &lazies.parts {
        let mut buf = Vec::new();
        write_piece(schema, ids, model, strings, *piece_ty, piece, &mut buf)?;
        encoded.push(buf);
    }
    write_varint(out, encoded.len() as u64)?;
    for buf in &encoded {
        write_varint(out, buf.len() as u64)?;
    }
    for buf in &encoded {
        out.write_all(buf)?;
    }
    Ok(())
}

/// Decodes one self-contained piece, leaving the cursor past its bodies.
pub fn read_piece(
    schema: &Schema,
    ids: &ModelIds,
    model: &Model,
    strings: &StringTable,
    ty: TypeId,
    cur: &mut Cursor<&[u8]>,
    piece_depth: usize,
) -> Result<Value> {
    if piece_depth > MAX_PIECE_DEPTH {
        return Err(Error::format("lazy pieces nest too deeply"));
    }

    let (mut tree, lazy_types) = {
        let coder = RangeDecoder::new(cur)?;
        let mut body = BodyDecoder {
            schema,
            ids,
            model,
            strings,
            coder,
            lazy_types: Vec::new(),
            depth: 0,
            nodes: 0,
        };
        let tree = body.value(ty, None)?;
        (tree, body.lazy_types)
    };

    let count = read_varint(cur)?;
    if count != lazy_types.len() as u64 {
        return Err(Error::format(format!(
            "lazy index declares {count} pieces, tree has {} placeholders",
            lazy_types.len()
        )));
    }
    // Sizes come first; absolute offsets are their running sum from the
    // position after the index.
    let mut sizes = Vec::with_capacity(lazy_types.len());
    for _ in 0..count {
        sizes.push(read_varint(cur)?);
    }
    let mut offsets = Vec::with_capacity(lazy_types.len() + 1);
    offsets.push(cur.position());
    let mut end = cur.position();
    for size in &sizes {
        end = end
            .checked_add(*size)
            .ok_or_else(|| Error::format("lazy piece offset overflows"))?;
        offsets.push(end);
    }

    let mut pieces: Vec<Option<Value>> = Vec::with_capacity(lazy_types.len());
    for (i, piece_ty) in lazy_types.iter().enumerate() {
        cur.set_position(offsets[i]);
        let piece = read_piece(schema, ids, model, strings, *piece_ty, cur, piece_depth + 1)?;
        if cur.position() != offsets[i + 1] {
            return Err(Error::LazyFrameMismatch {
                expected: offsets[i + 1],
                found: cur.position(),
            });
        }
        pieces.push(Some(piece));
    }
    restore(&mut tree, &mut pieces)?;
    cur.set_position(*offsets.last().expect("offsets holds at least the base"));
    Ok(tree)
}

struct BodyDecoder<'a, 'c, 'b> {
    schema: &'a Schema,
    ids: &'a ModelIds,
    model: &'a Model,
    strings: &'a StringTable,
    coder: RangeDecoder<'c, Cursor<&'b [u8]>>,
    lazy_types: Vec<TypeId>,
    depth: usize,
    nodes: u64,
}

impl BodyDecoder<'_, '_, '_> {
    fn value(&mut self, ty: TypeId, enclosing: Option<ModelId>) -> Result<Value> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::format("tree nests too deeply"));
        }
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(Error::format("tree body exceeds the node budget"));
        }
        let value = self.value_inner(ty, enclosing);
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self, ty: TypeId, enclosing: Option<ModelId>) -> Result<Value> {
        match self.schema.def(ty) {
            TypeDef::Interface { attrs, .. } => {
                let mut fields = Vec::with_capacity(attrs.len());
                for (i, attr) in attrs.iter().enumerate() {
                    let id = self.ids.attr(ty, i)?;
                    if attr.lazy {
                        let index = self.lazy_types.len() as u32;
                        self.lazy_types.push(attr.ty);
                        fields.push(Value::Lazy(index));
                    } else {
                        fields.push(self.value(attr.ty, Some(id))?);
                    }
                }
                Ok(Value::Node { ty, fields })
            }
            TypeDef::Alternation { members } => {
                let id = self.require_enclosing(ty, enclosing)?;
                let symbol = self.symbol(id)?;
                let Symbol::Tag(tag) = symbol else {
                    return Err(self.kind_err(id, "a variant tag", symbol));
                };
                let Some(member) = members.get(tag as usize).copied() else {
                    return Err(Error::model(
                        format!("model {}", id.index()),
                        format!("variant tag {tag} is out of range"),
                    ));
                };
                if matches!(self.schema.def(member), TypeDef::Primitive(Primitive::Null)) {
                    return Ok(Value::Null);
                }
                self.value(member, Some(id))
            }
            TypeDef::Enumeration { symbols, .. } => {
                let id = self.require_enclosing(ty, enclosing)?;
                let symbol = self.symbol(id)?;
                let Symbol::Enum(index) = symbol else {
                    return Err(self.kind_err(id, "an enum symbol", symbol));
                };
                let Some(name) = symbols.get(index as usize) else {
                    return Err(Error::model(
                        format!("model {}", id.index()),
                        format!("enum symbol {index} is out of range"),
                    ));
                };
                Ok(Value::String(name.clone()))
            }
            TypeDef::Primitive(p) => self.primitive(*p, ty, enclosing),
            TypeDef::FrozenArray { element } => {
                let length_id = self.ids.array(ty)?;
                let symbol = self.symbol(length_id)?;
                let Symbol::Uint(len) = symbol else {
                    return Err(self.kind_err(length_id, "a list length", symbol));
                };
                if len > MAX_ARRAY_LEN {
                    return Err(Error::format(format!("array length {len} exceeds the limit")));
                }
                let element = *element;
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(self.value(element, enclosing)?);
                }
                Ok(Value::Array(items))
            }
        }
    }

    fn primitive(
        &mut self,
        p: Primitive,
        ty: TypeId,
        enclosing: Option<ModelId>,
    ) -> Result<Value> {
        if p == Primitive::Null {
            return Ok(Value::Null);
        }
        let id = self.require_enclosing(ty, enclosing)?;
        let symbol = self.symbol(id)?;
        match (p, symbol) {
            (Primitive::Bool, Symbol::Bool(b)) => Ok(Value::Bool(b)),
            (Primitive::UnsignedLong, Symbol::Uint(n)) => Ok(Value::Unsigned(n)),
            (Primitive::Double, Symbol::Double(bits)) => Ok(Value::Double(f64::from_bits(bits))),
            (Primitive::String | Primitive::IdentifierName, Symbol::Str(index)) => {
                let Some(s) = self.strings.resolve(index) else {
                    return Err(Error::model(
                        format!("model {}", id.index()),
                        format!("string index {index} is outside the dictionary"),
                    ));
                };
                Ok(Value::String(s.to_string()))
            }
            (Primitive::Bool, other) => Err(self.kind_err(id, "a boolean", other)),
            (Primitive::UnsignedLong, other) => Err(self.kind_err(id, "an unsigned integer", other)),
            (Primitive::Double, other) => Err(self.kind_err(id, "a double", other)),
            (_, other) => Err(self.kind_err(id, "a string index", other)),
        }
    }

    fn symbol(&mut self, id: ModelId) -> Result<Symbol> {
        let dist = self.model.get(id);
        let total = dist.total();
        if total == 0 {
            return Err(Error::model(
                format!("model {}", id.index()),
                "decoding from an empty distribution",
            ));
        }
        let target = self.coder.target(total)?;
        let (symbol, cum, freq) = dist.by_target(target);
        self.coder.advance(cum, freq, total)?;
        Ok(symbol)
    }

    fn require_enclosing(&self, ty: TypeId, enclosing: Option<ModelId>) -> Result<ModelId> {
        enclosing.ok_or_else(|| {
            Error::model(
                self.schema.type_name(ty),
                "token expected outside any attribute position",
            )
        })
    }

    fn kind_err(&self, id: ModelId, expected: &str, found: Symbol) -> Error {
        Error::model(
            format!("model {}", id.index()),
            format!("expected {expected}, decoded {found:?}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_model;
    use crate::strings::{collect_strings, local_dict};
    use binast_schema::{parse_idl, FloatFixer, TypeChecker};

    const IDL: &str = r#"
        enum Kind { "fn", "gen" };
        interface Program {
          attribute FrozenArray<Func> funcs;
          attribute double version;
        };
        interface Func {
          attribute Kind kind;
          attribute IdentifierName name;
          attribute (double or null) arity;
          [Lazy] attribute Body body;
        };
        interface Body {
          attribute FrozenArray<Func> nested;
          attribute boolean strict;
        };
    "#;

    fn setup(schema: &Schema, tree: &mut Value) -> (ModelIds, Model, StringTable, TypeId) {
        let root = schema.interface("Program").unwrap();
        FloatFixer::new(schema).rewrite(root, tree);
        TypeChecker::new(schema).check(root, tree).unwrap();
        let collected = collect_strings(schema, root, tree).unwrap();
        let table = StringTable::new(local_dict(collected, &[]), &[]);
        let ids = ModelIds::allocate(schema, root);
        let model = build_model(schema, &ids, &table, root, tree).unwrap();
        (ids, model, table, root)
    }

    fn func(schema: &Schema, name: &str, arity: Value, nested: Vec<Value>, strict: bool) -> Value {
        let fty = schema.interface("Func").unwrap();
        let bty = schema.interface("Body").unwrap();
        Value::Node {
            ty: fty,
            fields: vec![
                Value::String("fn".into()),
                Value::String(name.into()),
                arity,
                Value::Node {
                    ty: bty,
                    fields: vec![Value::Array(nested), Value::Bool(strict)],
                },
            ],
        }
    }

    fn program(schema: &Schema, funcs: Vec<Value>) -> Value {
        Value::Node {
            ty: schema.interface("Program").unwrap(),
            fields: vec![Value::Array(funcs), Value::Double(1.0)],
        }
    }

    fn sample_tree(schema: &Schema) -> Value {
        let inner = func(schema, "inner", Value::Null, Vec::new(), true);
        let outer = func(schema, "outer", Value::Double(2.0), vec![inner], false);
        let plain = func(schema, "plain", Value::Null, Vec::new(), true);
        program(schema, vec![outer, plain])
    }

    fn roundtrip(schema: &Schema, tree: &Value) -> (Value, Vec<u8>) {
        let mut fixed = tree.clone();
        let (ids, model, table, root) = setup(schema, &mut fixed);
        let mut buf = Vec::new();
        write_piece(schema, &ids, &model, &table, root, &fixed, &mut buf).unwrap();
        let mut cur = Cursor::new(buf.as_slice());
        let decoded = read_piece(schema, &ids, &model, &table, root, &mut cur, 0).unwrap();
        assert_eq!(cur.position() as usize, buf.len(), "trailing bytes after decode");
        (decoded, buf)
    }

    #[test]
    fn lazy_tree_roundtrips() {
        let schema = parse_idl(IDL).unwrap();
        let mut tree = sample_tree(&schema);
        // Round-trip equality is stated post-coercion.
        FloatFixer::new(&schema).rewrite(schema.interface("Program").unwrap(), &mut tree);
        let (decoded, _) = roundtrip(&schema, &tree);
        assert_eq!(decoded, tree);
    }

    #[test]
    fn empty_program_roundtrips() {
        let schema = parse_idl(IDL).unwrap();
        let tree = program(&schema, Vec::new());
        let (decoded, _) = roundtrip(&schema, &tree);
        assert_eq!(decoded, tree);
    }

    #[test]
    fn encoding_is_deterministic() {
        let schema = parse_idl(IDL).unwrap();
        let tree = sample_tree(&schema);
        let (_, first) = roundtrip(&schema, &tree);
        let (_, second) = roundtrip(&schema, &tree);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_model_symbol_fails_encoding() {
        let schema = parse_idl(IDL).unwrap();
        let mut small = program(&schema, Vec::new());
        let (ids, model, _, root) = setup(&schema, &mut small);
        // A model built over the empty program has never seen "outer".
        let mut big = sample_tree(&schema);
        FloatFixer::new(&schema).rewrite(root, &mut big);
        let collected = collect_strings(&schema, root, &big).unwrap();
        let table = StringTable::new(local_dict(collected, &[]), &[]);
        let mut buf = Vec::new();
        let err =
            write_piece(&schema, &ids, &model, &table, root, &big, &mut buf).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }

    #[test]
    fn model_missing_a_symbol_fails_decoding() {
        // Encode with the true model, decode with a model built from a
        // smaller tree: the stream and the distributions disagree from the
        // first affected token on. The decoder must fail or produce some
        // other tree, and must never panic.
        let schema = parse_idl(IDL).unwrap();
        let mut full = sample_tree(&schema);
        let (ids, model, table, root) = setup(&schema, &mut full);
        let mut buf = Vec::new();
        write_piece(&schema, &ids, &model, &table, root, &full, &mut buf).unwrap();

        let mut small =
            program(&schema, vec![func(&schema, "outer", Value::Null, vec![], false)]);
        let (_, small_model, _, _) = setup(&schema, &mut small);
        let mut cur = Cursor::new(buf.as_slice());
        match read_piece(&schema, &ids, &small_model, &table, root, &mut cur, 0) {
            Err(_) => {}
            Ok(decoded) => assert_ne!(decoded, full),
        }
    }

    #[test]
    fn tampered_piece_size_is_a_lazy_frame_mismatch() {
        let schema = parse_idl(IDL).unwrap();
        let mut tree = program(
            &schema,
            vec![func(&schema, "f", Value::Null, Vec::new(), true)],
        );
        let (ids, model, table, root) = setup(&schema, &mut tree);
        let mut buf = Vec::new();
        write_piece(&schema, &ids, &model, &table, root, &tree, &mut buf).unwrap();

        // The one piece is bitwise identical to encoding its body alone.
        let body = match &tree {
            Value::Node { fields, .. } => match &fields[0] {
                Value::Array(funcs) => match &funcs[0] {
                    Value::Node { fields, .. } => fields[3].clone(),
                    _ => unreachable!(),
                },
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        let bty = schema.interface("Body").unwrap();
        let mut piece = Vec::new();
        write_piece(&schema, &ids, &model, &table, bty, &body, &mut piece).unwrap();
        assert!(buf.ends_with(&piece));
        assert!(piece.len() < 128, "size varint must be a single byte");

        // Bump the declared size: the piece then ends before its boundary.
        let size_pos = buf.len() - piece.len() - 1;
        assert_eq!(buf[size_pos], piece.len() as u8);
        buf[size_pos] += 1;
        let mut cur = Cursor::new(buf.as_slice());
        let err = read_piece(&schema, &ids, &model, &table, root, &mut cur, 0).unwrap_err();
        assert!(matches!(err, Error::LazyFrameMismatch { .. }));
    }
}
