//! Container framing and the encode/decode drivers.
//!
//! The on-disk layout is byte exact:
//!
//! ```text
//! magic[8]   = 89 42 4A 53 0D 0A 00 0A
//! version[1] = 02
//! payload    = brotli(local string table ‖ model section
//!                     ‖ tree body ‖ lazy index ‖ lazy pieces)
//! ```
//!
//! Encoding may rewrite the input tree: upstream AST producers narrow
//! doubles to integers, and the coercion back happens in place before type
//! checking and model construction. Callers that need the original must
//! clone first.
//!
//! Decoding asserts the magic before touching the payload, fully
//! decompresses the inner frame, parses the sections in order, restores
//! lazy pieces, and re-checks the tree against the schema.

use std::io::{Read, Write};

use binast_base::{read_bytes, read_u8, Error, Result};
use binast_schema::{FloatFixer, Schema, TypeChecker, TypeId, Value};

use crate::model::{build_model, ModelIds};
use crate::model_io::{read_model, write_model};
use crate::strings::{collect_strings, local_dict, read_dict, write_dict, StringTable};
use crate::tree::{read_piece, write_piece};

/// The magic header shared by recent binjs formats.
pub const MAGIC: [u8; 8] = [0x89, 0x42, 0x4A, 0x53, 0x0D, 0x0A, 0x00, 0x0A];

/// The supported format version, context-0.1.
pub const VERSION: u8 = 2;

// Brotli parameters are part of determinism: the same tree and dictionary
// must produce identical bytes across runs.
const BROTLI_QUALITY: i32 = 9;
const BROTLI_LGWIN: i32 = 22;

/// Compresses `tree` and writes it to `out`.
///
/// `shared_dict` is the caller's out-of-band string dictionary; `ty` is the
/// tree's declared type, `Script` by convention. The tree is coerced in
/// place (see the module docs), then type-checked; encoding starts only on
/// a conforming tree.
pub fn write<W: Write>(
    schema: &Schema,
    shared_dict: &[String],
    ty: TypeId,
    tree: &mut Value,
    out: &mut W,
) -> Result<()> {
    FloatFixer::new(schema).rewrite(ty, tree);
    TypeChecker::new(schema).check(ty, tree)?;

    let inner = encode_inner(schema, shared_dict, ty, tree)?;

    out.write_all(&MAGIC)?;
    out.write_all(&[VERSION])?;
    let params = brotli::enc::BrotliEncoderParams {
        quality: BROTLI_QUALITY,
        lgwin: BROTLI_LGWIN,
        ..Default::default()
    };
    brotli::BrotliCompress(&mut inner.as_slice(), out, &params)
        .map_err(|err| Error::format(format!("brotli compression failed: {err}")))?;
    Ok(())
}

/// Reads a container from `inp` and returns the decoded tree.
pub fn read<R: Read>(
    schema: &Schema,
    shared_dict: &[String],
    ty: TypeId,
    inp: &mut R,
) -> Result<Value> {
    let mut magic = [0u8; 8];
    read_bytes(inp, &mut magic)?;
    if magic != MAGIC {
        return Err(Error::format("not a binast container (bad magic)"));
    }
    let version = read_u8(inp)?;
    if version != VERSION {
        return Err(Error::format(format!(
            "unsupported format version {version} (expected {VERSION})"
        )));
    }

    let mut payload = Vec::new();
    inp.read_to_end(&mut payload)?;
    let mut inner = Vec::new();
    brotli::BrotliDecompress(&mut payload.as_slice(), &mut inner)
        .map_err(|err| Error::format(format!("brotli decompression failed: {err}")))?;

    decode_inner(schema, shared_dict, ty, &inner)
}

/// Assembles the uncompressed inner frame.
pub(crate) fn encode_inner(
    schema: &Schema,
    shared_dict: &[String],
    ty: TypeId,
    tree: &Value,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    let collected = collect_strings(schema, ty, tree)?;
    let local = local_dict(collected, shared_dict);
    write_dict(&mut out, &local)?;
    let table = StringTable::new(local, shared_dict);

    let ids = ModelIds::allocate(schema, ty);
    let model = build_model(schema, &ids, &table, ty, tree)?;
    write_model(&mut out, &model)?;

    write_piece(schema, &ids, &model, &table, ty, tree, &mut out)?;
    Ok(out)
}

/// Parses an uncompressed inner frame.
pub(crate) fn decode_inner(
    schema: &Schema,
    shared_dict: &[String],
    ty: TypeId,
    inner: &[u8],
) -> Result<Value> {
    let mut cur = std::io::Cursor::new(inner);

    let local = read_dict(&mut cur)?;
    let table = StringTable::new(local, shared_dict);

    let ids = ModelIds::allocate(schema, ty);
    let model = read_model(&mut cur, ids.len(), table.len() as u32)?;

    let tree = read_piece(schema, &ids, &model, &table, ty, &mut cur, 0)?;
    TypeChecker::new(schema).check(ty, &tree)?;
    Ok(tree)
}
