//! Serialising the model section.
//!
//! The model section precedes the first tree token so the decoder holds
//! every distribution before it decodes anything. Distributions are written
//! in model-id allocation order (no id appears in the stream), each one as
//! `varint symbol count`, then per symbol in canonical order: a one-byte
//! kind tag, the kind's payload, and the varint weight.
//!
//! The kind tag is what lets one distribution mix symbol kinds (an
//! alternation over primitives codes tags and values at a single id)
//! and still deserialise without type context.

use std::io::{Read, Write};

use binast_base::{read_bytes, read_u8, read_varint, write_varint, Error, Result};

use crate::coder::MAX_TOTAL;
use crate::model::{Distribution, Model, Symbol};

const KIND_TAG: u8 = 0;
const KIND_ENUM: u8 = 1;
const KIND_BOOL: u8 = 2;
const KIND_UINT: u8 = 3;
const KIND_DOUBLE: u8 = 4;
const KIND_STR: u8 = 5;

/// Writes every distribution of `model` in id order.
pub fn write_model<W: Write + ?Sized>(out: &mut W, model: &Model) -> Result<()> {
    for dist in model.dists() {
        write_varint(out, dist.len() as u64)?;
        for (symbol, weight) in dist.entries() {
            write_symbol(out, *symbol)?;
            write_varint(out, u64::from(*weight))?;
        }
    }
    Ok(())
}

fn write_symbol<W: Write + ?Sized>(out: &mut W, symbol: Symbol) -> Result<()> {
    match symbol {
        Symbol::Tag(i) => {
            out.write_all(&[KIND_TAG])?;
            write_varint(out, u64::from(i))
        }
        Symbol::Enum(i) => {
            out.write_all(&[KIND_ENUM])?;
            write_varint(out, u64::from(i))
        }
        Symbol::Bool(b) => {
            out.write_all(&[KIND_BOOL, u8::from(b)])?;
            Ok(())
        }
        Symbol::Uint(v) => {
            out.write_all(&[KIND_UINT])?;
            write_varint(out, v)
        }
        Symbol::Double(bits) => {
            out.write_all(&[KIND_DOUBLE])?;
            out.write_all(&bits.to_le_bytes())?;
            Ok(())
        }
        Symbol::Str(i) => {
            out.write_all(&[KIND_STR])?;
            write_varint(out, u64::from(i))
        }
    }
}

/// Reads `n_models` distributions written by [`write_model`].
///
/// `n_strings` bounds the string indices a well-formed section may
/// reference; anything outside the effective dictionary is rejected here
/// rather than surfacing mid-tree.
pub fn read_model<R: Read + ?Sized>(inp: &mut R, n_models: u32, n_strings: u32) -> Result<Model> {
    let mut dists = Vec::with_capacity(n_models as usize);
    for _ in 0..n_models {
        let count = read_varint(inp)?;
        if count > u64::from(MAX_TOTAL) {
            return Err(Error::format("distribution symbol count exceeds coder capacity"));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let symbol = read_symbol(inp, n_strings)?;
            let weight = read_varint(inp)?;
            if weight == 0 || weight > u64::from(MAX_TOTAL) {
                return Err(Error::format("distribution weight out of range"));
            }
            entries.push((symbol, weight as u32));
        }
        dists.push(Distribution::from_entries(entries)?);
    }
    Ok(Model::from_dists(dists))
}

fn read_symbol<R: Read + ?Sized>(inp: &mut R, n_strings: u32) -> Result<Symbol> {
    let index_u32 = |v: u64| -> Result<u32> {
        u32::try_from(v).map_err(|_| Error::format("symbol index out of range"))
    };
    match read_u8(inp)? {
        KIND_TAG => Ok(Symbol::Tag(index_u32(read_varint(inp)?)?)),
        KIND_ENUM => Ok(Symbol::Enum(index_u32(read_varint(inp)?)?)),
        KIND_BOOL => match read_u8(inp)? {
            0 => Ok(Symbol::Bool(false)),
            1 => Ok(Symbol::Bool(true)),
            _ => Err(Error::format("boolean symbol is neither 0 nor 1")),
        },
        KIND_UINT => Ok(Symbol::Uint(read_varint(inp)?)),
        KIND_DOUBLE => {
            let mut bits = [0u8; 8];
            read_bytes(inp, &mut bits)?;
            Ok(Symbol::Double(u64::from_le_bytes(bits)))
        }
        KIND_STR => {
            let index = index_u32(read_varint(inp)?)?;
            if index >= n_strings {
                return Err(Error::format(format!(
                    "string symbol {index} is outside the {n_strings}-entry dictionary"
                )));
            }
            Ok(Symbol::Str(index))
        }
        other => Err(Error::format(format!("unknown symbol kind {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(symbols: &[(Symbol, u32)]) -> Distribution {
        let mut d = Distribution::new();
        for (sym, count) in symbols {
            for _ in 0..*count {
                d.observe(*sym);
            }
        }
        d.seal().unwrap();
        d
    }

    #[test]
    fn heterogeneous_distribution_roundtrips_in_order() {
        let d = dist(&[
            (Symbol::Tag(1), 3),
            (Symbol::Double(2.5f64.to_bits()), 1),
            (Symbol::Str(0), 2),
            (Symbol::Bool(true), 1),
            (Symbol::Enum(4), 1),
            (Symbol::Uint(900), 1),
        ]);
        let model = Model::from_dists(vec![d]);
        let mut buf = Vec::new();
        write_model(&mut buf, &model).unwrap();
        let back = read_model(&mut buf.as_slice(), 1, 1).unwrap();
        assert_eq!(
            back.dists()[0].entries(),
            model.dists()[0].entries()
        );
    }

    #[test]
    fn empty_distributions_roundtrip() {
        let model = Model::from_dists(vec![Distribution::new(), dist(&[(Symbol::Tag(0), 1)])]);
        let mut buf = Vec::new();
        write_model(&mut buf, &model).unwrap();
        let back = read_model(&mut buf.as_slice(), 2, 0).unwrap();
        assert!(back.dists()[0].is_empty());
        assert_eq!(back.dists()[1].len(), 1);
    }

    #[test]
    fn zero_weight_is_rejected() {
        // count=1, kind=tag, index=0, weight=0.
        let bytes = [0x01, KIND_TAG, 0x00, 0x00];
        let err = read_model(&mut bytes.as_slice(), 1, 0).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let bytes = [0x01, 0x09, 0x00, 0x01];
        let err = read_model(&mut bytes.as_slice(), 1, 0).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn out_of_dictionary_string_symbol_is_rejected() {
        let d = dist(&[(Symbol::Str(3), 1)]);
        let model = Model::from_dists(vec![d]);
        let mut buf = Vec::new();
        write_model(&mut buf, &model).unwrap();
        let err = read_model(&mut buf.as_slice(), 1, 2).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }

    #[test]
    fn truncated_section_is_rejected() {
        let d = dist(&[(Symbol::Uint(5), 1)]);
        let model = Model::from_dists(vec![d]);
        let mut buf = Vec::new();
        write_model(&mut buf, &model).unwrap();
        buf.pop();
        let err = read_model(&mut buf.as_slice(), 1, 0).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch(_)));
    }
}
