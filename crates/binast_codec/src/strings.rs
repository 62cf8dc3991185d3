//! String collection and the string table sections.
//!
//! Every `DOMString` and `IdentifierName` leaf of a tree is coded as an
//! index into the effective dictionary `local ‖ shared`: the caller's
//! out-of-band shared dictionary appended to the per-file local table. The
//! encoder collects the tree's strings type-directed (so enumeration
//! symbols, which code as enum indices, are not swept in), subtracts the
//! shared dictionary, and writes the lexicographically-sorted remainder as
//! the local table at the head of the inner frame.
//!
//! The table section is `varint count`, then per string `varint byte
//! length` followed by UTF-8 bytes. Embedded tables carry no signature.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};

use binast_base::{read_bytes, read_varint, write_varint, Error, Result};
use binast_schema::{matching_member, Primitive, Schema, TypeDef, TypeId, Value};

/// The effective dictionary `local ‖ shared`, indexable both ways.
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    /// Builds the combined table. When a string appears in both halves the
    /// local (lower) index wins, which cannot happen for tables built by
    /// the encoder since the local half is the shared-subtracted remainder.
    pub fn new(local: Vec<String>, shared: &[String]) -> Self {
        let mut strings = local;
        strings.extend(shared.iter().cloned());
        let mut index = HashMap::new();
        for (i, s) in strings.iter().enumerate() {
            index.entry(s.clone()).or_insert(i as u32);
        }
        StringTable { strings, index }
    }

    /// Returns the index of `s` in the effective dictionary.
    pub fn index_of(&self, s: &str) -> Option<u32> {
        self.index.get(s).copied()
    }

    /// Returns the string at `index`.
    pub fn resolve(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Total number of entries, local and shared.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Collects every string-typed and identifier-typed leaf of `value`,
/// including leaves inside subtrees that will later be deferred.
pub fn collect_strings(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    collect_inner(schema, ty, value, &mut out);
    Ok(out)
}

fn collect_inner(schema: &Schema, ty: TypeId, value: &Value, out: &mut BTreeSet<String>) {
    match schema.def(ty) {
        TypeDef::Primitive(Primitive::String) | TypeDef::Primitive(Primitive::IdentifierName) => {
            if let Value::String(s) = value {
                out.insert(s.clone());
            }
        }
        TypeDef::Interface { attrs, .. } => {
            if let Value::Node { ty: nty, fields } = value {
                if *nty == ty {
                    for (attr, field) in attrs.iter().zip(fields) {
                        collect_inner(schema, attr.ty, field, out);
                    }
                }
            }
        }
        TypeDef::Alternation { members } => {
            if let Some(i) = matching_member(schema, members, value) {
                collect_inner(schema, members[i], value, out);
            }
        }
        TypeDef::FrozenArray { element } => {
            if let Value::Array(items) = value {
                for item in items {
                    collect_inner(schema, *element, item, out);
                }
            }
        }
        _ => {}
    }
}

/// Subtracts the shared dictionary, yielding the sorted local table.
pub fn local_dict(collected: BTreeSet<String>, shared: &[String]) -> Vec<String> {
    let shared: std::collections::HashSet<&str> =
        shared.iter().map(String::as_str).collect();
    collected
        .into_iter()
        .filter(|s| !shared.contains(s.as_str()))
        .collect()
}

/// Builds a shared dictionary from a corpus of typed trees: strings ordered
/// by descending occurrence count, ties broken lexicographically.
pub fn prepare_dict(schema: &Schema, corpus: &[(TypeId, &Value)]) -> Result<Vec<String>> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for (ty, tree) in corpus {
        for s in collect_strings(schema, *ty, tree)? {
            *counts.entry(s).or_insert(0) += 1;
        }
    }
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(entries.into_iter().map(|(s, _)| s).collect())
}

/// Writes a string table section.
pub fn write_dict<W: Write + ?Sized>(out: &mut W, strings: &[String]) -> Result<()> {
    write_varint(out, strings.len() as u64)?;
    for s in strings {
        write_varint(out, s.len() as u64)?;
        out.write_all(s.as_bytes())?;
    }
    Ok(())
}

/// Reads a string table section written by [`write_dict`].
pub fn read_dict<R: Read + ?Sized>(inp: &mut R) -> Result<Vec<String>> {
    let count = read_varint(inp)?;
    let mut strings = Vec::new();
    for _ in 0..count {
        let len = read_varint(inp)?;
        let len = usize::try_from(len)
            .map_err(|_| Error::format("string length does not fit in memory"))?;
        // Read incrementally: `len` is untrusted and must not drive an
        // allocation before the bytes are proven to exist.
        let mut buf = vec![0u8; len.min(64 * 1024)];
        let mut bytes = Vec::new();
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            read_bytes(inp, &mut buf[..chunk])?;
            bytes.extend_from_slice(&buf[..chunk]);
            remaining -= chunk;
        }
        let s = String::from_utf8(bytes)
            .map_err(|_| Error::format("string table entry is not valid UTF-8"))?;
        strings.push(s);
    }
    Ok(strings)
}
