//! Per-position probability models.
//!
//! A *model id* names one probability distribution. Ids are allocated
//! during the canonical type walk: one per `(interface, attribute)` pair
//! when the interface is first visited, one per frozen-array type for its
//! list length. The allocation is re-run identically on encode and decode,
//! so ids never travel in the stream.
//!
//! A [`Distribution`] maps symbols to positive weights. Symbols are
//! heterogeneous: an attribute typed `(Expression or double)` codes both
//! variant tags and double bit patterns at the same id. Symbol order is
//! first-observation order during model construction and is serialised
//! as-is; the reader rebuilds the same order rather than sorting, which
//! sidesteps ordering questions across symbol kinds.
//!
//! [`each_token`] is the single source of truth for which `(model id,
//! symbol)` pairs a tree produces: the model builder counts them and the
//! encoder codes them through the same traversal, so the two cannot
//! disagree.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use binast_base::{Error, Result};
use binast_schema::{
    matching_member, walk_types, Primitive, Schema, TypeDef, TypeId, TypeVisitor, Value,
};

use crate::coder::MAX_TOTAL;
use crate::strings::StringTable;

/// Index of one probability distribution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ModelId(u32);

impl ModelId {
    /// Returns the numeric index of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One coded token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Symbol {
    /// An alternation discriminator: the selected member's index.
    Tag(u32),
    /// An enumeration symbol index.
    Enum(u32),
    /// A boolean.
    Bool(bool),
    /// An unsigned integer, also used for array lengths.
    Uint(u64),
    /// A double, as its IEEE 754 bit pattern.
    Double(u64),
    /// An index into the effective string dictionary.
    Str(u32),
}

/// A symbol-to-weight mapping in canonical (first-observation) order.
#[derive(Clone, Debug, Default)]
pub struct Distribution {
    entries: Vec<(Symbol, u32)>,
    lookup: HashMap<Symbol, u32>,
    cums: Vec<u32>,
    total: u32,
}

impl Distribution {
    /// Creates an empty distribution.
    pub fn new() -> Self {
        Distribution::default()
    }

    /// Records one occurrence of `symbol`, appending it on first sight.
    pub fn observe(&mut self, symbol: Symbol) {
        let next = self.entries.len() as u32;
        match self.lookup.entry(symbol) {
            Entry::Occupied(slot) => self.entries[*slot.get() as usize].1 += 1,
            Entry::Vacant(slot) => {
                slot.insert(next);
                self.entries.push((symbol, 1));
            }
        }
    }

    /// Rebuilds a distribution from serialised entries.
    ///
    /// Weights must be positive and total at most [`MAX_TOTAL`]; symbols
    /// must be distinct. The entry order is the canonical order.
    pub fn from_entries(entries: Vec<(Symbol, u32)>) -> Result<Self> {
        let mut lookup = HashMap::new();
        for (i, (sym, w)) in entries.iter().enumerate() {
            if *w == 0 {
                return Err(Error::format("distribution entry with zero weight"));
            }
            if lookup.insert(*sym, i as u32).is_some() {
                return Err(Error::format("distribution lists a symbol twice"));
            }
        }
        let mut dist = Distribution {
            entries,
            lookup,
            cums: Vec::new(),
            total: 0,
        };
        let total: u64 = dist.entries.iter().map(|(_, w)| u64::from(*w)).sum();
        if total > u64::from(MAX_TOTAL) {
            return Err(Error::format("distribution total exceeds coder capacity"));
        }
        dist.recompute_cums(total as u32);
        Ok(dist)
    }

    /// Rescales to fit the coder and freezes the cumulative table.
    ///
    /// Observation counts from a large tree can exceed what the range coder
    /// accepts; halving (with a floor of one, so observed symbols stay
    /// legal) preserves the shape of the distribution closely enough.
    pub fn seal(&mut self) -> Result<()> {
        if self.entries.len() > MAX_TOTAL as usize {
            return Err(Error::model(
                "distribution",
                format!(
                    "{} distinct symbols exceed coder capacity {MAX_TOTAL}",
                    self.entries.len()
                ),
            ));
        }
        let mut total: u64 = self.entries.iter().map(|(_, w)| u64::from(*w)).sum();
        while total > u64::from(MAX_TOTAL) {
            for entry in &mut self.entries {
                entry.1 = (entry.1 + 1) / 2;
            }
            total = self.entries.iter().map(|(_, w)| u64::from(*w)).sum();
        }
        self.recompute_cums(total as u32);
        Ok(())
    }

    fn recompute_cums(&mut self, total: u32) {
        self.cums.clear();
        let mut acc = 0u32;
        for (_, w) in &self.entries {
            self.cums.push(acc);
            acc += w;
        }
        self.total = total;
    }

    /// Returns `(cum, freq, total)` for `symbol`, or `None` if the symbol
    /// was never observed. The coder treats `None` as fatal.
    pub fn encode_params(&self, symbol: Symbol) -> Option<(u32, u32, u32)> {
        let i = *self.lookup.get(&symbol)? as usize;
        Some((self.cums[i], self.entries[i].1, self.total))
    }

    /// Returns the symbol whose band contains `target`, with its band.
    ///
    /// `target` must be below the sealed total.
    pub fn by_target(&self, target: u32) -> (Symbol, u32, u32) {
        let i = self.cums.partition_point(|&c| c <= target) - 1;
        (self.entries[i].0, self.cums[i], self.entries[i].1)
    }

    /// Entries in canonical order.
    pub fn entries(&self) -> &[(Symbol, u32)] {
        &self.entries
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was ever observed here.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of weights after sealing.
    pub fn total(&self) -> u32 {
        self.total
    }
}

/// The canonical model-id assignment for one root type.
pub struct ModelIds {
    attrs: HashMap<(TypeId, u32), ModelId>,
    arrays: HashMap<TypeId, ModelId>,
    next: u32,
}

impl ModelIds {
    /// Allocates ids for every position reachable from `root`.
    pub fn allocate(schema: &Schema, root: TypeId) -> ModelIds {
        let mut ids = ModelIds {
            attrs: HashMap::new(),
            arrays: HashMap::new(),
            next: 0,
        };
        walk_types(schema, root, &mut Allocator { ids: &mut ids });
        ids
    }

    /// The id coding tokens produced directly at attribute `attr_index` of
    /// `interface`.
    pub fn attr(&self, interface: TypeId, attr_index: usize) -> Result<ModelId> {
        self.attrs
            .get(&(interface, attr_index as u32))
            .copied()
            .ok_or_else(|| {
                Error::model(
                    "model ids",
                    "attribute is not reachable from the encoded root",
                )
            })
    }

    /// The list-length id of an array type.
    pub fn array(&self, array: TypeId) -> Result<ModelId> {
        self.arrays.get(&array).copied().ok_or_else(|| {
            Error::model("model ids", "array type is not reachable from the encoded root")
        })
    }

    /// Number of allocated ids.
    pub fn len(&self) -> u32 {
        self.next
    }

    /// Returns `true` if no ids were allocated.
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    fn push_attr(&mut self, interface: TypeId, attr_index: u32) {
        let id = ModelId(self.next);
        self.next += 1;
        self.attrs.insert((interface, attr_index), id);
    }

    fn push_array(&mut self, array: TypeId) {
        let id = ModelId(self.next);
        self.next += 1;
        self.arrays.insert(array, id);
    }
}

struct Allocator<'a> {
    ids: &'a mut ModelIds,
}

impl TypeVisitor for Allocator<'_> {
    fn visit_interface(&mut self, schema: &Schema, ty: TypeId) {
        if let TypeDef::Interface { attrs, .. } = schema.def(ty) {
            for i in 0..attrs.len() {
                self.ids.push_attr(ty, i as u32);
            }
        }
    }

    fn visit_array(&mut self, _schema: &Schema, ty: TypeId) {
        self.ids.push_array(ty);
    }
}

/// The full model: one distribution per allocated id.
pub struct Model {
    dists: Vec<Distribution>,
}

impl Model {
    /// Wraps distributions indexed by model id.
    pub fn from_dists(dists: Vec<Distribution>) -> Model {
        Model { dists }
    }

    /// The distribution at `id`.
    pub fn get(&self, id: ModelId) -> &Distribution {
        &self.dists[id.index()]
    }

    /// Distributions in id order.
    pub fn dists(&self) -> &[Distribution] {
        &self.dists
    }
}

/// Builds the model for `tree` by counting every token the encoder will
/// emit, then sealing each distribution.
pub fn build_model(
    schema: &Schema,
    ids: &ModelIds,
    strings: &StringTable,
    ty: TypeId,
    tree: &Value,
) -> Result<Model> {
    let mut dists = vec![Distribution::new(); ids.len() as usize];
    each_token(schema, ids, strings, ty, tree, &mut |id, sym| {
        dists[id.index()].observe(sym);
        Ok(())
    })?;
    for dist in &mut dists {
        dist.seal()?;
    }
    Ok(Model { dists })
}

/// Runs `f` over every `(model id, symbol)` pair the type-directed
/// traversal of `value` produces.
///
/// Subtrees behind lazy attributes are traversed in place when present
/// (that is how the model builder sees the whole tree) and contribute
/// nothing when already extracted to a [`Value::Lazy`] placeholder, which
/// is how the encoder walks the stripped main body.
pub fn each_token<F>(
    schema: &Schema,
    ids: &ModelIds,
    strings: &StringTable,
    ty: TypeId,
    value: &Value,
    f: &mut F,
) -> Result<()>
where
    F: FnMut(ModelId, Symbol) -> Result<()>,
{
    token_walk(schema, ids, strings, ty, value, None, f)
}

fn token_walk<F>(
    schema: &Schema,
    ids: &ModelIds,
    strings: &StringTable,
    ty: TypeId,
    value: &Value,
    enclosing: Option<ModelId>,
    f: &mut F,
) -> Result<()>
where
    F: FnMut(ModelId, Symbol) -> Result<()>,
{
    match schema.def(ty) {
        TypeDef::Interface { name, attrs } => {
            let Value::Node { ty: nty, fields } = value else {
                return Err(token_shape_err(schema, ty, value));
            };
            if *nty != ty || fields.len() != attrs.len() {
                return Err(token_shape_err(schema, ty, value));
            }
            for (i, (attr, field)) in attrs.iter().zip(fields).enumerate() {
                let id = ids.attr(ty, i)?;
                if let Value::Lazy(_) = field {
                    if attr.lazy {
                        // Extracted to a deferred piece; the placeholder
                        // needs no token, its index is positional.
                        continue;
                    }
                    return Err(Error::schema(
                        format!("{name}.{}", attr.name),
                        "lazy placeholder outside a lazy attribute",
                    ));
                }
                token_walk(schema, ids, strings, attr.ty, field, Some(id), f)?;
            }
            Ok(())
        }
        TypeDef::Alternation { members } => {
            let id = enclosing_id(schema, ty, enclosing)?;
            let Some(index) = matching_member(schema, members, value) else {
                return Err(token_shape_err(schema, ty, value));
            };
            f(id, Symbol::Tag(index as u32))?;
            let member = members[index];
            if matches!(schema.def(member), TypeDef::Primitive(Primitive::Null)) {
                return Ok(());
            }
            token_walk(schema, ids, strings, member, value, Some(id), f)
        }
        TypeDef::Enumeration { symbols, .. } => {
            let id = enclosing_id(schema, ty, enclosing)?;
            let Value::String(s) = value else {
                return Err(token_shape_err(schema, ty, value));
            };
            let Some(index) = symbols.iter().position(|sym| sym == s) else {
                return Err(token_shape_err(schema, ty, value));
            };
            f(id, Symbol::Enum(index as u32))
        }
        TypeDef::Primitive(p) => {
            match (p, value) {
                (Primitive::Null, Value::Null) => Ok(()),
                (Primitive::Bool, Value::Bool(b)) => {
                    f(enclosing_id(schema, ty, enclosing)?, Symbol::Bool(*b))
                }
                (Primitive::UnsignedLong, Value::Unsigned(n)) => {
                    f(enclosing_id(schema, ty, enclosing)?, Symbol::Uint(*n))
                }
                (Primitive::Double, Value::Double(d)) => f(
                    enclosing_id(schema, ty, enclosing)?,
                    Symbol::Double(d.to_bits()),
                ),
                (Primitive::String | Primitive::IdentifierName, Value::String(s)) => {
                    let Some(index) = strings.index_of(s) else {
                        return Err(Error::model(
                            "string table",
                            format!("\"{s}\" is not in the effective dictionary"),
                        ));
                    };
                    f(enclosing_id(schema, ty, enclosing)?, Symbol::Str(index))
                }
                _ => Err(token_shape_err(schema, ty, value)),
            }
        }
        TypeDef::FrozenArray { element } => {
            let Value::Array(items) = value else {
                return Err(token_shape_err(schema, ty, value));
            };
            let length_id = ids.array(ty)?;
            f(length_id, Symbol::Uint(items.len() as u64))?;
            for item in items {
                token_walk(schema, ids, strings, *element, item, enclosing, f)?;
            }
            Ok(())
        }
    }
}

fn enclosing_id(schema: &Schema, ty: TypeId, enclosing: Option<ModelId>) -> Result<ModelId> {
    enclosing.ok_or_else(|| {
        Error::model(
            schema.type_name(ty),
            "token produced outside any attribute position",
        )
    })
}

fn token_shape_err(schema: &Schema, ty: TypeId, _value: &Value) -> Error {
    Error::schema(
        schema.type_name(ty),
        "value does not conform to its declared type",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use binast_schema::{Attribute, SchemaBuilder};

    /// Item { flag: boolean, weight: double, names: FrozenArray<IdentifierName> }
    fn fixture() -> (Schema, TypeId) {
        let mut b = SchemaBuilder::new();
        let item = b.declare_interface("Item").unwrap();
        let names = {
            let ident = b.primitive(Primitive::IdentifierName);
            b.array_of(ident)
        };
        b.define_interface(
            item,
            vec![
                Attribute { name: "flag".into(), ty: b.primitive(Primitive::Bool), lazy: false },
                Attribute { name: "weight".into(), ty: b.primitive(Primitive::Double), lazy: false },
                Attribute { name: "names".into(), ty: names, lazy: false },
            ],
        )
        .unwrap();
        (b.finish().unwrap(), item)
    }

    fn item(ty: TypeId, flag: bool, weight: f64, names: &[&str]) -> Value {
        Value::Node {
            ty,
            fields: vec![
                Value::Bool(flag),
                Value::Double(weight),
                Value::Array(names.iter().map(|n| Value::String((*n).into())).collect()),
            ],
        }
    }

    #[test]
    fn ids_cover_attributes_and_array_lengths() {
        let (schema, root) = fixture();
        let ids = ModelIds::allocate(&schema, root);
        // Three attributes plus one list-length.
        assert_eq!(ids.len(), 4);
        assert_eq!(ids.attr(root, 0).unwrap().index(), 0);
        assert_eq!(ids.attr(root, 2).unwrap().index(), 2);
    }

    #[test]
    fn token_stream_counts_every_position() {
        let (schema, root) = fixture();
        let ids = ModelIds::allocate(&schema, root);
        let table = StringTable::new(vec!["x".into(), "y".into()], &[]);
        let tree = item(root, true, 2.5, &["x", "y", "x"]);
        let mut tokens = Vec::new();
        each_token(&schema, &ids, &table, root, &tree, &mut |id, sym| {
            tokens.push((id.index(), sym));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            tokens,
            vec![
                (0, Symbol::Bool(true)),
                (1, Symbol::Double(2.5f64.to_bits())),
                (3, Symbol::Uint(3)),
                (2, Symbol::Str(0)),
                (2, Symbol::Str(1)),
                (2, Symbol::Str(0)),
            ]
        );
    }

    #[test]
    fn built_model_counts_match_the_tree() {
        let (schema, root) = fixture();
        let ids = ModelIds::allocate(&schema, root);
        let table = StringTable::new(vec!["x".into(), "y".into()], &[]);
        let tree = item(root, false, 0.5, &["x", "y", "x"]);
        let model = build_model(&schema, &ids, &table, root, &tree).unwrap();
        let names = model.get(ids.attr(root, 2).unwrap());
        assert_eq!(
            names.entries(),
            &[(Symbol::Str(0), 2), (Symbol::Str(1), 1)]
        );
        assert_eq!(names.total(), 3);
    }

    #[test]
    fn distribution_bands_are_contiguous() {
        let mut dist = Distribution::new();
        for sym in [Symbol::Tag(0), Symbol::Tag(1), Symbol::Tag(0), Symbol::Tag(2)] {
            dist.observe(sym);
        }
        dist.seal().unwrap();
        assert_eq!(dist.encode_params(Symbol::Tag(0)), Some((0, 2, 4)));
        assert_eq!(dist.encode_params(Symbol::Tag(1)), Some((2, 1, 4)));
        assert_eq!(dist.encode_params(Symbol::Tag(2)), Some((3, 1, 4)));
        assert_eq!(dist.by_target(1), (Symbol::Tag(0), 0, 2));
        assert_eq!(dist.by_target(3), (Symbol::Tag(2), 3, 1));
    }

    #[test]
    fn unobserved_symbol_has_no_encode_params() {
        let mut dist = Distribution::new();
        dist.observe(Symbol::Bool(false));
        dist.seal().unwrap();
        assert_eq!(dist.encode_params(Symbol::Bool(true)), None);
    }

    #[test]
    fn sealing_rescales_overweight_distributions() {
        let mut dist = Distribution::new();
        dist.observe(Symbol::Uint(0));
        dist.observe(Symbol::Uint(1));
        // Inflate one weight past the coder bound.
        for _ in 0..(MAX_TOTAL + 10) {
            dist.observe(Symbol::Uint(0));
        }
        dist.seal().unwrap();
        assert!(dist.total() <= MAX_TOTAL);
        // Both symbols survive with positive weight.
        assert!(dist.encode_params(Symbol::Uint(1)).unwrap().1 >= 1);
    }

    #[test]
    fn from_entries_rejects_zero_weights_and_duplicates() {
        assert!(Distribution::from_entries(vec![(Symbol::Tag(0), 0)]).is_err());
        assert!(
            Distribution::from_entries(vec![(Symbol::Tag(0), 1), (Symbol::Tag(0), 2)]).is_err()
        );
    }

    #[test]
    fn string_missing_from_dictionary_is_a_model_mismatch() {
        let (schema, root) = fixture();
        let ids = ModelIds::allocate(&schema, root);
        let table = StringTable::new(Vec::new(), &[]);
        let tree = item(root, true, 1.0, &["ghost"]);
        let err = build_model(&schema, &ids, &table, root, &tree).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }
}
