//! The type universe: an arena of interned type definitions.
//!
//! Types are lightweight [`TypeId`] handles pointing into a [`Schema`]
//! arena. Handles make the cyclic type graphs of real ASTs (statements
//! contain expressions contain statements) representable without reference
//! counting: a recursive interface simply stores the handle of a type that
//! is defined elsewhere in the arena.
//!
//! Arrays and alternations are structurally interned, so every attribute
//! typed `FrozenArray<Statement>` shares one handle. The codec relies on
//! that: it allocates one list-length probability model per array *type*,
//! not per attribute.
//!
//! # Example
//!
//! ```
//! use binast_schema::{Primitive, SchemaBuilder, Attribute};
//!
//! let mut b = SchemaBuilder::new();
//! let point = b.declare_interface("Point").unwrap();
//! let double = b.primitive(Primitive::Double);
//! b.define_interface(point, vec![
//!     Attribute { name: "x".into(), ty: double, lazy: false },
//!     Attribute { name: "y".into(), ty: double, lazy: false },
//! ]).unwrap();
//! let schema = b.finish().unwrap();
//! assert_eq!(schema.interface("Point"), Some(point));
//! ```

use std::collections::{HashMap, HashSet};

use binast_base::{Error, Result};

/// A handle to a type in a [`Schema`] arena.
///
/// Handles are `Copy` and compare in O(1). They are only minted by
/// [`SchemaBuilder`] and are meaningless outside the schema that created
/// them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Returns the arena index of this handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The primitive types of the IDL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
    /// `boolean`.
    Bool,
    /// `unsigned long`.
    UnsignedLong,
    /// `double` (IEEE 754 binary64).
    Double,
    /// `DOMString`.
    String,
    /// `IdentifierName`; shares the string table with [`Primitive::String`].
    IdentifierName,
    /// The absent variant, only legal as an alternation member.
    Null,
}

impl Primitive {
    fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "boolean",
            Primitive::UnsignedLong => "unsigned long",
            Primitive::Double => "double",
            Primitive::String => "DOMString",
            Primitive::IdentifierName => "IdentifierName",
            Primitive::Null => "null",
        }
    }
}

/// One declared attribute of an interface.
#[derive(Clone, Debug)]
pub struct Attribute {
    /// Attribute name, unique within its interface.
    pub name: String,
    /// Resolved attribute type.
    pub ty: TypeId,
    /// Whether the value is siphoned into a deferred piece when encoding.
    pub lazy: bool,
}

/// A type definition in the arena.
#[derive(Debug)]
pub enum TypeDef {
    /// A named record with ordered attributes.
    Interface {
        /// Interface name, unique in the schema.
        name: String,
        /// Attributes in declaration order.
        attrs: Vec<Attribute>,
    },
    /// A tagged union of two or more member types, none of which is itself
    /// an alternation.
    Alternation {
        /// Members in declaration order, each listed at most once.
        members: Vec<TypeId>,
    },
    /// A finite ordered set of named symbols.
    Enumeration {
        /// Enumeration name, unique in the schema.
        name: String,
        /// Symbols in declaration order.
        symbols: Vec<String>,
    },
    /// A primitive type.
    Primitive(Primitive),
    /// A length-prefixed sequence.
    FrozenArray {
        /// Element type.
        element: TypeId,
    },
}

/// An immutable, closed type universe.
///
/// Built once by [`SchemaBuilder`] or [`crate::idl::parse_idl`]; shareable
/// across concurrent codec invocations.
#[derive(Debug)]
pub struct Schema {
    types: Vec<TypeDef>,
    interfaces: HashMap<String, TypeId>,
}

impl Schema {
    /// Returns the definition behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not minted by this schema's builder.
    pub fn def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// Looks up an interface by name.
    pub fn interface(&self, name: &str) -> Option<TypeId> {
        self.interfaces.get(name).copied()
    }

    /// Number of types in the arena.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the arena holds no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// A human-readable name for a type, for diagnostics.
    pub fn type_name(&self, id: TypeId) -> String {
        match self.def(id) {
            TypeDef::Interface { name, .. } => name.clone(),
            TypeDef::Enumeration { name, .. } => name.clone(),
            TypeDef::Primitive(p) => p.name().to_string(),
            TypeDef::FrozenArray { element } => {
                format!("FrozenArray<{}>", self.type_name(*element))
            }
            TypeDef::Alternation { members } => {
                let names: Vec<String> = members.iter().map(|m| self.type_name(*m)).collect();
                format!("({})", names.join(" or "))
            }
        }
    }
}

/// Incrementally builds a [`Schema`].
///
/// Interfaces are declared first and defined later so recursive type graphs
/// can be tied; [`SchemaBuilder::finish`] refuses schemas with undefined
/// interfaces or lazy attributes that do not resolve to interfaces.
pub struct SchemaBuilder {
    types: Vec<TypeDef>,
    names: HashMap<String, TypeId>,
    primitives: [TypeId; 6],
    arrays: HashMap<TypeId, TypeId>,
    alternations: HashMap<Vec<TypeId>, TypeId>,
    pending: HashSet<TypeId>,
}

impl SchemaBuilder {
    /// Creates a builder with the six primitives pre-interned.
    pub fn new() -> Self {
        let mut types = Vec::new();
        let all = [
            Primitive::Bool,
            Primitive::UnsignedLong,
            Primitive::Double,
            Primitive::String,
            Primitive::IdentifierName,
            Primitive::Null,
        ];
        let mut primitives = [TypeId(0); 6];
        for (i, p) in all.into_iter().enumerate() {
            primitives[i] = TypeId(types.len() as u32);
            types.push(TypeDef::Primitive(p));
        }
        SchemaBuilder {
            types,
            names: HashMap::new(),
            primitives,
            arrays: HashMap::new(),
            alternations: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    /// Returns the handle of a primitive type.
    pub fn primitive(&self, p: Primitive) -> TypeId {
        let idx = match p {
            Primitive::Bool => 0,
            Primitive::UnsignedLong => 1,
            Primitive::Double => 2,
            Primitive::String => 3,
            Primitive::IdentifierName => 4,
            Primitive::Null => 5,
        };
        self.primitives[idx]
    }

    /// Looks up a previously registered interface or enumeration by name.
    pub fn named(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Registers an enumeration.
    pub fn enumeration(&mut self, name: &str, symbols: Vec<String>) -> Result<TypeId> {
        if symbols.is_empty() {
            return Err(Error::schema(name, "enumeration has no symbols"));
        }
        let mut seen = HashSet::new();
        for s in &symbols {
            if !seen.insert(s.as_str()) {
                return Err(Error::schema(name, format!("duplicate enum symbol \"{s}\"")));
            }
        }
        let id = self.push_named(name)?;
        self.types.push(TypeDef::Enumeration {
            name: name.to_string(),
            symbols,
        });
        Ok(id)
    }

    /// Declares an interface so recursive attributes can reference it
    /// before [`SchemaBuilder::define_interface`] supplies its attributes.
    pub fn declare_interface(&mut self, name: &str) -> Result<TypeId> {
        let id = self.push_named(name)?;
        self.types.push(TypeDef::Interface {
            name: name.to_string(),
            attrs: Vec::new(),
        });
        self.pending.insert(id);
        Ok(id)
    }

    /// Supplies the attributes of a declared interface.
    pub fn define_interface(&mut self, id: TypeId, attrs: Vec<Attribute>) -> Result<()> {
        if !self.pending.remove(&id) {
            return Err(Error::schema(
                self.describe(id),
                "interface defined twice or never declared",
            ));
        }
        let mut seen = HashSet::new();
        for a in &attrs {
            if !seen.insert(a.name.as_str()) {
                return Err(Error::schema(
                    self.describe(id),
                    format!("duplicate attribute \"{}\"", a.name),
                ));
            }
        }
        // Only interfaces enter `pending`, so the slot is always a match.
        if let TypeDef::Interface { attrs: slot, .. } = &mut self.types[id.index()] {
            *slot = attrs;
        }
        Ok(())
    }

    /// Interns `FrozenArray<element>`.
    pub fn array_of(&mut self, element: TypeId) -> TypeId {
        if let Some(&id) = self.arrays.get(&element) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDef::FrozenArray { element });
        self.arrays.insert(element, id);
        id
    }

    /// Interns an alternation over `members`.
    ///
    /// Member alternations are flattened in place, so `(A or (B or C))`
    /// and `(A or B or C)` share a handle. Duplicate members are rejected.
    pub fn alternation(&mut self, members: Vec<TypeId>) -> Result<TypeId> {
        let mut flat = Vec::new();
        for m in members {
            match &self.types[m.index()] {
                TypeDef::Alternation { members } => flat.extend(members.iter().copied()),
                _ => flat.push(m),
            }
        }
        let mut seen = HashSet::new();
        for m in &flat {
            if !seen.insert(*m) {
                return Err(Error::schema(
                    self.describe(*m),
                    "alternation lists a member twice",
                ));
            }
        }
        if flat.len() < 2 {
            return Err(Error::schema(
                "alternation",
                "alternation needs at least two members",
            ));
        }
        if let Some(&id) = self.alternations.get(&flat) {
            return Ok(id);
        }
        let id = TypeId(self.types.len() as u32);
        self.alternations.insert(flat.clone(), id);
        self.types.push(TypeDef::Alternation { members: flat });
        Ok(id)
    }

    /// Interns `ty?`: the alternation of `ty` and the null variant.
    pub fn nullable(&mut self, ty: TypeId) -> Result<TypeId> {
        let null = self.primitive(Primitive::Null);
        self.alternation(vec![ty, null])
    }

    /// Validates and freezes the universe.
    pub fn finish(self) -> Result<Schema> {
        if let Some(id) = self.pending.iter().min() {
            return Err(Error::schema(
                self.describe(*id),
                "interface declared but never defined",
            ));
        }
        let mut interfaces = HashMap::new();
        for (name, id) in &self.names {
            if matches!(self.types[id.index()], TypeDef::Interface { .. }) {
                interfaces.insert(name.clone(), *id);
            }
        }
        // Lazy attributes must resolve to interfaces: a deferred piece is
        // decoded under its own root and has no enclosing attribute model.
        for def in &self.types {
            if let TypeDef::Interface { name, attrs } = def {
                for a in attrs {
                    if a.lazy && !matches!(self.types[a.ty.index()], TypeDef::Interface { .. }) {
                        return Err(Error::schema(
                            format!("{}.{}", name, a.name),
                            "lazy attribute does not resolve to an interface",
                        ));
                    }
                }
            }
        }
        Ok(Schema {
            types: self.types,
            interfaces,
        })
    }

    fn push_named(&mut self, name: &str) -> Result<TypeId> {
        if self.names.contains_key(name) {
            return Err(Error::schema(name, "name defined twice"));
        }
        let id = TypeId(self.types.len() as u32);
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    fn describe(&self, id: TypeId) -> String {
        match &self.types[id.index()] {
            TypeDef::Interface { name, .. } => name.clone(),
            TypeDef::Enumeration { name, .. } => name.clone(),
            TypeDef::Primitive(p) => p.name().to_string(),
            TypeDef::FrozenArray { .. } => "FrozenArray".to_string(),
            TypeDef::Alternation { .. } => "alternation".to_string(),
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
