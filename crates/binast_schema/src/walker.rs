//! Canonical traversal over the type graph.
//!
//! [`walk_types`] performs a depth-first, duplicate-suppressing visit of
//! every type reachable from a root: an interface is visited before its
//! attributes' types (in declaration order), an alternation before its
//! members, an array before its element. The visited set breaks the cycles
//! every real AST schema has (statements reach expressions reach
//! statements).
//!
//! This order is load-bearing: probability-model ids are allocated in it,
//! and the model section of the container is serialised in it, so encoder
//! and decoder re-run the identical walk instead of exchanging an id table.

use std::collections::HashSet;

use crate::types::{Schema, TypeDef, TypeId};

/// Callbacks for [`walk_types`]. Every method defaults to doing nothing.
pub trait TypeVisitor {
    /// Called once per reachable interface.
    fn visit_interface(&mut self, _schema: &Schema, _ty: TypeId) {}
    /// Called once per reachable alternation.
    fn visit_alternation(&mut self, _schema: &Schema, _ty: TypeId) {}
    /// Called once per reachable enumeration.
    fn visit_enumeration(&mut self, _schema: &Schema, _ty: TypeId) {}
    /// Called once per reachable primitive.
    fn visit_primitive(&mut self, _schema: &Schema, _ty: TypeId) {}
    /// Called once per reachable frozen array.
    fn visit_array(&mut self, _schema: &Schema, _ty: TypeId) {}
}

/// Walks every type reachable from `root` in canonical order.
pub fn walk_types(schema: &Schema, root: TypeId, visitor: &mut dyn TypeVisitor) {
    let mut seen = HashSet::new();
    walk_inner(schema, root, visitor, &mut seen);
}

fn walk_inner(
    schema: &Schema,
    ty: TypeId,
    visitor: &mut dyn TypeVisitor,
    seen: &mut HashSet<TypeId>,
) {
    if !seen.insert(ty) {
        return;
    }
    match schema.def(ty) {
        TypeDef::Interface { attrs, .. } => {
            visitor.visit_interface(schema, ty);
            for attr in attrs {
                walk_inner(schema, attr.ty, visitor, seen);
            }
        }
        TypeDef::Alternation { members } => {
            visitor.visit_alternation(schema, ty);
            for member in members {
                walk_inner(schema, *member, visitor, seen);
            }
        }
        TypeDef::Enumeration { .. } => visitor.visit_enumeration(schema, ty),
        TypeDef::Primitive(_) => visitor.visit_primitive(schema, ty),
        TypeDef::FrozenArray { element } => {
            visitor.visit_array(schema, ty);
            walk_inner(schema, *element, visitor, seen);
        }
    }
}
