//! Per-field value summaries and their propagation along the type hierarchy.
//!
//! Scanning classifies every field write in a function body into evidence
//! fed to a per-(type, field) [`PossibleValues`] slot. Construction evidence
//! and store evidence live in separate maps because they propagate
//! differently: a construction writes exactly its declared type, so its
//! evidence only rises to supertypes, while a store goes through a reference
//! whose dynamic type is unknown, so its evidence must flow both up and down
//! the hierarchy.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use vireo_core::ir::{
    properties, walk, Expr, ExprKind, HeapTypeId, Literal, Type, TypeStore, Visitor,
};

use crate::possible_values::PossibleValues;

/// Maps each heap type to one [`PossibleValues`] slot per field.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    map: HashMap<HeapTypeId, Vec<PossibleValues>>,
}

impl FieldMap {
    /// The slots for `ty`, created on first use with one slot per field.
    pub fn values_mut(&mut self, types: &TypeStore, ty: HeapTypeId) -> &mut [PossibleValues] {
        self.map
            .entry(ty)
            .or_insert_with(|| vec![PossibleValues::default(); types.get(ty).fields.len()])
    }

    pub fn get(&self, ty: HeapTypeId, index: u32) -> Option<&PossibleValues> {
        self.map.get(&ty)?.get(index as usize)
    }

    pub fn keys(&self) -> impl Iterator<Item = HeapTypeId> + '_ {
        self.map.keys().copied()
    }

    /// Join every slot of `self` into `target`.
    pub fn combine_into(&self, target: &mut FieldMap) -> bool {
        let mut changed = false;
        for (&ty, values) in &self.map {
            match target.map.entry(ty) {
                Entry::Vacant(entry) => {
                    entry.insert(values.clone());
                    changed = true;
                }
                Entry::Occupied(mut entry) => {
                    for (slot, value) in entry.get_mut().iter_mut().zip(values) {
                        changed |= slot.combine(value);
                    }
                }
            }
        }
        changed
    }
}

/// Classifies field writes in one expression tree into construction and
/// store evidence.
pub struct WriteScanner<'a> {
    types: &'a TypeStore,
    pub new_map: FieldMap,
    pub set_map: FieldMap,
}

impl<'a> WriteScanner<'a> {
    pub fn new(types: &'a TypeStore) -> Self {
        Self {
            types,
            new_map: FieldMap::default(),
            set_map: FieldMap::default(),
        }
    }

    pub fn scan(&mut self, body: &mut Expr) {
        walk(body, self);
    }

    fn note_expression(value: &Expr, info: &mut PossibleValues) {
        if properties::is_constant_expression(value) {
            info.note(properties::get_literal(value));
        } else {
            info.note_unknown();
        }
    }

    /// A store whose value reads the same field through a same-or-supertype
    /// reference copies values the analysis already sees at their source, so
    /// it adds no evidence of its own.
    fn is_field_copy(&self, set_heap: HeapTypeId, index: u32, value: &Expr) -> bool {
        let ExprKind::StructGet {
            object,
            index: get_index,
        } = &value.kind
        else {
            return false;
        };
        if *get_index != index {
            return false;
        }
        match object.ty {
            Type::Ref(rt) => self.types.is_subtype(set_heap, rt.heap),
            _ => false,
        }
    }
}

impl Visitor for WriteScanner<'_> {
    fn visit_struct_new(&mut self, expr: &mut Expr) {
        if expr.ty == Type::Unreachable {
            return;
        }
        let ExprKind::StructNew { ty, operands } = &expr.kind else {
            return;
        };
        let ty = *ty;
        let field_types: Vec<Type> = self.types.get(ty).fields.iter().map(|f| f.ty).collect();
        let slots = self.new_map.values_mut(self.types, ty);
        if operands.is_empty() {
            // Default initialization writes each field's zero value.
            for (slot, field_ty) in slots.iter_mut().zip(field_types) {
                if let Some(zero) = Literal::zero(field_ty) {
                    slot.note(zero);
                }
            }
        } else {
            for (slot, operand) in slots.iter_mut().zip(operands) {
                Self::note_expression(operand, slot);
            }
        }
    }

    fn visit_struct_set(&mut self, expr: &mut Expr) {
        let ExprKind::StructSet {
            object,
            index,
            value,
        } = &expr.kind
        else {
            return;
        };
        let heap = match object.ty {
            Type::Ref(rt) => rt.heap,
            // The reference never produces a value; nothing is written.
            _ => return,
        };
        if self.is_field_copy(heap, *index, value) {
            return;
        }
        let index = *index as usize;
        let slot = &mut self.set_map.values_mut(self.types, heap)[index];
        Self::note_expression(value, slot);
    }
}

/// Lifts per-type summaries along the nominal hierarchy.
pub struct TypeHierarchyPropagator<'a> {
    types: &'a TypeStore,
    children: Vec<Vec<HeapTypeId>>,
}

impl<'a> TypeHierarchyPropagator<'a> {
    pub fn new(types: &'a TypeStore) -> Self {
        Self {
            types,
            children: types.children_index(),
        }
    }

    /// Construction evidence: a construction of `B` can be read through any
    /// supertype of `B`, and through nothing below it.
    pub fn propagate_to_supertypes(&self, map: &mut FieldMap) {
        self.propagate(map, false);
    }

    /// Store evidence: the store's reference could dynamically be any
    /// subtype of the annotated type, and the annotated type itself could be
    /// the dynamic type behind a subtype-annotated read, so evidence flows
    /// both directions.
    pub fn propagate_to_super_and_subtypes(&self, map: &mut FieldMap) {
        self.propagate(map, true);
    }

    fn propagate(&self, map: &mut FieldMap, to_subtypes: bool) {
        let mut work: VecDeque<HeapTypeId> = map.keys().collect();
        while let Some(ty) = work.pop_front() {
            let Some(values) = map.map.get(&ty).cloned() else {
                continue;
            };
            if let Some(parent) = self.types.supertype(ty) {
                // The parent declares a prefix of our fields.
                let parent_values = map.values_mut(self.types, parent);
                let mut changed = false;
                for (slot, value) in parent_values.iter_mut().zip(&values) {
                    changed |= slot.combine(value);
                }
                if changed {
                    work.push_back(parent);
                }
            }
            if to_subtypes {
                for &child in &self.children[ty.index()] {
                    let child_values = map.values_mut(self.types, child);
                    let mut changed = false;
                    for (slot, value) in child_values.iter_mut().zip(&values) {
                        changed |= slot.combine(value);
                    }
                    if changed {
                        work.push_back(child);
                    }
                }
            }
        }
    }
}
