//! Constant field propagation.
//!
//! Finds struct fields that are only ever written with a bounded set of
//! constant values, anywhere in the module and through any related type,
//! and rewrites reads of those fields into constants, traps, or selects. For
//! example, a vtable-like type whose slot is always constructed with the
//! same function reference lets every read of that slot become the function
//! reference directly.
//!
//! The analysis assumes a closed world: if another module could construct or
//! write these types, the rewrites would be unsound.

use std::mem;

use anyhow::Result;
use tracing::{debug, trace};

use vireo_core::ir::{
    Builder, Expr, ExprKind, Literal, ReFinalize, Type, TypeStore, TypeSystem,
};
use vireo_core::pass::{map_functions_parallel, Pass, PassRunner};
use vireo_core::Module;

use crate::field_summary::{FieldMap, TypeHierarchyPropagator, WriteScanner};
use crate::possible_values::PossibleValues;

pub struct ConstantFieldPropagation;

impl Pass for ConstantFieldPropagation {
    fn name(&self) -> &'static str {
        "constant-field-propagation"
    }

    fn requires_closed_world(&self) -> bool {
        true
    }

    fn run(&mut self, runner: &PassRunner, module: &mut Module) -> Result<()> {
        if module.type_system != TypeSystem::Nominal {
            anyhow::bail!("constant field propagation requires nominal typing");
        }

        let Module {
            ref types,
            ref mut globals,
            ref mut functions,
            ..
        } = *module;

        // Find and classify every field write, one worker per function.
        let scans = map_functions_parallel(functions, |func| {
            let mut scanner = WriteScanner::new(types);
            if let Some(body) = func.body.as_mut() {
                scanner.scan(body);
            }
            (scanner.new_map, scanner.set_map)
        });

        let mut combined_new = FieldMap::default();
        let mut combined_set = FieldMap::default();
        for (new_map, set_map) in scans {
            new_map.combine_into(&mut combined_new);
            set_map.combine_into(&mut combined_set);
        }

        // Constructions can also sit in global initializers, arbitrarily
        // deep in the initializer expression.
        let mut scanner = WriteScanner::new(types);
        for global in globals.iter_mut() {
            if let Some(init) = global.init.as_mut() {
                scanner.scan(init);
            }
        }
        scanner.new_map.combine_into(&mut combined_new);
        scanner.set_map.combine_into(&mut combined_set);

        // A read's reference may point at any subtype of its annotation, so
        // lift the evidence across the hierarchy before answering queries:
        // constructions rise to supertypes, stores flow both ways.
        let propagator = TypeHierarchyPropagator::new(types);
        propagator.propagate_to_supertypes(&mut combined_new);
        propagator.propagate_to_super_and_subtypes(&mut combined_set);

        let mut combined = combined_new;
        combined_set.combine_into(&mut combined);

        if tracing::enabled!(tracing::Level::TRACE) {
            for ty in combined.keys() {
                let mut index = 0u32;
                while let Some(info) = combined.get(ty, index) {
                    trace!(ty = %types.get(ty).name, index, %info, "field summary");
                    index += 1;
                }
            }
        }

        let shrink = runner.options.shrink_level > 0;
        let rewrites: usize = map_functions_parallel(functions, |func| {
            let Some(body) = func.body.as_mut() else {
                return 0;
            };
            let mut optimizer = FunctionOptimizer {
                types,
                infos: &combined,
                shrink,
                rewrites: 0,
            };
            optimizer.walk(body);
            if optimizer.rewrites > 0 {
                // Rewrites may have narrowed subexpression types; parents
                // must agree before any later type-dependent pass runs.
                ReFinalize::new(types).walk_function_body(body);
            }
            optimizer.rewrites
        })
        .into_iter()
        .sum();
        debug!(rewrites, "constant field propagation done");

        Ok(())
    }
}

/// Rewrites the field reads of one function from the combined summaries.
struct FunctionOptimizer<'a> {
    types: &'a TypeStore,
    infos: &'a FieldMap,
    shrink: bool,
    rewrites: usize,
}

impl FunctionOptimizer<'_> {
    /// Post-order descent that recognizes the select pattern this optimizer
    /// itself emits and leaves the read inside it alone, so a second
    /// application of the pass changes nothing.
    fn walk(&mut self, expr: &mut Expr) {
        if let Some(kept_read) = Self::select_rewrite_read(expr) {
            // Still descend below the read: its reference operand may hold
            // further optimizable reads.
            let ExprKind::StructGet { object, .. } = &mut kept_read.kind else {
                unreachable!()
            };
            self.walk(object);
            return;
        }

        match &mut expr.kind {
            ExprKind::Nop
            | ExprKind::Unreachable
            | ExprKind::Const(_)
            | ExprKind::LocalGet { .. }
            | ExprKind::GlobalGet { .. }
            | ExprKind::RefNull(_)
            | ExprKind::RefFunc(_) => {}
            ExprKind::Block { list, .. }
            | ExprKind::StructNew { operands: list, .. }
            | ExprKind::Call { operands: list, .. } => {
                for child in list {
                    self.walk(child);
                }
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                self.walk(condition);
                self.walk(if_true);
                if let Some(if_false) = if_false {
                    self.walk(if_false);
                }
            }
            ExprKind::Loop { body, .. } => self.walk(body),
            ExprKind::Br { condition, .. } => {
                if let Some(condition) = condition {
                    self.walk(condition);
                }
            }
            ExprKind::Return { value } => {
                if let Some(value) = value {
                    self.walk(value);
                }
            }
            ExprKind::Drop(value)
            | ExprKind::LocalSet { value, .. }
            | ExprKind::GlobalSet { value, .. }
            | ExprKind::RefAsNonNull(value) => self.walk(value),
            ExprKind::StructGet { object, .. } => self.walk(object),
            ExprKind::StructSet { object, value, .. } => {
                self.walk(object);
                self.walk(value);
            }
            ExprKind::Select {
                condition,
                if_true,
                if_false,
            } => {
                self.walk(if_true);
                self.walk(if_false);
                self.walk(condition);
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk(left);
                self.walk(right);
            }
        }

        if matches!(expr.kind, ExprKind::StructGet { .. }) {
            self.optimize_struct_get(expr);
        }
    }

    /// When `expr` is `select (eq get (const a)) (const a) (const b)`, the
    /// shape [`make_constant_expression`](Self::make_constant_expression)
    /// produces, return the kept read.
    fn select_rewrite_read(expr: &mut Expr) -> Option<&mut Expr> {
        let ExprKind::Select {
            condition,
            if_true,
            if_false,
        } = &mut expr.kind
        else {
            return None;
        };
        if !matches!(if_true.kind, ExprKind::Const(_))
            || !matches!(if_false.kind, ExprKind::Const(_))
        {
            return None;
        }
        let ExprKind::Binary { left, right, .. } = &mut condition.kind else {
            return None;
        };
        let (ExprKind::Const(compared), ExprKind::Const(first)) = (&right.kind, &if_true.kind)
        else {
            return None;
        };
        if compared != first || !matches!(left.kind, ExprKind::StructGet { .. }) {
            return None;
        }
        Some(left.as_mut())
    }

    fn take_struct_get(expr: &mut Expr) -> (Box<Expr>, u32) {
        let kind = mem::replace(&mut expr.kind, ExprKind::Nop);
        let ExprKind::StructGet { object, index } = kind else {
            unreachable!()
        };
        (object, index)
    }

    fn make_constant_expression(&mut self, expr: &mut Expr, values: &[Literal]) {
        let builder = Builder::new(self.types);

        if values.len() == 1 {
            // The read can only produce this one value; all that remains of
            // it is the trap on a null reference.
            let (object, _) = Self::take_struct_get(expr);
            *expr = builder.sequence(
                builder.drop_(builder.ref_as_non_null(*object)),
                builder.const_(values[0].clone()),
            );
            self.rewrites += 1;
            return;
        }

        // Two values need a runtime choice, which costs size: the read stays
        // (inside the comparison, preserving its trap), and both constants
        // are materialized for later passes to specialize on.
        if self.shrink {
            return;
        }

        if values.len() == 2 {
            if expr.ty.is_ref() {
                // No comparison can pick between two reference values here:
                // function references are not comparable, and aggregate
                // references have no constant we could emit.
                return;
            }

            let first = builder.const_(values[0].clone());
            let second = builder.const_(values[1].clone());
            let get = mem::replace(expr, builder.nop());
            *expr = builder.select(
                builder.binary_eq(get, builder.const_(values[0].clone())),
                first,
                second,
            );
            self.rewrites += 1;
        }
    }

    fn optimize_struct_get(&mut self, expr: &mut Expr) {
        let ExprKind::StructGet { object, index } = &expr.kind else {
            return;
        };
        let heap = match object.ty {
            Type::Ref(rt) => rt.heap,
            // The reference never completes; leave it to dead-code removal.
            _ => return,
        };
        let index = *index;

        let default = PossibleValues::default();
        let info = self.infos.get(heap, index).unwrap_or(&default);

        if !info.has_noted() {
            // No write to this field exists anywhere, through any related
            // type. Nothing of this type is ever even created, so this read
            // cannot be reached at runtime. The reference's side effects
            // stay; the trap the read would have raised becomes explicit.
            let builder = Builder::new(self.types);
            let (object, _) = Self::take_struct_get(expr);
            *expr = builder.sequence(builder.drop_(*object), builder.unreachable());
            self.rewrites += 1;
            return;
        }

        if !info.is_constant() {
            return;
        }

        let values: Vec<Literal> = info.values().to_vec();
        self.make_constant_expression(expr, &values);
    }
}
