//! Once reduction.
//!
//! A "once" function runs at most one time, gated by a monotonic global:
//!
//! ```text
//! global foo_ran = 0;
//!
//! function foo() {
//!   if (foo_ran) return;
//!   foo_ran = 1;
//!   ..work..
//! }
//! ```
//!
//! When the guard global is used for nothing else, a later call to `foo` on
//! a path where the guard is known set is a no-op and can be removed, as can
//! redundant guard stores. Knowledge of set guards propagates forward over
//! each function's CFG through dominators, and across calls through an
//! iterated per-function summary of the guards every call definitely sets.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::debug;

use vireo_core::cfg::{for_each_action, Action, Cfg, DomTree};
use vireo_core::ir::{nop_in_place, walk, Expr, ExprKind, Function, Type, Visitor};
use vireo_core::pass::{map_functions_parallel, Pass, PassRunner};
use vireo_core::Module;

pub struct OnceReduction;

impl Pass for OnceReduction {
    fn name(&self) -> &'static str {
        "once-reduction"
    }

    fn requires_closed_world(&self) -> bool {
        true
    }

    fn run(&mut self, _runner: &PassRunner, module: &mut Module) -> Result<()> {
        let Module {
            ref globals,
            ref mut functions,
            ..
        } = *module;

        // Every mutable, non-imported, constant-initialized integer global
        // starts as a candidate guard; scanning can only demote it. The
        // demotion is a one-way atomic store, so workers need no further
        // synchronization.
        let candidates: HashMap<String, AtomicBool> = globals
            .iter()
            .map(|global| {
                let eligible = global.mutable
                    && !global.imported
                    && global.ty.is_integer()
                    && matches!(
                        global.init.as_ref().map(|init| &init.kind),
                        Some(ExprKind::Const(_))
                    );
                (global.name.clone(), AtomicBool::new(eligible))
            })
            .collect();

        let guards = map_functions_parallel(functions, |func| scan_function(func, &candidates));

        let once_globals: HashSet<String> = candidates
            .into_iter()
            .filter(|(_, candidate)| candidate.load(Ordering::Relaxed))
            .map(|(name, _)| name)
            .collect();

        // A function's classification only stands if its guard survived.
        let mut once_funcs = HashMap::new();
        let mut guard_sets: HashMap<String, HashSet<String>> = HashMap::new();
        let mut found_once = false;
        for (func, guard) in functions.iter().zip(guards) {
            let guard = guard.filter(|g| once_globals.contains(g));
            let mut set = HashSet::new();
            if let Some(guard) = &guard {
                set.insert(guard.clone());
                found_once = true;
            }
            once_funcs.insert(func.name.clone(), guard);
            guard_sets.insert(func.name.clone(), set);
        }

        if !found_once {
            debug!("no once functions; nothing to do");
            return Ok(());
        }

        let info = OptInfo {
            once_globals,
            once_funcs,
        };

        // Optimize to a fixed point. The total number of guards known set
        // across all summaries only grows, and is bounded, so this
        // terminates; once an iteration adds nothing, no further call site
        // can learn anything new either.
        let mut last_total = 0usize;
        let mut iteration = 0usize;
        loop {
            iteration += 1;
            let results =
                map_functions_parallel(functions, |func| optimize_function(func, &info, &guard_sets));
            guard_sets = functions
                .iter()
                .zip(results)
                .map(|(func, set)| (func.name.clone(), set))
                .collect();

            let total: usize = guard_sets.values().map(|set| set.len()).sum();
            debug!(iteration, total, "once guards known set");
            assert!(total >= last_total);
            if total > last_total {
                last_total = total;
                continue;
            }
            return Ok(());
        }
    }
}

struct OptInfo {
    once_globals: HashSet<String>,
    /// For each function, the guard global when the function is "once".
    once_funcs: HashMap<String, Option<String>>,
}

/// Classify one function and demote any global it uses in an unsupported
/// way. Returns the function's guard global if its body matches the once
/// pattern.
fn scan_function(func: &mut Function, candidates: &HashMap<String, AtomicBool>) -> Option<String> {
    let reject = |name: &str| {
        if let Some(candidate) = candidates.get(name) {
            candidate.store(false, Ordering::Relaxed);
        }
    };

    struct Scan<'a, R: Fn(&str)> {
        reject: R,
        read_counts: &'a mut HashMap<String, usize>,
    }

    impl<R: Fn(&str)> Visitor for Scan<'_, R> {
        fn visit_global_get(&mut self, expr: &mut Expr) {
            let ExprKind::GlobalGet { name } = &expr.kind else {
                return;
            };
            *self.read_counts.entry(name.clone()).or_insert(0) += 1;
        }

        fn visit_global_set(&mut self, expr: &mut Expr) {
            let ExprKind::GlobalSet { name, value } = &expr.kind else {
                return;
            };
            if !value.ty.is_integer() {
                // Either a type we do not track, or an unreachable store
                // that never executes.
                return;
            }
            if let ExprKind::Const(literal) = &value.kind {
                if literal.integer().is_some_and(|v| v > 0) {
                    // The monotone write the pattern expects.
                    return;
                }
            }
            (self.reject)(name);
        }
    }

    let mut read_counts = HashMap::new();
    let Some(body) = func.body.as_mut() else {
        return None;
    };
    walk(
        body,
        &mut Scan {
            reject: &reject,
            read_counts: &mut read_counts,
        },
    );

    let mut guard = None;
    if func.params.is_empty() && func.results.is_empty() {
        if let Some(name) = match_once_pattern(body) {
            // The read in the pattern itself is fine; any other read means
            // the global's value is observed in ways we do not reason about.
            if let Some(count) = read_counts.get_mut(&name) {
                *count -= 1;
            }
            guard = Some(name);
        }
    }

    for (name, count) in read_counts {
        if count > 0 {
            reject(&name);
        }
    }
    guard
}

/// Match `block { if (global.get g) return; global.set g = const; ... }`,
/// returning `g`.
fn match_once_pattern(body: &Expr) -> Option<String> {
    let ExprKind::Block { list, .. } = &body.kind else {
        return None;
    };
    if list.len() < 2 {
        return None;
    }
    let ExprKind::If {
        condition,
        if_true,
        if_false: None,
    } = &list[0].kind
    else {
        return None;
    };
    let ExprKind::GlobalGet { name } = &condition.kind else {
        return None;
    };
    if !matches!(if_true.kind, ExprKind::Return { value: None }) {
        return None;
    }

    // The store's value was vetted during scanning; it must additionally
    // actually execute.
    let set = &list[1];
    if set.ty == Type::Unreachable {
        return None;
    }
    let ExprKind::GlobalSet {
        name: set_name, ..
    } = &set.kind
    else {
        return None;
    };
    if set_name != name {
        return None;
    }
    Some(name.clone())
}

/// Remove redundant guard stores and guarded calls in one function, and
/// return the set of guards it definitely writes before returning.
fn optimize_function(
    func: &mut Function,
    info: &OptInfo,
    guard_sets: &HashMap<String, HashSet<String>>,
) -> HashSet<String> {
    let Some(body) = func.body.as_mut() else {
        return HashSet::new();
    };

    let cfg = Cfg::build(body);
    let domtree = DomTree::new(&cfg);

    let mut fired: Vec<HashSet<String>> = vec![HashSet::new(); cfg.blocks.len()];
    let mut to_nop: HashSet<usize> = HashSet::new();

    for block in 0..cfg.blocks.len() {
        match domtree.idom(block) {
            // Everything the immediate dominator wrote on exit is written on
            // entry here.
            Some(idom) => fired[block] = fired[idom].clone(),
            // Unreachable blocks are dead-code elimination's problem.
            None if block != Cfg::ENTRY => continue,
            None => {}
        }

        let mut set = std::mem::take(&mut fired[block]);
        for action in &cfg.blocks[block].actions {
            match action {
                Action::GlobalSet { seq, name } => {
                    if info.once_globals.contains(name) && !set.insert(name.clone()) {
                        to_nop.insert(*seq);
                    }
                }
                Action::Call { seq, target } => {
                    if let Some(Some(guard)) = info.once_funcs.get(target) {
                        // A guarded call either fires the guard now, or has
                        // already run and does nothing.
                        if !set.insert(guard.clone()) {
                            to_nop.insert(*seq);
                        }
                    } else if let Some(callee_guards) = guard_sets.get(target) {
                        set.extend(callee_guards.iter().cloned());
                    }
                }
            }
        }
        fired[block] = set;
    }

    if !to_nop.is_empty() {
        for_each_action(body, |seq, expr| {
            if !to_nop.contains(&seq) {
                return;
            }
            // The whole node disappears, so its children must not carry
            // observable effects.
            match &expr.kind {
                ExprKind::GlobalSet { value, .. } => {
                    assert!(
                        matches!(value.kind, ExprKind::Const(_)),
                        "redundant guard store must write a bare constant"
                    );
                }
                ExprKind::Call { operands, .. } => {
                    assert!(operands.is_empty(), "guarded call must take no operands");
                }
                other => unreachable!("not a rewritable action: {other:?}"),
            }
            nop_in_place(expr);
        });
    }

    std::mem::take(&mut fired[Cfg::ENTRY])
}
