//! End-to-end tests for once reduction.
//!
//! Each module carries a guard global and functions in the once pattern;
//! the tests assert which calls and guard stores survive the pass.

use vireo_core::prelude::*;
use vireo_opt::OnceReduction;

fn run_pass(module: &mut Module) -> anyhow::Result<()> {
    PassRunner::new().run(&mut OnceReduction, module)
}

fn guard_global(types: &TypeStore, name: &str) -> Global {
    let builder = Builder::new(types);
    Global {
        name: name.to_string(),
        ty: Type::I32,
        mutable: true,
        imported: false,
        init: Some(builder.const_(Literal::I32(0))),
    }
}

fn function(name: &str, body: Expr) -> Function {
    Function {
        name: name.to_string(),
        params: Vec::new(),
        results: Vec::new(),
        locals: Vec::new(),
        body: Some(body),
    }
}

/// `block { if (g) return; g = 1; ..work.. }`
fn once_function(types: &TypeStore, name: &str, guard: &str) -> Function {
    let builder = Builder::new(types);
    function(
        name,
        builder.block(vec![
            builder.if_(
                builder.global_get(guard, Type::I32),
                builder.return_(None),
            ),
            builder.global_set(guard, builder.const_(Literal::I32(1))),
            builder.drop_(builder.const_(Literal::I32(10))),
        ]),
    )
}

fn call(types: &TypeStore, target: &str) -> Expr {
    Builder::new(types).call(target, Vec::new(), Type::None)
}

fn body_list<'m>(module: &'m Module, name: &str) -> &'m [Expr] {
    let body = module.function(name).unwrap().body.as_ref().unwrap();
    match &body.kind {
        ExprKind::Block { list, .. } => list,
        other => panic!("expected block body, got {other:?}"),
    }
}

fn is_call_to(expr: &Expr, name: &str) -> bool {
    matches!(&expr.kind, ExprKind::Call { target, .. } if target == name)
}

// ============================================================================
// Redundant calls within one function
// ============================================================================

#[test]
fn second_call_in_the_same_block_is_removed() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(matches!(list[1].kind, ExprKind::Nop));
}

#[test]
fn calls_to_sibling_guarded_functions_are_removed() {
    // Two functions share one guard; after either has run, the other is a
    // no-op too.
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "first", "g"));
    module
        .functions
        .push(once_function(&module.types, "second", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "first"),
            call(&module.types, "second"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "first"));
    assert!(matches!(list[1].kind, ExprKind::Nop));
}

#[test]
fn unrelated_calls_do_not_reset_the_facts() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "other",
        builder.block(vec![builder.drop_(builder.const_(Literal::I32(5)))]),
    ));
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            call(&module.types, "other"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(is_call_to(&list[1], "other"));
    assert!(matches!(list[2].kind, ExprKind::Nop));
}

// ============================================================================
// Redundant guard stores
// ============================================================================

#[test]
fn stores_after_a_guarded_call_are_removed() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "writer",
        builder.block(vec![
            builder.global_set("g", builder.const_(Literal::I32(1))),
            builder.global_set("g", builder.const_(Literal::I32(2))),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "writer");
    assert!(matches!(list[0].kind, ExprKind::GlobalSet { .. }));
    assert!(matches!(list[1].kind, ExprKind::Nop));
    // The guard is already set when the call is reached.
    assert!(matches!(list[2].kind, ExprKind::Nop));
}

// ============================================================================
// Interprocedural propagation
// ============================================================================

#[test]
fn summaries_propagate_through_plain_callers() {
    // `wrapper` is not itself a once function, but it definitely sets `g`
    // by calling `init`. That fact reaches `outer` only on the second
    // driver iteration.
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "wrapper",
        builder.block(vec![call(&module.types, "init")]),
    ));
    module.functions.push(function(
        "outer",
        builder.block(vec![
            call(&module.types, "wrapper"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "outer");
    assert!(is_call_to(&list[0], "wrapper"));
    assert!(matches!(list[1].kind, ExprKind::Nop));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn dominated_calls_are_removed() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            builder.if_(
                builder.const_(Literal::I32(1)),
                call(&module.types, "init"),
            ),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    let ExprKind::If { if_true, .. } = &list[1].kind else {
        panic!("expected if");
    };
    assert!(matches!(if_true.kind, ExprKind::Nop));
}

#[test]
fn merges_only_know_what_their_dominator_knows() {
    // Both branches call `init`, but the merge point only inherits facts
    // from its immediate dominator, the branch head, where nothing has run
    // yet. The call after the if survives.
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "caller",
        builder.block(vec![
            builder.if_else(
                builder.const_(Literal::I32(1)),
                call(&module.types, "init"),
                call(&module.types, "init"),
            ),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    let ExprKind::If {
        if_true, if_false, ..
    } = &list[0].kind
    else {
        panic!("expected if");
    };
    assert!(is_call_to(if_true, "init"));
    assert!(is_call_to(if_false.as_ref().unwrap(), "init"));
    assert!(is_call_to(&list[1], "init"));
}

// ============================================================================
// Classification retractions
// ============================================================================

#[test]
fn reads_outside_the_pattern_reject_the_guard() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "peek",
        builder.block(vec![builder.drop_(builder.global_get("g", Type::I32))]),
    ));
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(is_call_to(&list[1], "init"));
}

#[test]
fn zero_stores_reject_the_guard() {
    // A zero store means the guard can be reset, so it is not monotone.
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "reset",
        builder.block(vec![
            builder.global_set("g", builder.const_(Literal::I32(0))),
        ]),
    ));
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(is_call_to(&list[1], "init"));
}

#[test]
fn non_constant_stores_reject_the_guard() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(Function {
        name: "scramble".to_string(),
        params: Vec::new(),
        results: Vec::new(),
        locals: vec![Type::I32],
        body: Some(builder.block(vec![
            builder.global_set("g", builder.local_get(0, Type::I32)),
        ])),
    });
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "init"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(is_call_to(&list[1], "init"));
}

#[test]
fn functions_with_parameters_are_never_once() {
    // The body matches the pattern, but a parameter disqualifies the
    // function, and the pattern's read then counts against the guard.
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(Function {
        name: "init".to_string(),
        params: vec![Type::I32],
        results: Vec::new(),
        locals: Vec::new(),
        body: Some(builder.block(vec![
            builder.if_(
                builder.global_get("g", Type::I32),
                builder.return_(None),
            ),
            builder.global_set("g", builder.const_(Literal::I32(1))),
        ])),
    });
    module.functions.push(function(
        "caller",
        builder.block(vec![
            builder.call("init", vec![builder.const_(Literal::I32(1))], Type::None),
            builder.call("init", vec![builder.const_(Literal::I32(2))], Type::None),
        ]),
    ));

    run_pass(&mut module).unwrap();

    let list = body_list(&module, "caller");
    assert!(is_call_to(&list[0], "init"));
    assert!(is_call_to(&list[1], "init"));
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn the_pass_is_idempotent() {
    let mut module = Module::default();
    module.globals.push(guard_global(&module.types, "g"));
    module
        .functions
        .push(once_function(&module.types, "init", "g"));
    let builder = Builder::new(&module.types);
    module.functions.push(function(
        "wrapper",
        builder.block(vec![call(&module.types, "init")]),
    ));
    module.functions.push(function(
        "caller",
        builder.block(vec![
            call(&module.types, "wrapper"),
            call(&module.types, "init"),
            call(&module.types, "init"),
        ]),
    ));

    run_pass(&mut module).unwrap();
    let after_first = module.clone();
    run_pass(&mut module).unwrap();
    assert_eq!(module, after_first);
}
