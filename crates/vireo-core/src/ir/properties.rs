//! Syntactic classification of expressions.

use super::expr::{Expr, ExprKind};
use super::literal::Literal;

/// Whether evaluating `expr` always produces the same value with no side
/// effects and no possibility of trapping.
///
/// Deliberately narrow: only literal constants qualify. Anything whose
/// evaluation could trap or observe state must not be treated as constant.
pub fn is_constant_expression(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Const(_) | ExprKind::RefNull(_) | ExprKind::RefFunc(_)
    )
}

/// The literal a constant expression evaluates to.
///
/// Only meaningful when [`is_constant_expression`] holds.
pub fn get_literal(expr: &Expr) -> Literal {
    match &expr.kind {
        ExprKind::Const(literal) => literal.clone(),
        ExprKind::RefNull(heap) => Literal::Null(*heap),
        ExprKind::RefFunc(name) => Literal::Func(name.clone()),
        other => panic!("not a constant expression: {other:?}"),
    }
}
