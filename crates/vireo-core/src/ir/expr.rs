//! The expression tree and its post-order traversal.
//!
//! Every expression carries a cached static type. Constructors in
//! [`crate::ir::builder`] set it; [`crate::ir::refinalize`] recomputes it
//! bottom-up after a rewrite changes subexpression types.

use super::literal::Literal;
use super::types::{HeapTypeId, Type};

/// Comparison operators, specialized by operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    EqI32,
    EqI64,
    EqF64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nop,
    Unreachable,
    Const(Literal),
    /// A block of expressions; its value is the last one's. A named block is
    /// a branch target: branching to it exits the block.
    Block {
        name: Option<String>,
        list: Vec<Expr>,
    },
    If {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Option<Box<Expr>>,
    },
    /// A named loop; branching to it restarts the body.
    Loop {
        name: String,
        body: Box<Expr>,
    },
    Br {
        target: String,
        condition: Option<Box<Expr>>,
    },
    Return {
        value: Option<Box<Expr>>,
    },
    Drop(Box<Expr>),
    LocalGet {
        index: u32,
    },
    LocalSet {
        index: u32,
        value: Box<Expr>,
    },
    GlobalGet {
        name: String,
    },
    GlobalSet {
        name: String,
        value: Box<Expr>,
    },
    Call {
        target: String,
        operands: Vec<Expr>,
    },
    /// Aggregate construction. An empty operand list means every field is
    /// default-initialized to its zero value.
    StructNew {
        ty: HeapTypeId,
        operands: Vec<Expr>,
    },
    StructGet {
        object: Box<Expr>,
        index: u32,
    },
    StructSet {
        object: Box<Expr>,
        index: u32,
        value: Box<Expr>,
    },
    RefNull(HeapTypeId),
    RefFunc(String),
    /// Traps when the operand is null, otherwise passes it through non-null.
    RefAsNonNull(Box<Expr>),
    Select {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }
}

/// Hooks invoked by [`walk`] after an expression's children were visited.
///
/// Each hook receives the node mutably and may replace it in place; the
/// replacement's children are not re-visited.
#[allow(unused_variables)]
pub trait Visitor {
    fn visit_struct_new(&mut self, expr: &mut Expr) {}
    fn visit_struct_get(&mut self, expr: &mut Expr) {}
    fn visit_struct_set(&mut self, expr: &mut Expr) {}
    fn visit_global_get(&mut self, expr: &mut Expr) {}
    fn visit_global_set(&mut self, expr: &mut Expr) {}
    fn visit_call(&mut self, expr: &mut Expr) {}
    /// Called for every expression, after any kind-specific hook.
    fn visit_expr(&mut self, expr: &mut Expr) {}
}

/// Post-order traversal: children in evaluation order, then the node itself.
pub fn walk<V: Visitor>(expr: &mut Expr, visitor: &mut V) {
    match &mut expr.kind {
        ExprKind::Nop
        | ExprKind::Unreachable
        | ExprKind::Const(_)
        | ExprKind::LocalGet { .. }
        | ExprKind::GlobalGet { .. }
        | ExprKind::RefNull(_)
        | ExprKind::RefFunc(_) => {}
        ExprKind::Block { list, .. } | ExprKind::StructNew { operands: list, .. } => {
            for child in list {
                walk(child, visitor);
            }
        }
        ExprKind::If {
            condition,
            if_true,
            if_false,
        } => {
            walk(condition, visitor);
            walk(if_true, visitor);
            if let Some(if_false) = if_false {
                walk(if_false, visitor);
            }
        }
        ExprKind::Loop { body, .. } => walk(body, visitor),
        ExprKind::Br { condition, .. } => {
            if let Some(condition) = condition {
                walk(condition, visitor);
            }
        }
        ExprKind::Return { value } => {
            if let Some(value) = value {
                walk(value, visitor);
            }
        }
        ExprKind::Drop(value)
        | ExprKind::LocalSet { value, .. }
        | ExprKind::GlobalSet { value, .. }
        | ExprKind::RefAsNonNull(value) => walk(value, visitor),
        ExprKind::Call { operands, .. } => {
            for operand in operands {
                walk(operand, visitor);
            }
        }
        ExprKind::StructGet { object, .. } => walk(object, visitor),
        ExprKind::StructSet { object, value, .. } => {
            walk(object, visitor);
            walk(value, visitor);
        }
        ExprKind::Select {
            condition,
            if_true,
            if_false,
        } => {
            walk(if_true, visitor);
            walk(if_false, visitor);
            walk(condition, visitor);
        }
        ExprKind::Binary { left, right, .. } => {
            walk(left, visitor);
            walk(right, visitor);
        }
    }

    match &expr.kind {
        ExprKind::StructNew { .. } => visitor.visit_struct_new(expr),
        ExprKind::StructGet { .. } => visitor.visit_struct_get(expr),
        ExprKind::StructSet { .. } => visitor.visit_struct_set(expr),
        ExprKind::GlobalGet { .. } => visitor.visit_global_get(expr),
        ExprKind::GlobalSet { .. } => visitor.visit_global_set(expr),
        ExprKind::Call { .. } => visitor.visit_call(expr),
        _ => {}
    }
    visitor.visit_expr(expr);
}
