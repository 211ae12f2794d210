//! Expression constructors.
//!
//! Each constructor sets the node's static type from its parts, so trees
//! built here are correctly typed without a separate finalize step.

use super::expr::{BinaryOp, Expr, ExprKind};
use super::literal::Literal;
use super::types::{HeapTypeId, RefType, Type, TypeStore};

pub struct Builder<'a> {
    types: &'a TypeStore,
}

impl<'a> Builder<'a> {
    pub fn new(types: &'a TypeStore) -> Self {
        Self { types }
    }

    pub fn nop(&self) -> Expr {
        Expr::new(ExprKind::Nop, Type::None)
    }

    pub fn unreachable(&self) -> Expr {
        Expr::new(ExprKind::Unreachable, Type::Unreachable)
    }

    pub fn const_(&self, literal: Literal) -> Expr {
        let ty = literal.ty();
        Expr::new(ExprKind::Const(literal), ty)
    }

    pub fn drop_(&self, value: Expr) -> Expr {
        let ty = if value.ty == Type::Unreachable {
            Type::Unreachable
        } else {
            Type::None
        };
        Expr::new(ExprKind::Drop(Box::new(value)), ty)
    }

    /// A two-element block that evaluates `first` for its effects and yields
    /// `second`.
    pub fn sequence(&self, first: Expr, second: Expr) -> Expr {
        let ty = second.ty;
        Expr::new(
            ExprKind::Block {
                name: None,
                list: vec![first, second],
            },
            ty,
        )
    }

    pub fn block(&self, list: Vec<Expr>) -> Expr {
        let ty = list.last().map_or(Type::None, |last| last.ty);
        Expr::new(ExprKind::Block { name: None, list }, ty)
    }

    pub fn named_block(&self, name: impl Into<String>, list: Vec<Expr>) -> Expr {
        let ty = list.last().map_or(Type::None, |last| last.ty);
        Expr::new(
            ExprKind::Block {
                name: Some(name.into()),
                list,
            },
            ty,
        )
    }

    pub fn if_(&self, condition: Expr, if_true: Expr) -> Expr {
        Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                if_true: Box::new(if_true),
                if_false: None,
            },
            Type::None,
        )
    }

    pub fn if_else(&self, condition: Expr, if_true: Expr, if_false: Expr) -> Expr {
        let ty = self
            .types
            .lub(if_true.ty, if_false.ty)
            .unwrap_or(Type::None);
        Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                if_true: Box::new(if_true),
                if_false: Some(Box::new(if_false)),
            },
            ty,
        )
    }

    pub fn loop_(&self, name: impl Into<String>, body: Expr) -> Expr {
        let ty = body.ty;
        Expr::new(
            ExprKind::Loop {
                name: name.into(),
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn br(&self, target: impl Into<String>) -> Expr {
        Expr::new(
            ExprKind::Br {
                target: target.into(),
                condition: None,
            },
            Type::Unreachable,
        )
    }

    pub fn br_if(&self, target: impl Into<String>, condition: Expr) -> Expr {
        Expr::new(
            ExprKind::Br {
                target: target.into(),
                condition: Some(Box::new(condition)),
            },
            Type::None,
        )
    }

    pub fn return_(&self, value: Option<Expr>) -> Expr {
        Expr::new(
            ExprKind::Return {
                value: value.map(Box::new),
            },
            Type::Unreachable,
        )
    }

    pub fn local_get(&self, index: u32, ty: Type) -> Expr {
        Expr::new(ExprKind::LocalGet { index }, ty)
    }

    pub fn local_set(&self, index: u32, value: Expr) -> Expr {
        let ty = if value.ty == Type::Unreachable {
            Type::Unreachable
        } else {
            Type::None
        };
        Expr::new(
            ExprKind::LocalSet {
                index,
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn global_get(&self, name: impl Into<String>, ty: Type) -> Expr {
        Expr::new(ExprKind::GlobalGet { name: name.into() }, ty)
    }

    pub fn global_set(&self, name: impl Into<String>, value: Expr) -> Expr {
        let ty = if value.ty == Type::Unreachable {
            Type::Unreachable
        } else {
            Type::None
        };
        Expr::new(
            ExprKind::GlobalSet {
                name: name.into(),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn call(&self, target: impl Into<String>, operands: Vec<Expr>, result: Type) -> Expr {
        Expr::new(
            ExprKind::Call {
                target: target.into(),
                operands,
            },
            result,
        )
    }

    pub fn struct_new(&self, ty: HeapTypeId, operands: Vec<Expr>) -> Expr {
        Expr::new(
            ExprKind::StructNew { ty, operands },
            Type::Ref(RefType::non_null(ty)),
        )
    }

    /// A construction with every field default-initialized.
    pub fn struct_new_default(&self, ty: HeapTypeId) -> Expr {
        self.struct_new(ty, Vec::new())
    }

    pub fn struct_get(&self, object: Expr, index: u32) -> Expr {
        let ty = match object.ty {
            Type::Ref(rt) => self.types.field(rt.heap, index).ty,
            _ => Type::Unreachable,
        };
        Expr::new(
            ExprKind::StructGet {
                object: Box::new(object),
                index,
            },
            ty,
        )
    }

    pub fn struct_set(&self, object: Expr, index: u32, value: Expr) -> Expr {
        let ty = if object.ty == Type::Unreachable || value.ty == Type::Unreachable {
            Type::Unreachable
        } else {
            Type::None
        };
        Expr::new(
            ExprKind::StructSet {
                object: Box::new(object),
                index,
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn ref_null(&self, heap: HeapTypeId) -> Expr {
        Expr::new(ExprKind::RefNull(heap), Type::Ref(RefType::nullable(heap)))
    }

    pub fn ref_func(&self, name: impl Into<String>) -> Expr {
        Expr::new(ExprKind::RefFunc(name.into()), Type::FuncRef)
    }

    pub fn ref_as_non_null(&self, value: Expr) -> Expr {
        let ty = match value.ty {
            Type::Ref(rt) => Type::Ref(RefType::non_null(rt.heap)),
            other => other,
        };
        Expr::new(ExprKind::RefAsNonNull(Box::new(value)), ty)
    }

    pub fn select(&self, condition: Expr, if_true: Expr, if_false: Expr) -> Expr {
        let ty = self
            .types
            .lub(if_true.ty, if_false.ty)
            .unwrap_or(Type::None);
        Expr::new(
            ExprKind::Select {
                condition: Box::new(condition),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            ty,
        )
    }

    /// An equality comparison specialized by the operands' numeric type.
    ///
    /// Reference operands are not comparable here; callers must only compare
    /// numeric values.
    pub fn binary_eq(&self, left: Expr, right: Expr) -> Expr {
        let op = match left.ty {
            Type::I32 => BinaryOp::EqI32,
            Type::I64 => BinaryOp::EqI64,
            Type::F64 => BinaryOp::EqF64,
            other => panic!("no equality operator for {other:?}"),
        };
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::I32,
        )
    }
}

/// Rewrite `expr` to a `nop` in place, discarding its children.
///
/// Callers are responsible for the children having no observable effects.
pub fn nop_in_place(expr: &mut Expr) {
    expr.kind = ExprKind::Nop;
    expr.ty = Type::None;
}
