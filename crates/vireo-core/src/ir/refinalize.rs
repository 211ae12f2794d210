//! Bottom-up type recomputation.
//!
//! A rewrite can change a subexpression's static type (typically narrowing
//! it), which invalidates the cached types of every enclosing expression.
//! [`ReFinalize`] recomputes types over a whole function body, children
//! first. Leaf reads (`local.get`, `global.get`, `call` results) keep their
//! declared types; everything else is derived from its children.

use super::expr::{Expr, ExprKind};
use super::types::{RefType, Type, TypeStore};

pub struct ReFinalize<'a> {
    types: &'a TypeStore,
}

impl<'a> ReFinalize<'a> {
    pub fn new(types: &'a TypeStore) -> Self {
        Self { types }
    }

    pub fn walk_function_body(&self, body: &mut Expr) {
        self.finalize(body);
    }

    fn finalize(&self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Block { list, .. } | ExprKind::StructNew { operands: list, .. } => {
                for child in list.iter_mut() {
                    self.finalize(child);
                }
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                self.finalize(condition);
                self.finalize(if_true);
                if let Some(if_false) = if_false {
                    self.finalize(if_false);
                }
            }
            ExprKind::Loop { body, .. } => self.finalize(body),
            ExprKind::Br { condition, .. } => {
                if let Some(condition) = condition {
                    self.finalize(condition);
                }
            }
            ExprKind::Return { value } => {
                if let Some(value) = value {
                    self.finalize(value);
                }
            }
            ExprKind::Drop(value)
            | ExprKind::LocalSet { value, .. }
            | ExprKind::GlobalSet { value, .. }
            | ExprKind::RefAsNonNull(value) => self.finalize(value),
            ExprKind::Call { operands, .. } => {
                for operand in operands.iter_mut() {
                    self.finalize(operand);
                }
            }
            ExprKind::StructGet { object, .. } => self.finalize(object),
            ExprKind::StructSet { object, value, .. } => {
                self.finalize(object);
                self.finalize(value);
            }
            ExprKind::Select {
                condition,
                if_true,
                if_false,
            } => {
                self.finalize(if_true);
                self.finalize(if_false);
                self.finalize(condition);
            }
            ExprKind::Binary { left, right, .. } => {
                self.finalize(left);
                self.finalize(right);
            }
            ExprKind::Nop
            | ExprKind::Unreachable
            | ExprKind::Const(_)
            | ExprKind::LocalGet { .. }
            | ExprKind::GlobalGet { .. }
            | ExprKind::RefNull(_)
            | ExprKind::RefFunc(_) => {}
        }

        if let Some(ty) = self.computed_type(expr) {
            expr.ty = ty;
        }
    }

    /// The type of `expr` given its (already finalized) children, or `None`
    /// when the type is intrinsic to the node and must be kept.
    fn computed_type(&self, expr: &Expr) -> Option<Type> {
        let ty = match &expr.kind {
            ExprKind::Nop => Type::None,
            ExprKind::Unreachable => Type::Unreachable,
            ExprKind::Const(literal) => literal.ty(),
            ExprKind::RefNull(heap) => Type::Ref(RefType::nullable(*heap)),
            ExprKind::RefFunc(_) => Type::FuncRef,
            ExprKind::Block { list, .. } => list.last().map_or(Type::None, |last| last.ty),
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                if condition.ty == Type::Unreachable {
                    Type::Unreachable
                } else if let Some(if_false) = if_false {
                    self.types
                        .lub(if_true.ty, if_false.ty)
                        .unwrap_or(Type::None)
                } else {
                    Type::None
                }
            }
            ExprKind::Loop { body, .. } => body.ty,
            ExprKind::Br { condition, .. } => match condition {
                Some(condition) if condition.ty != Type::Unreachable => Type::None,
                _ => Type::Unreachable,
            },
            ExprKind::Return { .. } => Type::Unreachable,
            ExprKind::Drop(value) => Self::unless_unreachable(value, Type::None),
            ExprKind::LocalSet { value, .. } | ExprKind::GlobalSet { value, .. } => {
                Self::unless_unreachable(value, Type::None)
            }
            ExprKind::LocalGet { .. } | ExprKind::GlobalGet { .. } => return None,
            ExprKind::Call { operands, .. } => {
                if operands.iter().any(|op| op.ty == Type::Unreachable) {
                    Type::Unreachable
                } else {
                    return None;
                }
            }
            ExprKind::StructNew { ty, operands } => {
                if operands.iter().any(|op| op.ty == Type::Unreachable) {
                    Type::Unreachable
                } else {
                    Type::Ref(RefType::non_null(*ty))
                }
            }
            ExprKind::StructGet { object, index } => match object.ty {
                Type::Ref(rt) => self.types.field(rt.heap, *index).ty,
                _ => Type::Unreachable,
            },
            ExprKind::StructSet { object, value, .. } => {
                if object.ty == Type::Unreachable || value.ty == Type::Unreachable {
                    Type::Unreachable
                } else {
                    Type::None
                }
            }
            ExprKind::RefAsNonNull(value) => match value.ty {
                Type::Ref(rt) => Type::Ref(RefType::non_null(rt.heap)),
                _ => Type::Unreachable,
            },
            ExprKind::Select {
                condition,
                if_true,
                if_false,
            } => {
                if condition.ty == Type::Unreachable
                    || if_true.ty == Type::Unreachable
                    || if_false.ty == Type::Unreachable
                {
                    Type::Unreachable
                } else {
                    self.types
                        .lub(if_true.ty, if_false.ty)
                        .unwrap_or(Type::None)
                }
            }
            ExprKind::Binary { left, right, .. } => {
                if left.ty == Type::Unreachable || right.ty == Type::Unreachable {
                    Type::Unreachable
                } else {
                    Type::I32
                }
            }
        };
        Some(ty)
    }

    fn unless_unreachable(child: &Expr, ty: Type) -> Type {
        if child.ty == Type::Unreachable {
            Type::Unreachable
        } else {
            ty
        }
    }
}
