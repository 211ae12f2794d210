//! Constant values.

use std::fmt;

use super::types::{HeapTypeId, RefType, Type};

/// An IR constant, tagged by kind. Two literals are equal iff their kind and
/// bits match; floats compare by bit pattern so they can live in hash sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    I32(i32),
    I64(i64),
    /// Stored as raw bits so equality and hashing are total.
    F64(u64),
    /// A null reference to the given heap type.
    Null(HeapTypeId),
    /// A null function reference.
    NullFunc,
    /// A reference to the named function.
    Func(String),
}

impl Literal {
    pub fn f64(value: f64) -> Self {
        Literal::F64(value.to_bits())
    }

    pub fn f64_value(&self) -> Option<f64> {
        match self {
            Literal::F64(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// The integer payload, when this is an integer literal.
    pub fn integer(&self) -> Option<i64> {
        match self {
            Literal::I32(v) => Some(i64::from(*v)),
            Literal::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// The static type of this literal.
    pub fn ty(&self) -> Type {
        match self {
            Literal::I32(_) => Type::I32,
            Literal::I64(_) => Type::I64,
            Literal::F64(_) => Type::F64,
            Literal::Null(heap) => Type::Ref(RefType::nullable(*heap)),
            Literal::NullFunc | Literal::Func(_) => Type::FuncRef,
        }
    }

    /// The default value a constructor writes into an omitted field.
    pub fn zero(ty: Type) -> Option<Literal> {
        match ty {
            Type::I32 => Some(Literal::I32(0)),
            Type::I64 => Some(Literal::I64(0)),
            Type::F64 => Some(Literal::f64(0.0)),
            Type::Ref(rt) => Some(Literal::Null(rt.heap)),
            Type::FuncRef => Some(Literal::NullFunc),
            Type::None | Type::Unreachable => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::I32(v) => write!(f, "i32:{v}"),
            Literal::I64(v) => write!(f, "i64:{v}"),
            Literal::F64(bits) => write!(f, "f64:{}", f64::from_bits(*bits)),
            Literal::Null(heap) => write!(f, "null:{}", heap.0),
            Literal::NullFunc => write!(f, "null:func"),
            Literal::Func(name) => write!(f, "func:{name}"),
        }
    }
}
