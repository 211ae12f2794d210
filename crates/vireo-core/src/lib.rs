//! # Vireo core
//!
//! The IR model and infrastructure of the Vireo optimizer: value types and
//! the nominal heap-type hierarchy, literals, expression trees with post-order
//! traversal, the expression builder, bottom-up re-finalization, CFG
//! construction with dominator trees, and the pass driver with its parallel
//! per-function scheduling.
//!
//! ## Modules
//!
//! - **[`ir`]** - types, literals, expressions, modules, builder, re-finalize
//! - **[`cfg`]** - basic blocks, interesting-expression slots, dominators
//! - **[`pass`]** - pass trait, driver options, per-function parallelism

pub mod cfg;
pub mod ir;
pub mod pass;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cfg::{Action, Cfg, DomTree};
    pub use crate::ir::{
        nop_in_place, walk, BinaryOp, Builder, Expr, ExprKind, Field, Function, Global,
        HeapTypeId, Literal, Module, ReFinalize, RefType, StructType, Type, TypeStore,
        TypeSystem, Visitor,
    };
    pub use crate::pass::{map_functions_parallel, Pass, PassOptions, PassRunner};
}

pub use ir::{Expr, ExprKind, Function, Global, Literal, Module, Type};
pub use pass::{Pass, PassOptions, PassRunner};
