//! # Vireo optimization passes
//!
//! Whole-module optimizations over the Vireo IR. Two passes live here:
//!
//! - **[`constant_field_propagation`]** - discovers struct fields whose
//!   writes, across the whole module and its type hierarchy, produce a
//!   bounded set of constants, and rewrites reads of them.
//! - **[`once_reduction`]** - discovers functions gated to run at most once
//!   and removes calls and guard stores that are provably redundant.
//!
//! Both assume a closed world and are registered with the pass driver from
//! `vireo-core`.

pub mod constant_field_propagation;
pub mod field_summary;
pub mod once_reduction;
pub mod possible_values;

pub use constant_field_propagation::ConstantFieldPropagation;
pub use once_reduction::OnceReduction;
pub use possible_values::PossibleValues;
