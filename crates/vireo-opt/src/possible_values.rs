//! A bounded join-semilattice over constant values.
//!
//! Tracks what values a particular place (a struct field, across the whole
//! module) may hold: nothing observed yet, a small set of known constants,
//! or "unknown" once anything non-constant is seen or the set outgrows its
//! bound.

use std::fmt;

use smallvec::SmallVec;
use vireo_core::ir::Literal;

/// The maximum number of distinct constants tolerated before a value becomes
/// unknown. Two is enough to fuel a select between the possibilities.
pub const MAX_CONSTANT_VALUES: usize = 2;

/// Lattice states, bottom to top: unnoted, constants (at most
/// [`MAX_CONSTANT_VALUES`] of them), unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PossibleValues {
    /// Whether anything has been observed. When set with an empty value
    /// list, the state is unknown.
    noted: bool,
    values: SmallVec<[Literal; MAX_CONSTANT_VALUES]>,
}

impl PossibleValues {
    /// Note one observed value. Returns whether the state changed.
    pub fn note(&mut self, value: Literal) -> bool {
        if !self.noted {
            self.values.push(value);
            self.noted = true;
            return true;
        }

        // Unknown absorbs everything.
        if !self.is_constant() {
            return false;
        }

        if self.values.contains(&value) {
            return false;
        }

        if self.values.len() == MAX_CONSTANT_VALUES {
            self.note_unknown();
        } else {
            self.values.push(value);
        }
        true
    }

    /// Note that the value here can be anything.
    pub fn note_unknown(&mut self) {
        self.values.clear();
        self.noted = true;
    }

    /// Lattice join with `other`, as if every observation fed into `other`
    /// had been fed into `self`. Returns whether the state changed.
    pub fn combine(&mut self, other: &PossibleValues) -> bool {
        if !other.noted {
            return false;
        }
        if !self.noted {
            *self = other.clone();
            return true;
        }
        if !self.is_constant() {
            return false;
        }
        if !other.is_constant() {
            self.note_unknown();
            return true;
        }

        let mut changed = false;
        for value in &other.values {
            if self.note(value.clone()) {
                changed = true;
            }
            if !self.is_constant() {
                break;
            }
        }
        changed
    }

    /// Whether the state is a non-empty set of known constants.
    pub fn is_constant(&self) -> bool {
        self.noted && !self.values.is_empty()
    }

    /// Whether anything has been observed at all.
    pub fn has_noted(&self) -> bool {
        self.noted
    }

    /// The known constants. Only meaningful when [`is_constant`] holds.
    ///
    /// [`is_constant`]: Self::is_constant
    pub fn values(&self) -> &[Literal] {
        debug_assert!(self.is_constant());
        &self.values
    }
}

impl fmt::Display for PossibleValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if !self.has_noted() {
            write!(f, "unwritten")?;
        } else if !self.is_constant() {
            write!(f, "unknown")?;
        } else {
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{value}")?;
            }
        }
        write!(f, "]")
    }
}
