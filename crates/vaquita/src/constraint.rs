use std::fmt;

use crate::variable::VariableId;

/// Handle to a [`Constraint`] owned by a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub(crate) usize);

impl ConstraintId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A separation `left + gap <= right`, or `left + gap = right` for
/// equalities.
///
/// `active`, `lm` and `time_stamp` are solver-owned working state: a
/// constraint is active while it is enforced as a tight equality inside a
/// block's spanning tree, and `lm` is the Lagrange multiplier computed for it
/// during refinement.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub(crate) left: VariableId,
    pub(crate) right: VariableId,
    pub(crate) gap: f64,
    pub(crate) lm: f64,
    pub(crate) active: bool,
    pub(crate) equality: bool,
    pub(crate) unsatisfiable: bool,
    pub(crate) time_stamp: u64,
}

impl Constraint {
    pub fn new(left: VariableId, right: VariableId, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            lm: 0.0,
            active: false,
            equality: false,
            unsatisfiable: false,
            time_stamp: 0,
        }
    }

    pub fn equality(left: VariableId, right: VariableId, gap: f64) -> Self {
        Self {
            equality: true,
            ..Self::new(left, right, gap)
        }
    }

    pub fn left(&self) -> VariableId {
        self.left
    }

    pub fn right(&self) -> VariableId {
        self.right
    }

    /// The minimum required separation. Mutated by the incremental solver
    /// when it has to relax the constraint to break a cycle; see
    /// [`is_unsatisfiable`](Self::is_unsatisfiable).
    pub fn gap(&self) -> f64 {
        self.gap
    }

    pub fn is_equality(&self) -> bool {
        self.equality
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True if the incremental solver relaxed this constraint's gap because
    /// enforcing it would have closed a cycle of active constraints. The
    /// remaining constraints still hold as specified, but this one holds only
    /// at its relaxed gap.
    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }

    /// The Lagrange multiplier from the most recent refinement pass. Negative
    /// values mean relaxing the constraint would reduce the objective.
    pub fn lagrange_multiplier(&self) -> f64 {
        self.lm
    }
}
