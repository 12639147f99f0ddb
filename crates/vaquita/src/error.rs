use crate::constraint::ConstraintId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A constraint is still violated after a phase that guarantees
    /// feasibility. Either the input is infeasible (e.g. a cycle whose gaps
    /// sum to a positive separation) or block bookkeeping went wrong.
    #[error("unsatisfied constraint {constraint} (slack {slack})")]
    UnsatisfiedConstraint { constraint: ConstraintId, slack: f64 },

    /// The incremental satisfier split blocks implausibly often, which means
    /// the cycle-relaxation heuristic is thrashing instead of converging.
    #[error("cycle detected while satisfying separation constraints")]
    Cycle,

    #[error("variable {index} has non-positive or non-finite weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("constraint {constraint} references unknown variable index {variable}")]
    UnknownVariable { constraint: usize, variable: usize },
}
