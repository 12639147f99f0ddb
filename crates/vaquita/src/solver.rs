//! The two solver front ends.
//!
//! [`Solver`] handles a static problem: a single left-to-right merge sweep in
//! topological order reaches feasibility, then blocks are split at negative
//! Lagrange multipliers until locally optimal. [`IncSolver`] re-optimises
//! after desired positions change, driving a most-violated-constraint
//! worklist instead of the one-shot sweep and alternating with block splits
//! until the objective stops improving.

use crate::block::is_active_directed_path_between;
use crate::blocks::Blocks;
use crate::constraint::{Constraint, ConstraintId};
use crate::error::{Error, Result};
use crate::variable::{Variable, VariableId};

/// Slack above this is treated as satisfied; the band absorbs floating-point
/// noise around zero without hiding real violations.
const ZERO_UPPER_BOUND: f64 = -1e-7;
/// Multipliers below this trigger an incremental block split.
const LAGRANGIAN_TOLERANCE: f64 = -1e-4;
/// Incremental solve iterates until the objective changes by less than this.
const COST_TOLERANCE: f64 = 1e-4;
/// In-block splits per satisfy pass before giving up on a thrashing cycle.
const SPLIT_LIMIT: usize = 10_000;
/// Backstop for the refinement scan; termination is otherwise guaranteed by
/// the strictly decreasing objective.
const MAX_REFINE_PASSES: usize = 10_000;

/// Solves a static separation-constraint problem.
#[derive(Debug)]
pub struct Solver {
    vars: Vec<Variable>,
    cons: Vec<Constraint>,
    blocks: Blocks,
}

impl Solver {
    pub fn new(vars: Vec<Variable>, cons: Vec<Constraint>) -> Result<Self> {
        let (vars, cons, blocks) = init_state(vars, cons)?;
        Ok(Self { vars, cons, blocks })
    }

    /// Brings every constraint to non-negative slack with a single merge
    /// sweep in topological order. Fails if the input is infeasible, e.g.
    /// contains a constraint cycle.
    pub fn satisfy(&mut self) -> Result<()> {
        let order = self.blocks.total_order(&mut self.vars, &self.cons);
        for v in order {
            let b = self.vars[v.0].block;
            if !self.blocks.block(b).deleted {
                self.blocks.merge_left(b, &mut self.vars, &mut self.cons);
            }
        }
        self.blocks.cleanup();
        check_satisfied(&self.vars, &self.cons, &self.blocks)
    }

    /// Splits blocks at active constraints with negative Lagrange multipliers
    /// until none remain. A split invalidates the other blocks' boundary
    /// queues, so every split restarts the scan.
    pub fn refine(&mut self) -> Result<()> {
        let mut solved = false;
        let mut passes = 0;
        while !solved && passes < MAX_REFINE_PASSES {
            passes += 1;
            solved = true;
            for b in self.blocks.live_ids() {
                self.blocks.set_up_in_constraints(b, &self.vars, &mut self.cons);
                self.blocks.set_up_out_constraints(b, &self.vars, &mut self.cons);
            }
            for b in self.blocks.live_ids() {
                if self.blocks.block(b).deleted {
                    continue;
                }
                let min = self
                    .blocks
                    .block(b)
                    .find_min_lm(b, &self.vars, &mut self.cons);
                if let Some(cid) = min {
                    if self.cons[cid.0].lm < 0.0 {
                        self.blocks.split(b, cid, &mut self.vars, &mut self.cons);
                        self.blocks.cleanup();
                        solved = false;
                        break;
                    }
                }
            }
        }
        check_satisfied(&self.vars, &self.cons, &self.blocks)
    }

    pub fn solve(&mut self) -> Result<()> {
        self.satisfy()?;
        self.refine()
    }

    pub fn position(&self, v: VariableId) -> f64 {
        self.blocks.position(&self.vars, v)
    }

    pub fn positions(&self) -> Vec<f64> {
        (0..self.vars.len())
            .map(|i| self.position(VariableId(i)))
            .collect()
    }

    pub fn variable(&self, v: VariableId) -> &Variable {
        &self.vars[v.0]
    }

    pub fn constraint(&self, c: ConstraintId) -> &Constraint {
        &self.cons[c.0]
    }

    /// Weighted squared distance of all variables from their desired
    /// positions.
    pub fn cost(&self) -> f64 {
        self.blocks.cost(&self.vars)
    }

    /// Whether the constraint graph contains a directed cycle. Cyclic inputs
    /// cannot generally be satisfied; callers can reject them up front
    /// instead of waiting for [`satisfy`](Self::satisfy) to fail.
    pub fn constraint_graph_is_cyclic(&self) -> bool {
        constraint_graph_is_cyclic(&self.vars, &self.cons)
    }
}

/// Re-optimises a problem incrementally.
///
/// After construction (or after the caller moves desired positions with
/// [`set_desired`](Self::set_desired)), [`solve`](Self::solve) alternates
/// merges across the most violated constraints with splits at negative
/// multipliers until the objective stabilises. Unlike [`Solver`], a cycle of
/// active constraints is not fatal: the constraint closing it is relaxed to
/// its current slack and flagged unsatisfiable.
pub struct IncSolver {
    vars: Vec<Variable>,
    cons: Vec<Constraint>,
    blocks: Blocks,
    inactive: Vec<ConstraintId>,
}

impl IncSolver {
    pub fn new(vars: Vec<Variable>, cons: Vec<Constraint>) -> Result<Self> {
        let (vars, mut cons, blocks) = init_state(vars, cons)?;
        for c in cons.iter_mut() {
            c.active = false;
        }
        let inactive = (0..cons.len()).map(ConstraintId).collect();
        Ok(Self {
            vars,
            cons,
            blocks,
            inactive,
        })
    }

    /// Restores feasibility by repeatedly activating the most violated
    /// inactive constraint (equalities first, regardless of slack). Returns
    /// whether any constraint ended up active.
    pub fn satisfy(&mut self) -> Result<bool> {
        let mut split_count = 0usize;
        while let Some(cid) = self.most_violated() {
            let (equality, active, left, right) = {
                let c = &self.cons[cid.0];
                (c.equality, c.active, c.left, c.right)
            };
            let slack = self.blocks.slack(&self.vars, &self.cons[cid.0]);
            if !(equality || (slack < ZERO_UPPER_BOUND && !active)) {
                break;
            }
            debug_assert!(!active);
            let lb = self.vars[left.0].block;
            let rb = self.vars[right.0].block;
            if lb != rb {
                self.blocks.merge_over(cid, &mut self.vars, &mut self.cons);
            } else if is_active_directed_path_between(lb, right, left, &self.vars, &self.cons) {
                // Activating this constraint would close a cycle. Relax its
                // gap to the current slack and record the sacrifice; the
                // other constraints keep their specified gaps.
                self.relax(cid, slack);
            } else {
                split_count += 1;
                if split_count > SPLIT_LIMIT {
                    return Err(Error::Cycle);
                }
                match self
                    .blocks
                    .split_between(lb, left, right, &mut self.vars, &mut self.cons)
                {
                    Some((freed, _l, _r)) => {
                        debug_assert!(!self.cons[freed.0].active);
                        self.inactive.push(freed);
                        let slack = self.blocks.slack(&self.vars, &self.cons[cid.0]);
                        if slack >= 0.0 {
                            // the split alone satisfied it
                            self.inactive.push(cid);
                        } else {
                            self.blocks.merge_over(cid, &mut self.vars, &mut self.cons);
                        }
                    }
                    None => {
                        // no usable split point on the path (equalities only)
                        self.relax(cid, slack);
                    }
                }
            }
            self.blocks.cleanup();
        }
        self.blocks.cleanup();
        let any_active = self.cons.iter().any(|c| c.active);
        check_satisfied(&self.vars, &self.cons, &self.blocks)?;
        Ok(any_active)
    }

    /// Moves every block to the weighted average of its members' current
    /// desired positions. Call after changing desired positions.
    pub fn move_blocks(&mut self) {
        for b in self.blocks.live_ids() {
            if !self.blocks.block(b).deleted {
                self.blocks.block_mut(b).update_weighted_position(&self.vars);
            }
        }
    }

    /// After moving blocks, splits each block at its most negative
    /// multiplier, if any; at most one split per block per call. Freed
    /// constraints return to the inactive worklist.
    pub fn split_blocks(&mut self) {
        self.move_blocks();
        for b in self.blocks.live_ids() {
            if self.blocks.block(b).deleted {
                continue;
            }
            let min = self
                .blocks
                .block(b)
                .find_min_lm(b, &self.vars, &mut self.cons);
            let Some(cid) = min else {
                continue;
            };
            if self.cons[cid.0].lm < LAGRANGIAN_TOLERANCE {
                debug_assert!(!self.cons[cid.0].equality);
                let (l, r) = self
                    .blocks
                    .split_block(b, cid, &mut self.vars, &mut self.cons);
                self.blocks.block_mut(l).update_weighted_position(&self.vars);
                self.blocks.block_mut(r).update_weighted_position(&self.vars);
                self.blocks.remove_block(b);
                debug_assert!(!self.cons[cid.0].active);
                self.inactive.push(cid);
            }
        }
        self.blocks.cleanup();
    }

    /// Alternates splits and satisfaction passes until the objective changes
    /// by less than a fixed tolerance. Returns whether any constraint is
    /// active in the final state.
    pub fn solve(&mut self) -> Result<bool> {
        self.satisfy()?;
        let mut last_cost = self.blocks.cost(&self.vars);
        loop {
            self.split_blocks();
            let active = self.satisfy()?;
            let cost = self.blocks.cost(&self.vars);
            tracing::debug!(cost, "incremental solve pass");
            if (last_cost - cost).abs() < COST_TOLERANCE {
                return Ok(active);
            }
            last_cost = cost;
        }
    }

    pub fn set_desired(&mut self, v: VariableId, desired: f64) {
        self.vars[v.0].desired = desired;
    }

    pub fn position(&self, v: VariableId) -> f64 {
        self.blocks.position(&self.vars, v)
    }

    pub fn positions(&self) -> Vec<f64> {
        (0..self.vars.len())
            .map(|i| self.position(VariableId(i)))
            .collect()
    }

    pub fn variable(&self, v: VariableId) -> &Variable {
        &self.vars[v.0]
    }

    pub fn constraint(&self, c: ConstraintId) -> &Constraint {
        &self.cons[c.0]
    }

    pub fn cost(&self) -> f64 {
        self.blocks.cost(&self.vars)
    }

    pub fn constraint_graph_is_cyclic(&self) -> bool {
        constraint_graph_is_cyclic(&self.vars, &self.cons)
    }

    fn relax(&mut self, cid: ConstraintId, slack: f64) {
        let c = &mut self.cons[cid.0];
        c.gap = slack;
        c.unsatisfiable = true;
        tracing::debug!(
            constraint = cid.0,
            gap = c.gap,
            "relaxing constraint to break a cycle"
        );
    }

    /// Linear scan for the worklist entry with the smallest slack; any
    /// equality constraint is selected immediately. The selected entry is
    /// removed from the worklist if it is actually going to be processed.
    fn most_violated(&mut self) -> Option<ConstraintId> {
        let mut min_slack = f64::INFINITY;
        let mut selected: Option<(usize, ConstraintId)> = None;
        for (i, &cid) in self.inactive.iter().enumerate() {
            let c = &self.cons[cid.0];
            let slack = self.blocks.slack(&self.vars, c);
            if c.equality || slack < min_slack {
                min_slack = slack;
                selected = Some((i, cid));
                if c.equality {
                    break;
                }
            }
        }
        let (i, cid) = selected?;
        let c = &self.cons[cid.0];
        if (min_slack < ZERO_UPPER_BOUND && !c.active) || c.equality {
            self.inactive.swap_remove(i);
        }
        Some(cid)
    }
}

fn init_state(
    mut vars: Vec<Variable>,
    cons: Vec<Constraint>,
) -> Result<(Vec<Variable>, Vec<Constraint>, Blocks)> {
    for (i, v) in vars.iter().enumerate() {
        if !(v.weight > 0.0 && v.weight.is_finite()) {
            return Err(Error::InvalidWeight {
                index: i,
                weight: v.weight,
            });
        }
    }
    for (i, c) in cons.iter().enumerate() {
        for end in [c.left, c.right] {
            if end.0 >= vars.len() {
                return Err(Error::UnknownVariable {
                    constraint: i,
                    variable: end.0,
                });
            }
        }
    }
    for v in vars.iter_mut() {
        v.incoming.clear();
        v.outgoing.clear();
    }
    for (i, c) in cons.iter().enumerate() {
        vars[c.left.0].outgoing.push(ConstraintId(i));
        vars[c.right.0].incoming.push(ConstraintId(i));
    }
    let blocks = Blocks::new(&mut vars);
    Ok((vars, cons, blocks))
}

fn check_satisfied(vars: &[Variable], cons: &[Constraint], blocks: &Blocks) -> Result<()> {
    for (i, c) in cons.iter().enumerate() {
        let slack = blocks.slack(vars, c);
        if slack < ZERO_UPPER_BOUND {
            return Err(Error::UnsatisfiedConstraint {
                constraint: ConstraintId(i),
                slack,
            });
        }
    }
    Ok(())
}

// Kahn's algorithm over the constraint digraph.
fn constraint_graph_is_cyclic(vars: &[Variable], cons: &[Constraint]) -> bool {
    let mut indegree: Vec<usize> = vars.iter().map(|v| v.incoming.len()).collect();
    let mut queue: Vec<usize> = (0..vars.len()).filter(|&i| indegree[i] == 0).collect();
    let mut seen = 0usize;
    while let Some(i) = queue.pop() {
        seen += 1;
        for &cid in &vars[i].outgoing {
            let j = cons[cid.0].right.0;
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push(j);
            }
        }
    }
    seen != vars.len()
}
