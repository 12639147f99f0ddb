//! Blocks: maximal groups of variables rigidly linked by active constraints.
//!
//! A block stores its members' ids plus aggregate weight and weighted desired
//! position, so its optimal position is always `wposn / weight`. Two lazy
//! priority queues hold the constraints crossing the block boundary; entries
//! go stale when the block at the other end changes, so the queues are purged
//! by time stamp before their minimum is trusted.

use crate::blocks::{BlockId, Blocks};
use crate::constraint::{Constraint, ConstraintId};
use crate::data::heap::PairingHeap;
use crate::variable::{Variable, VariableId};

#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) vars: Vec<VariableId>,
    pub(crate) posn: f64,
    pub(crate) weight: f64,
    pub(crate) wposn: f64,
    pub(crate) deleted: bool,
    pub(crate) time_stamp: u64,
    pub(crate) in_heap: Option<PairingHeap<ConstraintId>>,
    pub(crate) out_heap: Option<PairingHeap<ConstraintId>>,
}

impl Block {
    pub(crate) fn empty() -> Self {
        Self {
            vars: Vec::new(),
            posn: 0.0,
            weight: 0.0,
            wposn: 0.0,
            deleted: false,
            time_stamp: 0,
            in_heap: None,
            out_heap: None,
        }
    }

    pub(crate) fn add_variable(&mut self, self_id: BlockId, v: VariableId, vars: &mut [Variable]) {
        let var = &mut vars[v.0];
        var.block = self_id;
        self.vars.push(v);
        self.weight += var.weight;
        self.wposn += var.weight * (var.desired - var.offset);
        self.posn = self.wposn / self.weight;
    }

    /// Recomputes the aggregates from the members' current desired positions.
    /// Needed after the caller moves desired positions under the block.
    pub(crate) fn update_weighted_position(&mut self, vars: &[Variable]) {
        self.weight = 0.0;
        self.wposn = 0.0;
        for &v in &self.vars {
            let var = &vars[v.0];
            self.weight += var.weight;
            self.wposn += var.weight * (var.desired - var.offset);
        }
        self.posn = self.wposn / self.weight;
    }

    /// Weighted squared distance of the members from their desired positions.
    pub(crate) fn cost(&self, vars: &[Variable]) -> f64 {
        self.vars
            .iter()
            .map(|&v| {
                let var = &vars[v.0];
                let diff = self.posn + var.offset - var.desired;
                var.weight * diff * diff
            })
            .sum()
    }

    /// The active internal constraint whose Lagrange multiplier is most
    /// negative, i.e. the one whose removal would reduce the objective most.
    /// Equality constraints are never candidates.
    pub(crate) fn find_min_lm(
        &self,
        self_id: BlockId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) -> Option<ConstraintId> {
        let root = *self.vars.first()?;
        self.propagate_multipliers(self_id, root, vars, cons);
        let mut min: Option<ConstraintId> = None;
        for (i, c) in cons.iter().enumerate() {
            if c.active && !c.equality && vars[c.left.0].block == self_id {
                let better = match min {
                    Some(m) => c.lm < cons[m.0].lm,
                    None => true,
                };
                if better {
                    min = Some(ConstraintId(i));
                }
            }
        }
        min
    }

    /// As [`find_min_lm`](Self::find_min_lm), but restricted to the tree path
    /// between `lv` and `rv`, considering only constraints traversed left to
    /// right so splitting cannot introduce a new violation. Returns `None`
    /// when the path has no usable split point (all equalities, or reachable
    /// only against constraint direction).
    pub(crate) fn find_min_lm_between(
        &self,
        self_id: BlockId,
        lv: VariableId,
        rv: VariableId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) -> Option<ConstraintId> {
        let root = *self.vars.first()?;
        self.propagate_multipliers(self_id, root, vars, cons);
        let mut min = None;
        split_path(rv, lv, None, &mut min, self_id, vars, cons);
        min
    }

    // Computes df/dv over the active spanning tree and stores each tree
    // edge's Lagrange multiplier: for a constraint c, lm is the signed sum of
    // weight * (position - desired) over the subtree on c's far side. The
    // tree is walked iteratively (depth equals tree height, which is caller
    // controlled) and accumulated child-first in reverse visit order.
    fn propagate_multipliers(
        &self,
        self_id: BlockId,
        root: VariableId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) {
        let order = active_tree_order(self_id, root, vars, cons);
        let mut acc = vec![0.0; vars.len()];
        for &(v, via) in order.iter().rev() {
            let var = &vars[v.0];
            let dfdv = var.weight * (self.posn + var.offset - var.desired) + acc[v.0];
            if let Some((parent, cid, v_is_right)) = via {
                cons[cid.0].lm = if v_is_right { dfdv } else { -dfdv };
                acc[parent.0] += dfdv;
            }
        }
    }
}

// Pre-order walk of the active-constraint tree from `root`, staying inside
// `block`. Each entry records how the variable was reached: its tree parent,
// the connecting constraint, and whether the variable is the constraint's
// right end.
type TreeStep = (VariableId, Option<(VariableId, ConstraintId, bool)>);

fn active_tree_order(
    block: BlockId,
    root: VariableId,
    vars: &[Variable],
    cons: &[Constraint],
) -> Vec<TreeStep> {
    let mut order: Vec<TreeStep> = Vec::new();
    let mut stack: Vec<TreeStep> = vec![(root, None)];
    while let Some((v, via)) = stack.pop() {
        order.push((v, via));
        let parent = via.map(|(p, _, _)| p);
        for &cid in &vars[v.0].outgoing {
            let c = &cons[cid.0];
            if c.active && vars[c.right.0].block == block && Some(c.right) != parent {
                stack.push((c.right, Some((v, cid, true))));
            }
        }
        for &cid in &vars[v.0].incoming {
            let c = &cons[cid.0];
            if c.active && vars[c.left.0].block == block && Some(c.left) != parent {
                stack.push((c.left, Some((v, cid, false))));
            }
        }
    }
    order
}

// Walks the active tree from `v` looking for `r`, without backtracking over
// `u`. While unwinding, the minimum-multiplier constraint among those
// traversed left to right is recorded in `m`; right-to-left traversals are
// never split candidates, and neither are equalities.
fn split_path(
    r: VariableId,
    v: VariableId,
    u: Option<VariableId>,
    m: &mut Option<ConstraintId>,
    block: BlockId,
    vars: &[Variable],
    cons: &[Constraint],
) -> bool {
    for &cid in &vars[v.0].incoming {
        let c = &cons[cid.0];
        if c.active && vars[c.left.0].block == block && Some(c.left) != u {
            if c.left == r {
                return true;
            }
            if split_path(r, c.left, Some(v), m, block, vars, cons) {
                return true;
            }
        }
    }
    for &cid in &vars[v.0].outgoing {
        let c = &cons[cid.0];
        if c.active && vars[c.right.0].block == block && Some(c.right) != u {
            if c.right == r {
                if !c.equality {
                    *m = Some(cid);
                }
                return true;
            }
            if split_path(r, c.right, Some(v), m, block, vars, cons) {
                let better = match *m {
                    Some(mid) => c.lm < cons[mid.0].lm,
                    None => true,
                };
                if !c.equality && better {
                    *m = Some(cid);
                }
                return true;
            }
        }
    }
    false
}

/// Is there a directed path of active constraints from `u` to `v` inside
/// `block`? Activating a violated constraint from `v` back to `u` would then
/// close a cycle.
pub(crate) fn is_active_directed_path_between(
    block: BlockId,
    u: VariableId,
    v: VariableId,
    vars: &[Variable],
    cons: &[Constraint],
) -> bool {
    if u == v {
        return true;
    }
    for &cid in &vars[u.0].outgoing {
        let c = &cons[cid.0];
        if c.active
            && vars[c.right.0].block == block
            && is_active_directed_path_between(block, c.right, v, vars, cons)
        {
            return true;
        }
    }
    false
}

// Block-level operations that touch more than one arena slot live on Blocks.
impl Blocks {
    /// Rebuilds `b`'s queue of incoming boundary constraints, stamping every
    /// constraint of its members with the current time.
    pub(crate) fn set_up_in_constraints(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) {
        let mut heap = PairingHeap::new();
        for vi in 0..self.arena[b.0].vars.len() {
            let v = self.arena[b.0].vars[vi];
            for ci in 0..vars[v.0].incoming.len() {
                let cid = vars[v.0].incoming[ci];
                cons[cid.0].time_stamp = self.time_ctr;
                if vars[cons[cid.0].left.0].block != b {
                    heap.push(cid, &mut |x, y| self.compare_boundary(vars, cons, *x, *y));
                }
            }
        }
        self.arena[b.0].in_heap = Some(heap);
    }

    pub(crate) fn set_up_out_constraints(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) {
        let mut heap = PairingHeap::new();
        for vi in 0..self.arena[b.0].vars.len() {
            let v = self.arena[b.0].vars[vi];
            for ci in 0..vars[v.0].outgoing.len() {
                let cid = vars[v.0].outgoing[ci];
                cons[cid.0].time_stamp = self.time_ctr;
                if vars[cons[cid.0].right.0].block != b {
                    heap.push(cid, &mut |x, y| self.compare_boundary(vars, cons, *x, *y));
                }
            }
        }
        self.arena[b.0].out_heap = Some(heap);
    }

    /// The most violated incoming boundary constraint of `b`, after purging
    /// entries that became internal and refreshing entries whose left block
    /// has changed since they were queued.
    pub(crate) fn find_min_in_constraint(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) -> Option<ConstraintId> {
        let mut heap = self.arena[b.0].in_heap.take().unwrap_or_default();
        let mut out_of_date: Vec<ConstraintId> = Vec::new();
        while let Some(&top) = heap.peek() {
            let (lb, rb, stamp) = {
                let c = &cons[top.0];
                (vars[c.left.0].block, vars[c.right.0].block, c.time_stamp)
            };
            if lb == rb {
                // merged into the same block, no longer a boundary
                heap.pop(&mut |x, y| self.compare_boundary(vars, cons, *x, *y));
            } else if stamp < self.arena[lb.0].time_stamp {
                // left block moved since this entry was queued
                heap.pop(&mut |x, y| self.compare_boundary(vars, cons, *x, *y));
                out_of_date.push(top);
            } else {
                break;
            }
        }
        for cid in out_of_date {
            cons[cid.0].time_stamp = self.time_ctr;
            heap.push(cid, &mut |x, y| self.compare_boundary(vars, cons, *x, *y));
        }
        let min = heap.peek().copied();
        self.arena[b.0].in_heap = Some(heap);
        min
    }

    pub(crate) fn find_min_out_constraint(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &[Constraint],
    ) -> Option<ConstraintId> {
        let mut heap = self.arena[b.0].out_heap.take().unwrap_or_default();
        while let Some(&top) = heap.peek() {
            let internal = {
                let c = &cons[top.0];
                vars[c.left.0].block == vars[c.right.0].block
            };
            if internal {
                heap.pop(&mut |x, y| self.compare_boundary(vars, cons, *x, *y));
            } else {
                break;
            }
        }
        let min = heap.peek().copied();
        self.arena[b.0].out_heap = Some(heap);
        min
    }

    pub(crate) fn delete_min_in_constraint(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &[Constraint],
    ) {
        let mut heap = self.arena[b.0].in_heap.take().unwrap_or_default();
        heap.pop(&mut |x, y| self.compare_boundary(vars, cons, *x, *y));
        self.arena[b.0].in_heap = Some(heap);
    }

    pub(crate) fn delete_min_out_constraint(
        &mut self,
        b: BlockId,
        vars: &[Variable],
        cons: &[Constraint],
    ) {
        let mut heap = self.arena[b.0].out_heap.take().unwrap_or_default();
        heap.pop(&mut |x, y| self.compare_boundary(vars, cons, *x, *y));
        self.arena[b.0].out_heap = Some(heap);
    }

    /// Activates `cid` and folds `src` into `host`, shifting every absorbed
    /// variable's offset by `dist` (the amount that zeroes the constraint's
    /// slack once both ends share a frame).
    pub(crate) fn merge_blocks(
        &mut self,
        host: BlockId,
        src: BlockId,
        cid: ConstraintId,
        dist: f64,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) {
        tracing::trace!(
            host = host.0,
            absorbed = src.0,
            constraint = cid.0,
            dist,
            "merging blocks across constraint"
        );
        cons[cid.0].active = true;
        let moved = std::mem::take(&mut self.arena[src.0].vars);
        for &v in &moved {
            vars[v.0].offset += dist;
            self.arena[host.0].add_variable(host, v, vars);
        }
        self.arena[src.0].deleted = true;
    }

    /// Merges the two blocks straddling `cid`, re-homing the smaller side.
    /// Returns the surviving block. Boundary queues are not maintained; the
    /// incremental solver rebuilds them on demand.
    pub(crate) fn merge_over(
        &mut self,
        cid: ConstraintId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) -> BlockId {
        let (l, r, dist) = {
            let c = &cons[cid.0];
            let dist = vars[c.right.0].offset - vars[c.left.0].offset - c.gap;
            (vars[c.left.0].block, vars[c.right.0].block, dist)
        };
        if self.arena[l.0].vars.len() < self.arena[r.0].vars.len() {
            self.merge_blocks(r, l, cid, dist, vars, cons);
            r
        } else {
            self.merge_blocks(l, r, cid, -dist, vars, cons);
            l
        }
    }

    /// Merges `src`'s in-queue into `host`'s after purging both tops, so
    /// entries that became internal during the block merge are not carried.
    pub(crate) fn merge_in(
        &mut self,
        host: BlockId,
        src: BlockId,
        vars: &[Variable],
        cons: &mut [Constraint],
    ) {
        self.find_min_in_constraint(host, vars, cons);
        self.find_min_in_constraint(src, vars, cons);
        let src_heap = self.arena[src.0].in_heap.take().unwrap_or_default();
        let mut host_heap = self.arena[host.0].in_heap.take().unwrap_or_default();
        host_heap.merge(src_heap, &mut |x, y| self.compare_boundary(vars, cons, *x, *y));
        self.arena[host.0].in_heap = Some(host_heap);
    }

    pub(crate) fn merge_out(
        &mut self,
        host: BlockId,
        src: BlockId,
        vars: &[Variable],
        cons: &[Constraint],
    ) {
        self.find_min_out_constraint(host, vars, cons);
        self.find_min_out_constraint(src, vars, cons);
        let src_heap = self.arena[src.0].out_heap.take().unwrap_or_default();
        let mut host_heap = self.arena[host.0].out_heap.take().unwrap_or_default();
        host_heap.merge(src_heap, &mut |x, y| self.compare_boundary(vars, cons, *x, *y));
        self.arena[host.0].out_heap = Some(host_heap);
    }

    /// Deactivates `cid` and partitions `b`'s members into two new blocks by
    /// walking the two active subtrees from the constraint's endpoints. The
    /// old block is left for the caller to retire.
    pub(crate) fn split_block(
        &mut self,
        b: BlockId,
        cid: ConstraintId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) -> (BlockId, BlockId) {
        tracing::trace!(block = b.0, constraint = cid.0, "splitting block across constraint");
        cons[cid.0].active = false;
        let (cl, cr) = (cons[cid.0].left, cons[cid.0].right);
        let l = self.alloc_block();
        self.populate_split_block(l, b, cl, cr, vars, cons);
        let r = self.alloc_block();
        self.populate_split_block(r, b, cr, cl, vars, cons);
        (l, r)
    }

    // Moves the active subtree reachable from `v` (not crossing back over
    // `u`) out of `source` into `new_block`.
    fn populate_split_block(
        &mut self,
        new_block: BlockId,
        source: BlockId,
        v: VariableId,
        u: VariableId,
        vars: &mut [Variable],
        cons: &[Constraint],
    ) {
        self.arena[new_block.0].add_variable(new_block, v, vars);
        for ci in 0..vars[v.0].incoming.len() {
            let cid = vars[v.0].incoming[ci];
            let (active, left) = {
                let c = &cons[cid.0];
                (c.active, c.left)
            };
            if active && left != u && vars[left.0].block == source {
                self.populate_split_block(new_block, source, left, v, vars, cons);
            }
        }
        for ci in 0..vars[v.0].outgoing.len() {
            let cid = vars[v.0].outgoing[ci];
            let (active, right) = {
                let c = &cons[cid.0];
                (c.active, c.right)
            };
            if active && right != u && vars[right.0].block == source {
                self.populate_split_block(new_block, source, right, v, vars, cons);
            }
        }
    }

    /// Splits `b` at the minimum-multiplier constraint on the active path
    /// between `vl` and `vr`, retiring `b`. `None` if the path offers no
    /// split point.
    pub(crate) fn split_between(
        &mut self,
        b: BlockId,
        vl: VariableId,
        vr: VariableId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) -> Option<(ConstraintId, BlockId, BlockId)> {
        let split_cid = self.arena[b.0].find_min_lm_between(b, vl, vr, vars, cons)?;
        let (l, r) = self.split_block(b, split_cid, vars, cons);
        self.arena[b.0].deleted = true;
        Some((split_cid, l, r))
    }
}
