//! The partition of all variables into blocks.
//!
//! Blocks live in a grow-only arena addressed by [`BlockId`]; merging or
//! splitting tombstones the retired block rather than freeing it, because a
//! variable may still point at it for the remainder of the current step.
//! [`Blocks::cleanup`] releases tombstoned blocks at phase boundaries. The
//! global time counter used for queue staleness detection is owned here.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::block::Block;
use crate::constraint::{Constraint, ConstraintId};
use crate::variable::{Variable, VariableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct Blocks {
    pub(crate) arena: Vec<Block>,
    pub(crate) live: BTreeSet<BlockId>,
    pub(crate) time_ctr: u64,
}

impl Blocks {
    /// One block per variable, each at its variable's desired position.
    pub(crate) fn new(vars: &mut [Variable]) -> Self {
        let mut arena = Vec::with_capacity(vars.len());
        let mut live = BTreeSet::new();
        for (i, var) in vars.iter_mut().enumerate() {
            var.block = BlockId(i);
            var.offset = 0.0;
            var.visited = false;
            arena.push(Block {
                vars: vec![VariableId(i)],
                posn: var.desired,
                weight: var.weight,
                wposn: var.weight * var.desired,
                deleted: false,
                time_stamp: 0,
                in_heap: None,
                out_heap: None,
            });
            live.insert(BlockId(i));
        }
        Self {
            arena,
            live,
            time_ctr: 0,
        }
    }

    pub(crate) fn block(&self, id: BlockId) -> &Block {
        &self.arena[id.0]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.arena[id.0]
    }

    pub(crate) fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.arena.len());
        self.arena.push(Block::empty());
        self.live.insert(id);
        id
    }

    pub(crate) fn remove_block(&mut self, id: BlockId) {
        self.arena[id.0].deleted = true;
    }

    /// Snapshot of the live block ids, in id order.
    pub(crate) fn live_ids(&self) -> Vec<BlockId> {
        self.live.iter().copied().collect()
    }

    /// Releases every tombstoned block's members and queues and drops it from
    /// the live set. Must only run between algorithm steps, once nothing can
    /// still reach a retired block through a stale reference.
    pub(crate) fn cleanup(&mut self) {
        let dead: Vec<BlockId> = self
            .live
            .iter()
            .copied()
            .filter(|b| self.arena[b.0].deleted)
            .collect();
        for b in dead {
            self.live.remove(&b);
            let block = &mut self.arena[b.0];
            block.vars = Vec::new();
            block.in_heap = None;
            block.out_heap = None;
        }
    }

    pub(crate) fn position(&self, vars: &[Variable], v: VariableId) -> f64 {
        let var = &vars[v.0];
        self.arena[var.block.0].posn + var.offset
    }

    pub(crate) fn slack(&self, vars: &[Variable], c: &Constraint) -> f64 {
        self.position(vars, c.right) - c.gap - self.position(vars, c.left)
    }

    pub(crate) fn cost(&self, vars: &[Variable]) -> f64 {
        self.live
            .iter()
            .filter(|b| !self.arena[b.0].deleted)
            .map(|b| self.arena[b.0].cost(vars))
            .sum()
    }

    /// Boundary-queue order: entries whose left block changed under them, or
    /// that became internal, compare as most violated so they surface and get
    /// purged first; otherwise ascending slack, with exact ties broken by the
    /// endpoint ids so runs are deterministic.
    pub(crate) fn compare_boundary(
        &self,
        vars: &[Variable],
        cons: &[Constraint],
        a: ConstraintId,
        b: ConstraintId,
    ) -> Ordering {
        let key = |cid: ConstraintId| -> f64 {
            let c = &cons[cid.0];
            let lb = vars[c.left.0].block;
            let rb = vars[c.right.0].block;
            if self.arena[lb.0].time_stamp > c.time_stamp || lb == rb {
                f64::NEG_INFINITY
            } else {
                self.slack(vars, c)
            }
        };
        key(a).total_cmp(&key(b)).then_with(|| {
            let (ca, cb) = (&cons[a.0], &cons[b.0]);
            ca.left
                .0
                .cmp(&cb.left.0)
                .then(ca.right.0.cmp(&cb.right.0))
        })
    }

    /// Topological order of all variables along the constraint DAG: iterative
    /// post-order DFS from every variable without incoming constraints,
    /// reversed. Variables on a cycle are unreachable and simply left out;
    /// the caller's final feasibility check reports them.
    pub(crate) fn total_order(
        &self,
        vars: &mut [Variable],
        cons: &[Constraint],
    ) -> Vec<VariableId> {
        for var in vars.iter_mut() {
            var.visited = false;
        }
        let mut order: Vec<VariableId> = Vec::with_capacity(vars.len());
        for i in 0..vars.len() {
            if vars[i].incoming.is_empty() && !vars[i].visited {
                dfs_visit(VariableId(i), vars, cons, &mut order);
            }
        }
        order.reverse();
        order
    }

    /// Repeatedly activates `r`'s most violated incoming boundary constraint,
    /// absorbing the neighbouring left block, until none is violated.
    pub(crate) fn merge_left(
        &mut self,
        mut r: BlockId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) {
        self.time_ctr += 1;
        self.arena[r.0].time_stamp = self.time_ctr;
        self.set_up_in_constraints(r, vars, cons);
        loop {
            let Some(cid) = self.find_min_in_constraint(r, vars, cons) else {
                break;
            };
            let slack = {
                let c = &cons[cid.0];
                self.slack(vars, c)
            };
            if slack >= 0.0 {
                break;
            }
            self.delete_min_in_constraint(r, vars, cons);
            let mut l = vars[cons[cid.0].left.0].block;
            if self.arena[l.0].in_heap.is_none() {
                self.set_up_in_constraints(l, vars, cons);
            }
            let mut dist = {
                let c = &cons[cid.0];
                vars[c.right.0].offset - vars[c.left.0].offset - c.gap
            };
            if self.arena[r.0].vars.len() < self.arena[l.0].vars.len() {
                dist = -dist;
                std::mem::swap(&mut l, &mut r);
            }
            self.time_ctr += 1;
            self.merge_blocks(r, l, cid, dist, vars, cons);
            self.merge_in(r, l, vars, cons);
            self.arena[r.0].time_stamp = self.time_ctr;
            self.remove_block(l);
        }
    }

    /// Mirror of [`merge_left`](Self::merge_left) over outgoing constraints.
    pub(crate) fn merge_right(
        &mut self,
        mut l: BlockId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) {
        self.set_up_out_constraints(l, vars, cons);
        loop {
            let Some(cid) = self.find_min_out_constraint(l, vars, cons) else {
                break;
            };
            let slack = {
                let c = &cons[cid.0];
                self.slack(vars, c)
            };
            if slack >= 0.0 {
                break;
            }
            self.delete_min_out_constraint(l, vars, cons);
            let mut r = vars[cons[cid.0].right.0].block;
            self.set_up_out_constraints(r, vars, cons);
            let mut dist = {
                let c = &cons[cid.0];
                vars[c.left.0].offset + c.gap - vars[c.right.0].offset
            };
            if self.arena[l.0].vars.len() > self.arena[r.0].vars.len() {
                dist = -dist;
                std::mem::swap(&mut l, &mut r);
            }
            self.merge_blocks(l, r, cid, dist, vars, cons);
            self.merge_out(l, r, vars, cons);
            self.remove_block(r);
        }
    }

    /// Splits `b` across `cid`, then re-merges the left side leftward and the
    /// right side rightward so no boundary constraint of the new blocks is
    /// left violated. Returns the blocks holding the constraint's endpoints.
    pub(crate) fn split(
        &mut self,
        b: BlockId,
        cid: ConstraintId,
        vars: &mut [Variable],
        cons: &mut [Constraint],
    ) -> (BlockId, BlockId) {
        let (l, r0) = self.split_block(b, cid, vars, cons);
        // the right side keeps the old block's position until the left side
        // has settled, so slacks seen during the re-merge stay consistent
        let old_posn = self.arena[b.0].posn;
        self.arena[r0.0].posn = old_posn;
        self.merge_left(l, vars, cons);
        // the right side may have been merged away while the left settled
        let r = vars[cons[cid.0].right.0].block;
        self.arena[r.0].update_weighted_position(vars);
        self.merge_right(r, vars, cons);
        self.remove_block(b);
        let l = vars[cons[cid.0].left.0].block;
        (l, r)
    }
}

fn dfs_visit(
    root: VariableId,
    vars: &mut [Variable],
    cons: &[Constraint],
    order: &mut Vec<VariableId>,
) {
    vars[root.0].visited = true;
    let mut stack: Vec<(VariableId, usize)> = vec![(root, 0)];
    loop {
        let Some(&(v, next)) = stack.last() else {
            break;
        };
        if next < vars[v.0].outgoing.len() {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let cid = vars[v.0].outgoing[next];
            let child = cons[cid.0].right;
            if !vars[child.0].visited {
                vars[child.0].visited = true;
                stack.push((child, 0));
            }
        } else {
            stack.pop();
            order.push(v);
        }
    }
}
