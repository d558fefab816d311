//! Scope extraction and numbering.
//!
//! A scope is the induced subgraph of continuations belonging to a set of
//! entry lambdas: every lambda reachable by following the entries' params
//! forward through their transitive users, climbing from each user back
//! through its predecessors. On that subgraph the scope computes a reverse
//! postorder (entries first), in-scope predecessor/successor caches, and —
//! lazily — the symmetric backward numbering from the exits plus dominator
//! and loop trees.
//!
//! The numbering lives in maps owned by the scope, not in fields stamped
//! onto the lambdas, so scopes may overlap freely and need no teardown.

use std::cell::OnceCell;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::domtree::DomTree;
use crate::analysis::looptree::LoopTree;
use crate::ir::node::NodeId;
use crate::ir::world::World;

struct Backward {
    num_exits: usize,
    rpo: Vec<NodeId>,
    sid: FxHashMap<NodeId, usize>,
}

/// A transient analysis view over one region of the graph.
pub struct Scope {
    num_entries: usize,
    rpo: Vec<NodeId>,
    sid: FxHashMap<NodeId, usize>,
    members: FxHashSet<NodeId>,
    /// In-scope predecessors, indexed by sid.
    preds: Vec<Vec<NodeId>>,
    /// In-scope successors, indexed by sid.
    succs: Vec<Vec<NodeId>>,
    backward: OnceCell<Backward>,
    domtree: OnceCell<DomTree>,
    postdomtree: OnceCell<DomTree>,
    looptree: OnceCell<LoopTree>,
}

impl Scope {
    /// The scope of a single entry.
    pub fn new(world: &World, entry: NodeId) -> Scope {
        Scope::with_entries(world, &[entry])
    }

    /// The scope of an explicit entry set.
    pub fn with_entries(world: &World, entries: &[NodeId]) -> Scope {
        let pass = world.new_pass();
        let mut members = FxHashSet::default();
        for &entry in entries {
            debug_assert!(world.node(entry).is_lambda());
            if !world.visit(pass, entry) {
                members.insert(entry);
            }
        }
        for &entry in entries {
            mark_dependents(world, pass, entry, None, &mut members);
        }
        Scope::finish(world, entries.to_vec(), members)
    }

    /// The scope spanning the whole world: entries are the lambdas that no
    /// other lambda's param-use chains reach.
    pub fn of_world(world: &World) -> Scope {
        let pass = world.new_pass();
        let mut members = FxHashSet::default();
        for &lambda in world.lambdas() {
            if !world.is_visited(pass, lambda) {
                mark_dependents(world, pass, lambda, Some(lambda), &mut members);
            }
        }
        let entries: Vec<NodeId> = world
            .lambdas()
            .iter()
            .copied()
            .filter(|&l| !world.is_visited(pass, l))
            .collect();
        for &entry in &entries {
            world.visit(pass, entry);
            members.insert(entry);
        }
        Scope::finish(world, entries, members)
    }

    /// Visit the scope of every top-level entry in turn.
    pub fn for_each<F: FnMut(&mut World, Scope)>(world: &mut World, mut f: F) {
        let entries = top_level_entries(world);
        for entry in entries {
            let scope = Scope::new(world, entry);
            f(world, scope);
        }
    }

    fn finish(world: &World, entries: Vec<NodeId>, members: FxHashSet<NodeId>) -> Scope {
        // number in postorder; entries get the highest indices
        let pass = world.new_pass();
        for &entry in &entries {
            world.visit(pass, entry);
        }
        let mut po: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut num = 0;
        for &entry in &entries {
            for succ in world.succs(entry) {
                if members.contains(&succ) && !world.is_visited(pass, succ) {
                    num = number(world, pass, succ, num, &members, &mut po);
                }
            }
        }
        for &entry in entries.iter().rev() {
            po.insert(entry, num);
            num += 1;
        }

        // convert postorder to reverse postorder; unnumbered candidates are
        // unreachable from the entries and fall out of the scope
        let total = num;
        let mut order: Vec<(usize, NodeId)> =
            po.iter().map(|(&l, &p)| (total - 1 - p, l)).collect();
        order.sort_unstable();

        let rpo: Vec<NodeId> = order.iter().map(|&(_, l)| l).collect();
        let sid: FxHashMap<NodeId, usize> = order.iter().map(|&(s, l)| (l, s)).collect();
        let members: FxHashSet<NodeId> = rpo.iter().copied().collect();

        let mut preds = Vec::with_capacity(rpo.len());
        let mut succs = Vec::with_capacity(rpo.len());
        for &l in &rpo {
            succs.push(
                world
                    .succs(l)
                    .into_iter()
                    .filter(|s| members.contains(s))
                    .collect(),
            );
            preds.push(
                world
                    .preds(l)
                    .into_iter()
                    .filter(|p| members.contains(p))
                    .collect(),
            );
        }

        Scope {
            num_entries: entries.len(),
            rpo,
            sid,
            members,
            preds,
            succs,
            backward: OnceCell::new(),
            domtree: OnceCell::new(),
            postdomtree: OnceCell::new(),
            looptree: OnceCell::new(),
        }
    }

    // =========================================================================
    // Membership and numbering
    // =========================================================================

    #[inline]
    pub fn len(&self) -> usize {
        self.rpo.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rpo.is_empty()
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    #[inline]
    pub fn contains(&self, lambda: NodeId) -> bool {
        self.members.contains(&lambda)
    }

    /// Member, but not an entry.
    pub fn inner_contains(&self, lambda: NodeId) -> bool {
        self.sid_of(lambda).is_some_and(|s| s >= self.num_entries)
    }

    /// An entry member.
    pub fn outer_contains(&self, lambda: NodeId) -> bool {
        self.sid_of(lambda).is_some_and(|s| s < self.num_entries)
    }

    pub fn is_entry(&self, lambda: NodeId) -> bool {
        self.outer_contains(lambda)
    }

    /// The lambda's reverse-postorder index. Panics for non-members.
    pub fn sid(&self, lambda: NodeId) -> usize {
        self.sid_of(lambda)
            .unwrap_or_else(|| panic!("{lambda:?} is not a scope member"))
    }

    pub fn sid_of(&self, lambda: NodeId) -> Option<usize> {
        self.sid.get(&lambda).copied()
    }

    /// Members in reverse postorder; `rpo()[l.sid] == l`.
    #[inline]
    pub fn rpo(&self) -> &[NodeId] {
        &self.rpo
    }

    pub fn entries(&self) -> &[NodeId] {
        &self.rpo[..self.num_entries]
    }

    /// Non-entry members in reverse postorder.
    pub fn body(&self) -> &[NodeId] {
        &self.rpo[self.num_entries..]
    }

    /// In-scope successors of a member.
    pub fn succs(&self, lambda: NodeId) -> &[NodeId] {
        &self.succs[self.sid(lambda)]
    }

    /// In-scope predecessors of a member.
    pub fn preds(&self, lambda: NodeId) -> &[NodeId] {
        &self.preds[self.sid(lambda)]
    }

    pub fn num_succs(&self, lambda: NodeId) -> usize {
        self.succs(lambda).len()
    }

    pub fn num_preds(&self, lambda: NodeId) -> usize {
        self.preds(lambda).len()
    }

    // =========================================================================
    // Backward numbering
    // =========================================================================

    fn backward(&self) -> &Backward {
        self.backward.get_or_init(|| {
            let exits: Vec<NodeId> = self
                .rpo
                .iter()
                .copied()
                .filter(|&l| self.succs(l).is_empty())
                .collect();

            let mut visited: FxHashSet<NodeId> = FxHashSet::default();
            let mut po: FxHashMap<NodeId, usize> = FxHashMap::default();
            let mut num = 0;
            for &exit in &exits {
                visited.insert(exit);
            }
            for &exit in &exits {
                for &pred in self.preds(exit) {
                    if !visited.contains(&pred) {
                        num = self.back_number(pred, num, &mut visited, &mut po);
                    }
                }
            }
            for &exit in exits.iter().rev() {
                po.insert(exit, num);
                num += 1;
            }

            let total = num;
            let mut order: Vec<(usize, NodeId)> =
                po.iter().map(|(&l, &p)| (total - 1 - p, l)).collect();
            order.sort_unstable();

            Backward {
                num_exits: exits.len(),
                rpo: order.iter().map(|&(_, l)| l).collect(),
                sid: order.iter().map(|&(s, l)| (l, s)).collect(),
            }
        })
    }

    fn back_number(
        &self,
        root: NodeId,
        mut i: usize,
        visited: &mut FxHashSet<NodeId>,
        po: &mut FxHashMap<NodeId, usize>,
    ) -> usize {
        visited.insert(root);
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(&(node, child)) = stack.last() {
            let preds = self.preds(node);
            if child < preds.len() {
                stack.last_mut().unwrap().1 += 1;
                let pred = preds[child];
                if visited.insert(pred) {
                    stack.push((pred, 0));
                }
            } else {
                stack.pop();
                po.insert(node, i);
                i += 1;
            }
        }
        i
    }

    /// Members backward-reachable from the exits, in backward reverse
    /// postorder (exits first).
    pub fn backwards_rpo(&self) -> &[NodeId] {
        &self.backward().rpo
    }

    pub fn exits(&self) -> &[NodeId] {
        let b = self.backward();
        &b.rpo[..b.num_exits]
    }

    pub fn backwards_body(&self) -> &[NodeId] {
        let b = self.backward();
        &b.rpo[b.num_exits..]
    }

    pub fn num_exits(&self) -> usize {
        self.backward().num_exits
    }

    pub fn is_exit(&self, lambda: NodeId) -> bool {
        self.backwards_sid_of(lambda)
            .is_some_and(|s| s < self.backward().num_exits)
    }

    pub fn backwards_sid(&self, lambda: NodeId) -> usize {
        self.backwards_sid_of(lambda)
            .unwrap_or_else(|| panic!("{lambda:?} is not backward-reachable"))
    }

    pub fn backwards_sid_of(&self, lambda: NodeId) -> Option<usize> {
        self.backward().sid.get(&lambda).copied()
    }

    // =========================================================================
    // Lazy analyses
    // =========================================================================

    /// The forward dominator tree, built on first use.
    pub fn domtree(&self) -> &DomTree {
        self.domtree.get_or_init(|| DomTree::build(self, true))
    }

    /// The post-dominator tree over the backward numbering.
    pub fn postdomtree(&self) -> &DomTree {
        self.postdomtree.get_or_init(|| DomTree::build(self, false))
    }

    /// The natural-loop forest.
    pub fn looptree(&self) -> &LoopTree {
        self.looptree.get_or_init(|| LoopTree::build(self))
    }
}

/// Lambdas that are not reached through any other lambda's param-use chains:
/// the roots `Scope::for_each` iterates.
pub fn top_level_entries(world: &World) -> Vec<NodeId> {
    let pass = world.new_pass();
    let mut members = FxHashSet::default();
    for &lambda in world.lambdas() {
        if !world.is_visited(pass, lambda) {
            mark_dependents(world, pass, lambda, Some(lambda), &mut members);
        }
    }
    world
        .lambdas()
        .iter()
        .copied()
        .filter(|&l| !world.is_visited(pass, l))
        .collect()
}

/// Mark every lambda depending on `lambda`'s params: walk each param forward
/// through its transitive structural users; from every lambda user climb back
/// through the predecessors, bounded by `limit`.
fn mark_dependents(
    world: &World,
    pass: u64,
    lambda: NodeId,
    limit: Option<NodeId>,
    members: &mut FxHashSet<NodeId>,
) {
    enum Work {
        Uses(NodeId),
        Lambda(NodeId),
    }

    let mut stack: Vec<Work> = world
        .params(lambda)
        .iter()
        .map(|&p| Work::Uses(p))
        .collect();

    while let Some(work) = stack.pop() {
        match work {
            Work::Uses(def) => {
                if world.visit(pass, def) {
                    continue;
                }
                for u in world.uses(def) {
                    if world.node(u.user).is_lambda() {
                        stack.push(Work::Lambda(u.user));
                    } else {
                        stack.push(Work::Uses(u.user));
                    }
                }
            }
            Work::Lambda(l) => {
                if limit == Some(l) || world.is_visited(pass, l) {
                    continue;
                }
                world.visit(pass, l);
                members.insert(l);
                for &param in world.params(l) {
                    stack.push(Work::Uses(param));
                }
                for pred in world.preds(l) {
                    stack.push(Work::Lambda(pred));
                }
            }
        }
    }
}

/// Iterative postorder numbering over in-scope successors.
fn number(
    world: &World,
    pass: u64,
    root: NodeId,
    mut i: usize,
    members: &FxHashSet<NodeId>,
    po: &mut FxHashMap<NodeId, usize>,
) -> usize {
    world.visit(pass, root);
    let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = vec![(root, world.succs(root), 0)];
    while !stack.is_empty() {
        let top = stack.len() - 1;
        if stack[top].2 < stack[top].1.len() {
            let succ = stack[top].1[stack[top].2];
            stack[top].2 += 1;
            if members.contains(&succ) && !world.is_visited(pass, succ) {
                world.visit(pass, succ);
                let succs = world.succs(succ);
                stack.push((succ, succs, 0));
            }
        } else {
            let (node, _, _) = stack.pop().unwrap();
            po.insert(node, i);
            i += 1;
        }
    }
    i
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// A function-shaped diamond: every block reaches the return
    /// continuation, so the whole body hangs off the entry's params.
    ///
    /// entry(c, ret) -> {then, else} -> merge(x) -> ret(x)
    fn diamond(w: &mut World) -> (NodeId, NodeId, NodeId, NodeId) {
        let boolt = w.types_mut().bool_type();
        let i32t = w.types_mut().i32_type();
        let ret_pi = w.types_mut().pi1(i32t);
        let entry_pi = w.types_mut().pi2(boolt, ret_pi);
        let empty = w.types_mut().pi(&[]);
        let merge_pi = w.types_mut().pi1(i32t);

        let entry = w.lambda(entry_pi, "entry");
        let then_bb = w.lambda(empty, "then");
        let else_bb = w.lambda(empty, "else");
        let merge = w.lambda(merge_pi, "merge");

        let one = w.lit_i32(1);
        let two = w.lit_i32(2);
        w.branch(entry, w.param(entry, 0), then_bb, else_bb);
        w.jump(then_bb, merge, &[one]);
        w.jump(else_bb, merge, &[two]);
        w.jump(merge, w.param(entry, 1), &[w.param(merge, 0)]);
        (entry, then_bb, else_bb, merge)
    }

    #[test]
    fn test_rpo_is_a_permutation() {
        let mut w = World::new();
        let (entry, _, _, _) = diamond(&mut w);

        let scope = Scope::new(&w, entry);
        assert_eq!(scope.len(), 4);
        for (i, &l) in scope.rpo().iter().enumerate() {
            assert_eq!(scope.sid(l), i);
            assert_eq!(scope.rpo()[scope.sid(l)], l);
        }
        assert_eq!(scope.entries(), &[entry][..]);
        assert_eq!(scope.sid(entry), 0);
    }

    #[test]
    fn test_diamond_scope_membership_and_order() {
        let mut w = World::new();
        let (entry, then_bb, else_bb, merge) = diamond(&mut w);

        let scope = Scope::new(&w, entry);
        assert!(scope.contains(entry));
        assert!(scope.contains(merge));
        assert!(scope.inner_contains(merge));
        assert!(!scope.inner_contains(entry));
        assert!(scope.outer_contains(entry));

        // rpo respects the edge order: entry first, merge after its preds
        assert_eq!(scope.sid(entry), 0);
        assert!(scope.sid(merge) > scope.sid(then_bb));
        assert!(scope.sid(merge) > scope.sid(else_bb));

        // filtered relations
        assert_eq!(scope.succs(entry).len(), 2);
        assert_eq!(scope.preds(merge).len(), 2);
        assert_eq!(scope.preds(entry).len(), 0);
        assert_eq!(scope.body().len(), 3);
    }

    #[test]
    fn test_unreachable_candidates_are_pruned() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let pi_i = w.types_mut().pi1(i32t);
        let empty = w.types_mut().pi(&[]);

        let entry = w.lambda(pi_i, "entry");
        let target = w.lambda(empty, "target");
        let hanger = w.lambda(pi_i, "hanger");

        // hanger consumes entry's param, so the mark pass finds it, but the
        // entry never jumps to it: numbering must drop it again
        w.jump(entry, target, &[]);
        w.jump(hanger, target, &[w.param(entry, 0)]);

        let scope = Scope::new(&w, entry);
        assert!(!scope.contains(hanger));
        for &l in scope.rpo() {
            assert_ne!(l, hanger);
        }
    }

    #[test]
    fn test_backward_numbering() {
        let mut w = World::new();
        let (entry, then_bb, else_bb, merge) = diamond(&mut w);

        let scope = Scope::new(&w, entry);
        assert_eq!(scope.exits(), &[merge][..]);
        assert_eq!(scope.backwards_sid(merge), 0);
        assert!(scope.backwards_sid(entry) > scope.backwards_sid(then_bb));
        assert!(scope.backwards_sid(entry) > scope.backwards_sid(else_bb));
        assert_eq!(scope.backwards_rpo().len(), 4);
    }

    #[test]
    fn test_world_scope_and_top_level_entries() {
        let mut w = World::new();
        let i32t = w.types_mut().i32_type();
        let empty = w.types_mut().pi(&[]);
        let pi_i = w.types_mut().pi1(i32t);

        let main = w.lambda(empty, "main");
        let helper = w.lambda(pi_i, "helper");
        // inner uses helper's param: it belongs to helper's region
        let inner = w.lambda(empty, "inner");
        let seven = w.lit_i32(7);
        w.jump(main, helper, &[seven]);
        w.jump(helper, inner, &[]);
        let one = w.lit_i32(1);
        let use_param = w.arith(crate::ir::node::ArithOp::Add, w.param(helper, 0), one);
        let sink = w.lambda(pi_i, "sink");
        w.jump(inner, sink, &[use_param]);

        let tops = top_level_entries(&w);
        assert!(tops.contains(&main));
        assert!(tops.contains(&helper));
        assert!(tops.contains(&sink));
        assert!(!tops.contains(&inner));

        let world_scope = Scope::of_world(&w);
        assert!(world_scope.contains(main));
        assert!(world_scope.contains(inner));

        let mut seen = Vec::new();
        Scope::for_each(&mut w, |_, scope| seen.push(scope.entries()[0]));
        assert_eq!(seen.len(), tops.len());
    }
}
