//! Dominator and post-dominator trees over a scope.
//!
//! The iterative Cooper-Harvey-Kennedy scheme, generalized to multi-entry
//! scopes: every entry (exit, for the backward direction) is its own
//! immediate dominator, every other node starts from its first predecessor
//! with a smaller rpo index, and the fixed point meets predecessors through
//! LCA walks on the partially built tree.
//!
//! A node whose predecessors all carry larger rpo indices means the scope
//! numbering is broken; that is a fatal assertion, not an input error.

use rustc_hash::FxHashMap;

use crate::analysis::scope::Scope;
use crate::ir::node::NodeId;

/// A dominator tree, forward (entries dominate) or backward (exits
/// post-dominate).
pub struct DomTree {
    forwards: bool,
    rpo: Vec<NodeId>,
    index: FxHashMap<NodeId, usize>,
    /// Immediate dominator per rpo index; roots point at themselves.
    idom: Vec<usize>,
    children: Vec<Vec<NodeId>>,
    num_roots: usize,
}

impl DomTree {
    pub(crate) fn build(scope: &Scope, forwards: bool) -> DomTree {
        let (rpo, num_roots) = if forwards {
            (scope.rpo().to_vec(), scope.num_entries())
        } else {
            (scope.backwards_rpo().to_vec(), scope.num_exits())
        };
        let index: FxHashMap<NodeId, usize> =
            rpo.iter().enumerate().map(|(i, &l)| (l, i)).collect();
        let n = rpo.len();

        let mut idom = vec![usize::MAX; n];
        for (i, slot) in idom.iter_mut().enumerate().take(num_roots) {
            *slot = i;
        }
        for i in num_roots..n {
            idom[i] = preds_of(scope, forwards, rpo[i])
                .iter()
                .filter_map(|p| index.get(p).copied())
                .find(|&p| p < i)
                .expect("malformed scope numbering: no earlier predecessor");
        }

        loop {
            let mut changed = false;
            for i in num_roots..n {
                let mut new_idom: Option<usize> = None;
                for p in preds_of(scope, forwards, rpo[i]) {
                    let Some(&pi) = index.get(p) else { continue };
                    new_idom = Some(match new_idom {
                        None => pi,
                        Some(cur) => intersect(&idom, cur, pi),
                    });
                }
                let new_idom = new_idom.expect("node without an in-tree predecessor");
                if idom[i] != new_idom {
                    idom[i] = new_idom;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for i in num_roots..n {
            children[idom[i]].push(rpo[i]);
        }

        DomTree {
            forwards,
            rpo,
            index,
            idom,
            children,
            num_roots,
        }
    }

    #[inline]
    pub fn is_postdomtree(&self) -> bool {
        !self.forwards
    }

    /// Tree members in the direction's reverse postorder.
    #[inline]
    pub fn nodes(&self) -> &[NodeId] {
        &self.rpo
    }

    pub fn contains(&self, lambda: NodeId) -> bool {
        self.index.contains_key(&lambda)
    }

    /// The rpo index of a member.
    pub fn index_of(&self, lambda: NodeId) -> usize {
        self.index
            .get(&lambda)
            .copied()
            .unwrap_or_else(|| panic!("{lambda:?} is not in the dominator tree"))
    }

    /// The immediate dominator; roots dominate themselves.
    pub fn idom(&self, lambda: NodeId) -> NodeId {
        self.rpo[self.idom[self.index_of(lambda)]]
    }

    pub fn is_root(&self, lambda: NodeId) -> bool {
        self.index_of(lambda) < self.num_roots
    }

    /// Dominator-tree children.
    pub fn children(&self, lambda: NodeId) -> &[NodeId] {
        &self.children[self.index_of(lambda)]
    }

    /// The least common ancestor in the tree.
    pub fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        self.rpo[intersect(&self.idom, self.index_of(a), self.index_of(b))]
    }

    /// Distance to the tree root.
    pub fn depth(&self, lambda: NodeId) -> usize {
        let mut i = self.index_of(lambda);
        let mut depth = 0;
        while self.idom[i] != i {
            i = self.idom[i];
            depth += 1;
        }
        depth
    }

    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        let target = self.index_of(a);
        let mut i = self.index_of(b);
        loop {
            if i == target {
                return true;
            }
            let up = self.idom[i];
            if up == i {
                return false;
            }
            i = up;
        }
    }

    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }
}

/// The tree-relevant predecessor relation for the chosen direction.
fn preds_of(scope: &Scope, forwards: bool, l: NodeId) -> &[NodeId] {
    if forwards {
        scope.preds(l)
    } else {
        scope.succs(l)
    }
}

/// LCA on the partial tree: repeatedly lift whichever side carries the
/// larger rpo index. Stalling on a root means the two nodes hang under
/// different roots of a multi-entry scope.
fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while b > a {
            let up = idom[b];
            assert!(up != b, "lca over disjoint dominator trees");
            b = up;
        }
        while a > b {
            let up = idom[a];
            assert!(up != a, "lca over disjoint dominator trees");
            a = up;
        }
    }
    a
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::analysis::scope::Scope;
    use crate::ir::node::NodeId;
    use crate::ir::world::World;

    /// entry(c, ret) -> {then, else} -> merge -> ret
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

    /// entry(c, ret) -> header; header -> {body, done}; body -> header;
    /// done -> ret. A loop with a pre-header and one exit.
    fn natural_loop(w: &mut World) -> (NodeId, NodeId, NodeId, NodeId) {
        let boolt = w.types_mut().bool_type();
        let i32t = w.types_mut().i32_type();
        let ret_pi = w.types_mut().pi1(i32t);
        let entry_pi = w.types_mut().pi2(boolt, ret_pi);
        let empty = w.types_mut().pi(&[]);

        let entry = w.lambda(entry_pi, "entry");
        let header = w.lambda(empty, "header");
        let body = w.lambda(empty, "body");
        let done = w.lambda(empty, "done");

        let seven = w.lit_i32(7);
        w.jump(entry, header, &[]);
        w.branch(header, w.param(entry, 0), body, done);
        w.jump(body, header, &[]);
        w.jump(done, w.param(entry, 1), &[seven]);
        (entry, header, body, done)
    }

    #[test]
    fn test_diamond_idoms() {
        let mut w = World::new();
        let (entry, then_bb, else_bb, merge) = diamond(&mut w);
        let scope = Scope::new(&w, entry);
        let dom = scope.domtree();

        assert_eq!(dom.idom(entry), entry);
        assert_eq!(dom.idom(then_bb), entry);
        assert_eq!(dom.idom(else_bb), entry);
        // merge joins both arms, so only the entry dominates it
        assert_eq!(dom.idom(merge), entry);
        assert!(dom.dominates(entry, merge));
        assert!(!dom.dominates(then_bb, merge));
        assert_eq!(dom.depth(entry), 0);
        assert_eq!(dom.depth(merge), 1);
    }

    #[test]
    fn test_loop_idoms() {
        let mut w = World::new();
        let (entry, header, body, done) = natural_loop(&mut w);
        let scope = Scope::new(&w, entry);
        let dom = scope.domtree();

        assert_eq!(dom.idom(header), entry);
        assert_eq!(dom.idom(body), header);
        assert_eq!(dom.idom(done), header);
        assert!(dom.strictly_dominates(header, body));

        // idom indices strictly decrease toward the root
        for &l in scope.body() {
            assert!(scope.sid(dom.idom(l)) < scope.sid(l));
        }
    }

    #[test]
    fn test_lca_laws() {
        let mut w = World::new();
        let (entry, then_bb, else_bb, merge) = diamond(&mut w);
        let scope = Scope::new(&w, entry);
        let dom = scope.domtree();

        // commutative
        assert_eq!(dom.lca(then_bb, else_bb), dom.lca(else_bb, then_bb));
        assert_eq!(dom.lca(then_bb, else_bb), entry);
        // associative over the three non-entry nodes
        let ab_c = dom.lca(dom.lca(then_bb, else_bb), merge);
        let a_bc = dom.lca(then_bb, dom.lca(else_bb, merge));
        assert_eq!(ab_c, a_bc);
        // idempotent
        assert_eq!(dom.lca(merge, merge), merge);
    }

    #[test]
    fn test_postdomtree_is_reverse_dominators() {
        let mut w = World::new();
        let (entry, then_bb, else_bb, merge) = diamond(&mut w);
        let scope = Scope::new(&w, entry);
        let pdom = scope.postdomtree();

        assert!(pdom.is_postdomtree());
        // merge post-dominates everything
        assert_eq!(pdom.idom(then_bb), merge);
        assert_eq!(pdom.idom(else_bb), merge);
        assert_eq!(pdom.idom(entry), merge);
        assert!(pdom.dominates(merge, entry));

        // backward index of the post-idom is smaller
        for &l in scope.backwards_body() {
            assert!(scope.backwards_sid(pdom.idom(l)) < scope.backwards_sid(l));
        }
    }
}
