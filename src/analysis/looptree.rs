//! Natural-loop forest over a scope.
//!
//! Back edges are in-scope edges whose target dominates their source. Each
//! loop body is found by a reverse walk from the back-edge sources, bounded
//! at the header; nesting follows from body inclusion.

use rustc_hash::FxHashMap;

use crate::analysis::scope::Scope;
use crate::ir::arena::BitSet;
use crate::ir::node::NodeId;

/// One natural loop.
#[derive(Debug)]
pub struct Loop {
    pub header: NodeId,
    /// In-scope lambdas whose jump closes the loop.
    pub back_edges: Vec<NodeId>,
    /// All members of the loop, header included.
    pub body: Vec<NodeId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// 1 for outermost loops.
    pub depth: u32,
}

/// The loop forest of a scope.
pub struct LoopTree {
    loops: Vec<Loop>,
    header_of: FxHashMap<NodeId, usize>,
    innermost: FxHashMap<NodeId, usize>,
}

impl LoopTree {
    pub(crate) fn build(scope: &Scope) -> LoopTree {
        let dom = scope.domtree();

        let mut tree = LoopTree {
            loops: Vec::new(),
            header_of: FxHashMap::default(),
            innermost: FxHashMap::default(),
        };

        for &lambda in scope.rpo() {
            for &succ in scope.succs(lambda) {
                if dom.dominates(succ, lambda) {
                    tree.add_back_edge(scope, succ, lambda);
                }
            }
        }

        tree.compute_nesting();

        // map every lambda to its smallest enclosing loop
        for i in 0..tree.loops.len() {
            for m in 0..tree.loops[i].body.len() {
                let member = tree.loops[i].body[m];
                let keep = tree
                    .innermost
                    .get(&member)
                    .is_some_and(|&j| tree.loops[j].body.len() <= tree.loops[i].body.len());
                if !keep {
                    tree.innermost.insert(member, i);
                }
            }
        }

        tree
    }

    fn add_back_edge(&mut self, scope: &Scope, header: NodeId, source: NodeId) {
        if let Some(&i) = self.header_of.get(&header) {
            if !self.loops[i].back_edges.contains(&source) {
                self.loops[i].back_edges.push(source);
                self.grow_body(scope, i, source);
            }
            return;
        }

        let mut l = Loop {
            header,
            back_edges: vec![source],
            body: Vec::new(),
            parent: None,
            children: Vec::new(),
            depth: 1,
        };

        // reverse walk from the back edge, bounded at the header
        let mut in_body = BitSet::with_capacity(scope.len());
        in_body.insert(scope.sid(header));
        let mut worklist = vec![source];
        while let Some(member) = worklist.pop() {
            let sid = scope.sid(member);
            if in_body.contains(sid) {
                continue;
            }
            in_body.insert(sid);
            for &pred in scope.preds(member) {
                worklist.push(pred);
            }
        }
        l.body = in_body.iter().map(|sid| scope.rpo()[sid]).collect();

        self.header_of.insert(header, self.loops.len());
        self.loops.push(l);
    }

    fn grow_body(&mut self, scope: &Scope, i: usize, source: NodeId) {
        let mut in_body = BitSet::with_capacity(scope.len());
        for &member in &self.loops[i].body {
            in_body.insert(scope.sid(member));
        }
        let mut worklist = vec![source];
        while let Some(member) = worklist.pop() {
            let sid = scope.sid(member);
            if in_body.contains(sid) {
                continue;
            }
            in_body.insert(sid);
            for &pred in scope.preds(member) {
                worklist.push(pred);
            }
        }
        self.loops[i].body = in_body.iter().map(|sid| scope.rpo()[sid]).collect();
    }

    fn compute_nesting(&mut self) {
        let n = self.loops.len();
        for i in 0..n {
            let header = self.loops[i].header;
            let mut parent: Option<usize> = None;
            let mut parent_size = usize::MAX;
            for (j, l) in self.loops.iter().enumerate() {
                if i != j && l.body.contains(&header) && l.body.len() < parent_size {
                    parent_size = l.body.len();
                    parent = Some(j);
                }
            }
            if let Some(p) = parent {
                self.loops[i].parent = Some(p);
                self.loops[p].children.push(i);
            }
        }
        for i in 0..n {
            let mut depth = 1;
            let mut cur = self.loops[i].parent;
            while let Some(p) = cur {
                depth += 1;
                cur = self.loops[p].parent;
            }
            self.loops[i].depth = depth;
        }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn is_header(&self, lambda: NodeId) -> bool {
        self.header_of.contains_key(&lambda)
    }

    /// The innermost loop containing the lambda.
    pub fn loop_of(&self, lambda: NodeId) -> Option<&Loop> {
        self.innermost.get(&lambda).map(|&i| &self.loops[i])
    }

    /// Nesting depth, 0 outside any loop.
    pub fn loop_depth(&self, lambda: NodeId) -> u32 {
        self.loop_of(lambda).map_or(0, |l| l.depth)
    }
}

// =============================================================================
// Tests
// =============================================================================
