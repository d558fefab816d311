//! The graph owner.
//!
//! The `World` owns every node and type, and is the single mutation point of
//! the IR:
//!
//! - **Creation**: lambdas (with their params) and hash-consed primops
//! - **Edges**: operand slots with maintained reverse `uses`
//! - **Replacement**: eager use rewriting plus a forwarding representative,
//!   so stale ids still deref to the replacement
//! - **Pass tokens**: monotonically increasing visit stamps, the O(1)
//!   alternative to clearing visited sets between traversals
//! - **Cleanup**: mark-and-sweep collection of unreachable structural nodes
//!
//! The world is a single-threaded shared resource; the only interior
//! mutability is the representative chain (path compression) and the visit
//! stamps, both confined to `Cell`s.

use std::cell::Cell;
use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::arena::Arena;
use super::node::{ArithOp, CmpOp, LambdaAttr, LambdaData, Lit, Node, NodeId, NodeOp, PrimOp, Use};
use super::types::{GenericMap, TypeId, TypeTable};

type InternKey = (PrimOp, TypeId, SmallVec<[NodeId; 4]>);

/// Owner of the node graph and the type table.
pub struct World {
    nodes: Arena<Node>,
    types: TypeTable,
    intern: FxHashMap<InternKey, NodeId>,
    lambdas: Vec<NodeId>,
    cur_pass: Cell<u64>,
}

impl World {
    pub fn new() -> Self {
        World {
            nodes: Arena::new(),
            types: TypeTable::new(),
            intern: FxHashMap::default(),
            lambdas: Vec::new(),
            cur_pass: Cell::new(0),
        }
    }

    #[inline]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    #[inline]
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    /// All lambdas ever created, in creation order.
    #[inline]
    pub fn lambdas(&self) -> &[NodeId] {
        &self.lambdas
    }

    /// Total number of nodes ever allocated (dead ones included).
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    // =========================================================================
    // Node access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> TypeId {
        self.nodes[id].ty
    }

    #[inline]
    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) {
        self.nodes[id].name = name.to_string();
    }

    /// Name suffixed with the gid, for diagnostics.
    pub fn unique_name(&self, id: NodeId) -> String {
        let name = &self.nodes[id].name;
        if name.is_empty() {
            format!("n_{}", id.index())
        } else {
            format!("{}_{}", name, id.index())
        }
    }

    /// Chase the representative chain, compressing the path. Dereferencing
    /// twice equals dereferencing once.
    pub fn deref(&self, id: NodeId) -> NodeId {
        let mut root = id;
        loop {
            let next = self.nodes[root].repr.get();
            if next == root {
                break;
            }
            root = next;
        }
        let mut cur = id;
        while cur != root {
            let next = self.nodes[cur].repr.get();
            self.nodes[cur].repr.set(root);
            cur = next;
        }
        root
    }

    /// The id if it derefs to a lambda.
    pub fn as_lambda(&self, id: NodeId) -> Option<NodeId> {
        if !id.is_valid() {
            return None;
        }
        let id = self.deref(id);
        self.nodes[id].is_lambda().then_some(id)
    }

    /// The literal value if the node derefs to one.
    pub fn as_lit(&self, id: NodeId) -> Option<Lit> {
        match &self.nodes[self.deref(id)].op {
            NodeOp::Prim(PrimOp::Lit(lit)) => Some(*lit),
            _ => None,
        }
    }

    /// Whether the node derefs to a bottom value.
    pub fn is_bottom(&self, id: NodeId) -> bool {
        matches!(self.nodes[self.deref(id)].op, NodeOp::Prim(PrimOp::Bottom))
    }

    /// Whether the node derefs to a param.
    pub fn is_param(&self, id: NodeId) -> bool {
        self.nodes[self.deref(id)].is_param()
    }

    /// Order of the node's type: > 0 means the value is itself callable.
    pub fn order(&self, id: NodeId) -> usize {
        self.types.order(self.nodes[self.deref(id)].ty)
    }

    // =========================================================================
    // Pass tokens
    // =========================================================================

    /// Allocate a fresh pass token. Nodes stamped under an older token count
    /// as unvisited.
    pub fn new_pass(&self) -> u64 {
        let pass = self.cur_pass.get() + 1;
        self.cur_pass.set(pass);
        pass
    }

    /// Stamp the node; returns whether it was already stamped in this pass.
    pub fn visit(&self, pass: u64, id: NodeId) -> bool {
        let n = &self.nodes[id];
        if n.last_pass.get() == pass {
            true
        } else {
            n.last_pass.set(pass);
            false
        }
    }

    pub fn is_visited(&self, pass: u64, id: NodeId) -> bool {
        self.nodes[id].last_pass.get() == pass
    }

    // =========================================================================
    // Operand slots and uses
    // =========================================================================

    /// Raw operand slots; unset slots are `NodeId::INVALID`.
    #[inline]
    pub fn ops(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].ops
    }

    /// The `i`-th operand, which must be set.
    pub fn op(&self, id: NodeId, i: usize) -> NodeId {
        let op = self.nodes[id].ops[i];
        assert!(op.is_valid(), "operand {i} of {} is unset", self.unique_name(id));
        op
    }

    /// Snapshot view of the node's uses. Copy before mutating the graph.
    #[inline]
    pub fn uses(&self, id: NodeId) -> &[Use] {
        &self.nodes[id].uses
    }

    pub fn set_op(&mut self, user: NodeId, index: usize, def: NodeId) {
        let def = self.deref(def);
        let n = &mut self.nodes[user];
        assert!(index < n.ops.len(), "operand index {index} out of range");
        assert!(!n.ops[index].is_valid(), "operand slot {index} already set");
        n.ops[index] = def;
        self.add_use(def, Use { user, index });
    }

    pub fn unset_op(&mut self, user: NodeId, index: usize) {
        let def = self.nodes[user].ops[index];
        assert!(def.is_valid(), "operand slot {index} is not set");
        self.nodes[user].ops[index] = NodeId::INVALID;
        self.remove_use(def, Use { user, index });
    }

    pub fn update_op(&mut self, user: NodeId, index: usize, def: NodeId) {
        self.unset_op(user, index);
        self.set_op(user, index, def);
    }

    pub(crate) fn resize_ops(&mut self, id: NodeId, n: usize) {
        self.nodes[id].ops.resize(n, NodeId::INVALID);
    }

    fn unset_ops(&mut self, id: NodeId) {
        for i in 0..self.nodes[id].ops.len() {
            if self.nodes[id].ops[i].is_valid() {
                self.unset_op(id, i);
            }
        }
        self.nodes[id].ops.clear();
    }

    fn add_use(&mut self, def: NodeId, u: Use) {
        let uses = &mut self.nodes[def].uses;
        if let Err(pos) = uses.binary_search(&u) {
            uses.insert(pos, u);
        }
    }

    fn remove_use(&mut self, def: NodeId, u: Use) {
        let uses = &mut self.nodes[def].uses;
        if let Ok(pos) = uses.binary_search(&u) {
            uses.remove(pos);
        }
    }

    /// Redirect every use of `old` to `new`, then forward `old`'s
    /// representative so stale ids keep dereferencing correctly.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let old = self.deref(old);
        let new = self.deref(new);
        if old == new {
            return;
        }
        debug_assert!(!self.nodes[old].is_lambda(), "lambdas are not replaceable");
        let uses: Vec<Use> = self.nodes[old].uses.clone();
        for u in uses {
            self.update_op(u.user, u.index, new);
        }
        self.nodes[old].repr.set(new);
    }

    // =========================================================================
    // Lambda creation
    // =========================================================================

    /// A sealed lambda with the given signature; one param per pi element.
    pub fn lambda(&mut self, pi: TypeId, name: &str) -> NodeId {
        self.lambda_full(pi, LambdaAttr::default(), true, name)
    }

    pub fn lambda_attr(&mut self, pi: TypeId, attr: LambdaAttr, name: &str) -> NodeId {
        self.lambda_full(pi, attr, true, name)
    }

    /// An unsealed, empty-signature continuation that grows params through
    /// the incremental construction interface.
    pub fn basicblock(&mut self, name: &str) -> NodeId {
        let pi = self.types.pi(&[]);
        self.lambda_full(pi, LambdaAttr::default(), false, name)
    }

    pub fn lambda_full(&mut self, pi: TypeId, attr: LambdaAttr, sealed: bool, name: &str) -> NodeId {
        let elems = self
            .types
            .pi_elems(pi)
            .expect("lambda signature must be a pi type")
            .to_vec();
        let id = self.nodes.alloc_with(|id| {
            Node::new(
                id,
                NodeOp::Lambda(Box::new(LambdaData {
                    params: Vec::with_capacity(elems.len()),
                    attr,
                    parent: id,
                    sealed,
                    in_flight: false,
                    values: FxHashMap::default(),
                    todos: Vec::new(),
                })),
                pi,
                SmallVec::new(),
            )
        });
        self.nodes[id].name = name.to_string();
        self.lambdas.push(id);
        for (i, &ty) in elems.iter().enumerate() {
            let param = self.new_param(id, i, ty, "");
            self.lambda_data_mut(id).params.push(param);
        }
        id
    }

    /// A fresh lambda with this lambda's signature specialized through the
    /// generic map, fresh params, and copied param names.
    pub fn stub(&mut self, lambda: NodeId, map: &GenericMap, name: &str) -> NodeId {
        let spec = self.types.specialize(self.nodes[lambda].ty, map);
        let attr = self.lambda_data(lambda).attr;
        let result = self.lambda_attr(spec, attr, name);
        for i in 0..self.num_params(lambda) {
            let pname = self.nodes[self.param(lambda, i)].name.clone();
            let nparam = self.param(result, i);
            self.nodes[nparam].name = pname;
        }
        result
    }

    fn new_param(&mut self, lambda: NodeId, index: usize, ty: TypeId, name: &str) -> NodeId {
        let id = self
            .nodes
            .alloc_with(|id| Node::new(id, NodeOp::Param { lambda, index }, ty, SmallVec::new()));
        self.nodes[id].name = name.to_string();
        id
    }

    /// Append a param, extending the lambda's pi type.
    pub fn append_param(&mut self, lambda: NodeId, ty: TypeId, name: &str) -> NodeId {
        let mut elems = self
            .types
            .pi_elems(self.nodes[lambda].ty)
            .expect("lambda signature must be a pi type")
            .to_vec();
        elems.push(ty);
        self.nodes[lambda].ty = self.types.pi(&elems);
        let index = self.num_params(lambda);
        let param = self.new_param(lambda, index, ty, name);
        self.lambda_data_mut(lambda).params.push(param);
        param
    }

    pub(crate) fn lambda_data(&self, lambda: NodeId) -> &LambdaData {
        match &self.nodes[lambda].op {
            NodeOp::Lambda(data) => data,
            _ => panic!("{} is not a lambda", self.unique_name(lambda)),
        }
    }

    pub(crate) fn lambda_data_mut(&mut self, lambda: NodeId) -> &mut LambdaData {
        match &mut self.nodes[lambda].op {
            NodeOp::Lambda(data) => data,
            _ => panic!("node is not a lambda"),
        }
    }

    pub fn params(&self, lambda: NodeId) -> &[NodeId] {
        &self.lambda_data(lambda).params
    }

    pub fn param(&self, lambda: NodeId, i: usize) -> NodeId {
        self.lambda_data(lambda).params[i]
    }

    pub fn num_params(&self, lambda: NodeId) -> usize {
        self.lambda_data(lambda).params.len()
    }

    pub fn param_index(&self, param: NodeId) -> usize {
        match self.nodes[param].op {
            NodeOp::Param { index, .. } => index,
            _ => panic!("node is not a param"),
        }
    }

    pub fn param_lambda(&self, param: NodeId) -> NodeId {
        match self.nodes[param].op {
            NodeOp::Param { lambda, .. } => lambda,
            _ => panic!("node is not a param"),
        }
    }

    pub fn attr(&self, lambda: NodeId) -> LambdaAttr {
        self.lambda_data(lambda).attr
    }

    pub fn set_parent(&mut self, lambda: NodeId, parent: NodeId) {
        self.lambda_data_mut(lambda).parent = parent;
    }

    pub fn is_sealed(&self, lambda: NodeId) -> bool {
        self.lambda_data(lambda).sealed
    }

    // =========================================================================
    // Primop construction
    // =========================================================================

    fn intern_prim(&mut self, prim: PrimOp, ty: TypeId, operands: &[NodeId]) -> NodeId {
        let ops: SmallVec<[NodeId; 4]> = operands
            .iter()
            .map(|&o| {
                let o = self.deref(o);
                assert!(o.is_valid(), "primop operand is unset");
                o
            })
            .collect();
        let key = (prim.clone(), ty, ops.clone());
        if let Some(&id) = self.intern.get(&key) {
            if !self.nodes[id].dead {
                return id;
            }
        }
        let id = self
            .nodes
            .alloc_with(|id| Node::new(id, NodeOp::Prim(prim), ty, ops.clone()));
        for (i, &o) in ops.iter().enumerate() {
            self.add_use(o, Use { user: id, index: i });
        }
        self.intern.insert(key, id);
        id
    }

    pub fn lit_bool(&mut self, v: bool) -> NodeId {
        let ty = self.types.bool_type();
        self.intern_prim(PrimOp::Lit(Lit::Bool(v)), ty, &[])
    }

    pub fn lit_i32(&mut self, v: i32) -> NodeId {
        let ty = self.types.i32_type();
        self.intern_prim(PrimOp::Lit(Lit::I32(v)), ty, &[])
    }

    pub fn lit_i64(&mut self, v: i64) -> NodeId {
        let ty = self.types.i64_type();
        self.intern_prim(PrimOp::Lit(Lit::I64(v)), ty, &[])
    }

    pub fn lit_f64(&mut self, v: f64) -> NodeId {
        let ty = self.types.f64_type();
        self.intern_prim(PrimOp::Lit(Lit::F64Bits(v.to_bits())), ty, &[])
    }

    /// The undefined value of a type.
    pub fn bottom(&mut self, ty: TypeId) -> NodeId {
        self.intern_prim(PrimOp::Bottom, ty, &[])
    }

    /// Arithmetic with literal folding and the unit identities.
    pub fn arith(&mut self, op: ArithOp, a: NodeId, b: NodeId) -> NodeId {
        let a = self.deref(a);
        let b = self.deref(b);
        if let (Some(x), Some(y)) = (self.as_lit(a), self.as_lit(b)) {
            if let Some(folded) = fold_arith(op, x, y) {
                let ty = self.nodes[a].ty;
                return self.intern_prim(PrimOp::Lit(folded), ty, &[]);
            }
        }
        match op {
            ArithOp::Add => {
                if self.is_int_lit(a, 0) {
                    return b;
                }
                if self.is_int_lit(b, 0) {
                    return a;
                }
            }
            ArithOp::Sub => {
                if self.is_int_lit(b, 0) {
                    return a;
                }
            }
            ArithOp::Mul => {
                if self.is_int_lit(a, 1) {
                    return b;
                }
                if self.is_int_lit(b, 1) {
                    return a;
                }
            }
        }
        let ty = self.nodes[a].ty;
        self.intern_prim(PrimOp::Arith(op), ty, &[a, b])
    }

    /// Comparison with literal folding; result type is bool.
    pub fn cmp(&mut self, op: CmpOp, a: NodeId, b: NodeId) -> NodeId {
        let a = self.deref(a);
        let b = self.deref(b);
        if let (Some(x), Some(y)) = (self.as_lit(a), self.as_lit(b)) {
            if let Some(folded) = fold_cmp(op, x, y) {
                return self.lit_bool(folded);
            }
        }
        let ty = self.types.bool_type();
        self.intern_prim(PrimOp::Cmp(op), ty, &[a, b])
    }

    /// `select(cond, tval, fval)`, folded when the condition is a literal or
    /// both values coincide.
    pub fn select(&mut self, cond: NodeId, tval: NodeId, fval: NodeId) -> NodeId {
        let cond = self.deref(cond);
        let tval = self.deref(tval);
        let fval = self.deref(fval);
        if let Some(Lit::Bool(b)) = self.as_lit(cond) {
            return if b { tval } else { fval };
        }
        if tval == fval {
            return tval;
        }
        let ty = self.nodes[tval].ty;
        debug_assert_eq!(ty, self.nodes[fval].ty, "select arms must agree on type");
        self.intern_prim(PrimOp::Select, ty, &[cond, tval, fval])
    }

    fn is_int_lit(&self, id: NodeId, v: i64) -> bool {
        matches!(self.as_lit(id), Some(Lit::I32(x)) if x as i64 == v)
            || matches!(self.as_lit(id), Some(Lit::I64(x)) if x == v)
    }

    /// Reconstruct a structural node with altered operands, routing through
    /// the folding constructors; unchanged operands yield the node itself.
    pub fn rebuild(&mut self, node: NodeId, new_ops: &[NodeId]) -> NodeId {
        let node = self.deref(node);
        let prim = match &self.nodes[node].op {
            NodeOp::Prim(p) => p.clone(),
            _ => panic!("rebuild requires a structural primop"),
        };
        match prim {
            PrimOp::Lit(_) | PrimOp::Bottom => node,
            PrimOp::Arith(op) => self.arith(op, new_ops[0], new_ops[1]),
            PrimOp::Cmp(op) => self.cmp(op, new_ops[0], new_ops[1]),
            PrimOp::Select => self.select(new_ops[0], new_ops[1], new_ops[2]),
        }
    }

    // =========================================================================
    // Terminators
    // =========================================================================

    /// Point the lambda at `to` with the given arguments, releasing any
    /// previous body.
    pub fn jump(&mut self, lambda: NodeId, to: NodeId, args: &[NodeId]) {
        debug_assert!(self.nodes[lambda].is_lambda());
        self.unset_ops(lambda);
        self.resize_ops(lambda, args.len() + 1);
        self.set_op(lambda, 0, to);
        for (i, &arg) in args.iter().enumerate() {
            self.set_op(lambda, i + 1, arg);
        }
    }

    /// Two-way branch through a `select` of the branch targets.
    pub fn branch(&mut self, lambda: NodeId, cond: NodeId, tto: NodeId, fto: NodeId) {
        let sel = self.select(cond, tto, fto);
        self.jump(lambda, sel, &[]);
    }

    /// Call `to`, continuing in a fresh continuation that receives the
    /// result. Returns the continuation.
    pub fn call(&mut self, lambda: NodeId, to: NodeId, args: &[NodeId], ret_ty: TypeId) -> NodeId {
        let to = self.deref(to);
        let pi = self.types.pi1(ret_ty);
        let name = format!("{}_{}", self.nodes[lambda].name, self.nodes[to].name);
        let next = self.lambda(pi, &name);
        let result_name = self.nodes[to].name.clone();
        self.set_name(self.param(next, 0), &result_name);

        let mut cargs = args.to_vec();
        cargs.push(next);
        self.jump(lambda, to, &cargs);
        next
    }

    /// Like [`call`](Self::call), threading a memory token as the first
    /// result of the continuation.
    pub fn mem_call(
        &mut self,
        lambda: NodeId,
        to: NodeId,
        args: &[NodeId],
        ret_ty: Option<TypeId>,
    ) -> NodeId {
        let to = self.deref(to);
        let mem = self.types.mem();
        let pi = match ret_ty {
            Some(ret) => self.types.pi2(mem, ret),
            None => self.types.pi1(mem),
        };
        let name = format!("{}_{}", self.nodes[lambda].name, self.nodes[to].name);
        let next = self.lambda(pi, &name);
        self.set_name(self.param(next, 0), "mem");
        if ret_ty.is_some() {
            let result_name = self.nodes[to].name.clone();
            self.set_name(self.param(next, 1), &result_name);
        }

        let mut cargs = args.to_vec();
        cargs.push(next);
        self.jump(lambda, to, &cargs);
        next
    }

    // =========================================================================
    // Lambda queries
    // =========================================================================

    /// The jump target, or `INVALID` for an empty lambda.
    pub fn to(&self, lambda: NodeId) -> NodeId {
        self.nodes[lambda].ops.first().copied().unwrap_or(NodeId::INVALID)
    }

    /// Argument slots (operands 1..).
    pub fn args(&self, lambda: NodeId) -> &[NodeId] {
        let ops = &self.nodes[lambda].ops;
        if ops.is_empty() {
            &[]
        } else {
            &ops[1..]
        }
    }

    pub fn num_args(&self, lambda: NodeId) -> usize {
        self.nodes[lambda].ops.len().saturating_sub(1)
    }

    /// The `i`-th argument, which must be set.
    pub fn arg(&self, lambda: NodeId, i: usize) -> NodeId {
        self.op(lambda, i + 1)
    }

    /// Whether the lambda has no body yet.
    pub fn is_body_empty(&self, lambda: NodeId) -> bool {
        self.nodes[lambda].ops.is_empty()
    }

    /// The pi of the current argument types.
    pub fn arg_pi(&mut self, lambda: NodeId) -> TypeId {
        let tys: Vec<TypeId> = self
            .args(lambda)
            .iter()
            .map(|&a| self.nodes[a].ty)
            .collect();
        self.types.pi(&tys)
    }

    pub fn is_basicblock(&self, lambda: NodeId) -> bool {
        self.types.is_basicblock(self.nodes[lambda].ty)
    }

    pub fn is_returning(&self, lambda: NodeId) -> bool {
        self.types.is_returning(self.nodes[lambda].ty)
    }

    /// A continuation whose single use is as an argument of some jump.
    pub fn is_cascading(&self, lambda: NodeId) -> bool {
        match self.nodes[lambda].uses.as_slice() {
            [u] => self.nodes[u.user].is_lambda() && u.index > 0,
            _ => false,
        }
    }

    /// Whether the lambda appears as a non-target operand of some jump.
    pub fn is_passed(&self, lambda: NodeId) -> bool {
        self.nodes[lambda]
            .uses
            .iter()
            .any(|u| self.nodes[u.user].is_lambda() && u.index != 0)
    }

    /// All lambdas reachable through the operand tree: the jump target plus
    /// every continuation passed (possibly nested inside primops).
    pub fn succs(&self, lambda: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut done: FxHashSet<NodeId> = FxHashSet::default();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &op in &self.nodes[lambda].ops {
            if op.is_valid() && done.insert(op) {
                queue.push_back(op);
            }
        }
        while let Some(def) = queue.pop_front() {
            if self.nodes[def].is_lambda() {
                result.push(def);
            } else {
                for &op in &self.nodes[def].ops {
                    if op.is_valid() && done.insert(op) {
                        queue.push_back(op);
                    }
                }
            }
        }
        result
    }

    /// All lambdas that reach this one through their operand trees.
    pub fn preds(&self, lambda: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut done: FxHashSet<NodeId> = FxHashSet::default();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for u in &self.nodes[lambda].uses {
            if done.insert(u.user) {
                queue.push_back(u.user);
            }
        }
        while let Some(def) = queue.pop_front() {
            if self.nodes[def].is_lambda() {
                result.push(def);
            } else {
                for u in &self.nodes[def].uses {
                    if done.insert(u.user) {
                        queue.push_back(u.user);
                    }
                }
            }
        }
        result
    }

    /// Jump-target successors only, looking through a `select` target.
    pub fn direct_succs(&self, lambda: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let Some(&to) = self.nodes[lambda].ops.first() else {
            return result;
        };
        if !to.is_valid() {
            return result;
        }
        match &self.nodes[to].op {
            NodeOp::Lambda(_) => result.push(to),
            NodeOp::Prim(PrimOp::Select) => {
                for &arm in &self.nodes[to].ops[1..] {
                    if self.as_lambda(arm).is_some() {
                        result.push(arm);
                    }
                }
            }
            _ => {}
        }
        result
    }

    /// Lambdas that jump directly to this one, looking through `select`s.
    pub fn direct_preds(&self, lambda: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for u in &self.nodes[lambda].uses {
            match &self.nodes[u.user].op {
                NodeOp::Prim(PrimOp::Select) => {
                    for su in &self.nodes[u.user].uses {
                        debug_assert_eq!(su.index, 0, "select may only appear as a jump target");
                        if self.nodes[su.user].is_lambda() {
                            result.push(su.user);
                        }
                    }
                }
                NodeOp::Lambda(_) if u.index == 0 => result.push(u.user),
                _ => {}
            }
        }
        result
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Collect structural primops unreachable from every lambda's operand
    /// tree. Lambdas and params are never collected.
    pub fn cleanup(&mut self) {
        let pass = self.new_pass();

        let mut stack: Vec<NodeId> = Vec::new();
        for &l in &self.lambdas {
            for &op in self.nodes[l].ops.iter() {
                if op.is_valid() {
                    stack.push(op);
                }
            }
        }
        while let Some(id) = stack.pop() {
            if !self.nodes[id].is_prim() || self.visit(pass, id) {
                continue;
            }
            for &op in self.nodes[id].ops.iter() {
                if op.is_valid() {
                    stack.push(op);
                }
            }
        }

        let dead: Vec<NodeId> = self
            .nodes
            .ids()
            .filter(|&id| {
                let n = &self.nodes[id];
                n.is_prim() && !n.dead && !self.is_visited(pass, id)
            })
            .collect();
        for &id in &dead {
            self.nodes[id].dead = true;
        }
        for &id in &dead {
            for i in 0..self.nodes[id].ops.len() {
                if self.nodes[id].ops[i].is_valid() {
                    self.unset_op(id, i);
                }
            }
        }

        let nodes = &self.nodes;
        self.intern.retain(|_, id| !nodes[*id].dead);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_arith(op: ArithOp, x: Lit, y: Lit) -> Option<Lit> {
    match (x, y) {
        (Lit::I32(a), Lit::I32(b)) => Some(Lit::I32(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
        })),
        (Lit::I64(a), Lit::I64(b)) => Some(Lit::I64(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
        })),
        _ => None,
    }
}

fn fold_cmp(op: CmpOp, x: Lit, y: Lit) -> Option<bool> {
    match (x, y) {
        (Lit::I32(a), Lit::I32(b)) => Some(match op {
            CmpOp::Eq => a == b,
            CmpOp::Lt => a < b,
        }),
        (Lit::I64(a), Lit::I64(b)) => Some(match op {
            CmpOp::Eq => a == b,
            CmpOp::Lt => a < b,
        }),
        (Lit::Bool(a), Lit::Bool(b)) => match op {
            CmpOp::Eq => Some(a == b),
            CmpOp::Lt => None,
        },
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
