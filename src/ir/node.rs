//! IR node definitions.
//!
//! Nodes split into two identity regimes:
//!
//! - **Structural** nodes (primops and params) are value-like. Primops are
//!   hash-consed by the [`World`](super::world::World): two constructions
//!   with the same (op, type, operands) yield the same id. A param's
//!   identity is its (owning lambda, index) pair.
//! - **Nominal** nodes (lambdas) are identity-bearing continuations: two
//!   lambdas with identical operand lists are still distinct.
//!
//! Operand slots hold plain [`NodeId`]s, with [`Id::INVALID`] marking an
//! unset slot. The reverse edges live in a per-node sorted `uses` list.

use std::cell::Cell;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::arena::Id;
use super::types::TypeId;

/// Id of a node. The raw index is the node's gid: monotonic, assigned at
/// creation, never reused.
pub type NodeId = Id<Node>;

/// A reverse edge: `user` has this node as its `index`-th operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Use {
    pub user: NodeId,
    pub index: usize,
}

/// Primitive literal values. Floats are kept as raw bits so literals stay
/// `Eq`/`Hash` for interning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lit {
    Bool(bool),
    I32(i32),
    I64(i64),
    F64Bits(u64),
}

/// Arithmetic primop kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// Comparison primop kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Lt,
}

/// Pure, hash-consed operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Lit(Lit),
    /// The undefined value of a type.
    Bottom,
    /// `select(cond, tval, fval)`.
    Select,
    Arith(ArithOp),
    Cmp(CmpOp),
}

/// The node kind tag with its per-kind payload.
#[derive(Debug)]
pub enum NodeOp {
    Prim(PrimOp),
    /// The `index`-th formal parameter of `lambda`.
    Param { lambda: NodeId, index: usize },
    Lambda(Box<LambdaData>),
}

/// Continuation attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LambdaAttr {
    pub is_extern: bool,
}

/// A deferred parameter fix-up queued on an unsealed lambda: once the
/// lambda's predecessors are final, the value for `handle` is written into
/// each predecessor's argument slot for param `index`.
#[derive(Debug, Clone)]
pub struct Todo {
    pub handle: usize,
    pub index: usize,
    pub ty: TypeId,
    pub name: String,
}

/// Nominal payload of a lambda node.
///
/// Operand slot 0 is the jump target, slots 1..n the arguments. The
/// SSA-construction state (`values`, `todos`, `sealed`, `in_flight`,
/// `parent`) only matters while the surrounding function is being built.
#[derive(Debug)]
pub struct LambdaData {
    pub(crate) params: Vec<NodeId>,
    pub(crate) attr: LambdaAttr,
    /// Enclosing construction parent; self for function heads.
    pub(crate) parent: NodeId,
    pub(crate) sealed: bool,
    /// Guards against phi-lookup cycles during construction.
    pub(crate) in_flight: bool,
    /// Current value per slot handle.
    pub(crate) values: FxHashMap<usize, NodeId>,
    pub(crate) todos: Vec<Todo>,
}

/// One node of the graph.
pub struct Node {
    pub(crate) op: NodeOp,
    pub(crate) ty: TypeId,
    pub(crate) ops: SmallVec<[NodeId; 4]>,
    /// Reverse edges, sorted by (user, index).
    pub(crate) uses: Vec<Use>,
    /// Forwarding pointer for in-place replacement; self when live.
    pub(crate) repr: Cell<NodeId>,
    /// Visit stamp for pass-token traversals.
    pub(crate) last_pass: Cell<u64>,
    /// Set by cleanup when the node is collected.
    pub(crate) dead: bool,
    pub(crate) name: String,
}

impl Node {
    pub(crate) fn new(id: NodeId, op: NodeOp, ty: TypeId, ops: SmallVec<[NodeId; 4]>) -> Self {
        Node {
            op,
            ty,
            ops,
            uses: Vec::new(),
            repr: Cell::new(id),
            last_pass: Cell::new(0),
            dead: false,
            name: String::new(),
        }
    }

    #[inline]
    pub fn is_lambda(&self) -> bool {
        matches!(self.op, NodeOp::Lambda(_))
    }

    #[inline]
    pub fn is_param(&self) -> bool {
        matches!(self.op, NodeOp::Param { .. })
    }

    #[inline]
    pub fn is_prim(&self) -> bool {
        matches!(self.op, NodeOp::Prim(_))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op)
            .field("ty", &self.ty)
            .field("ops", &self.ops)
            .field("name", &self.name)
            .finish()
    }
}
