//! Continuation-based compiler IR core.
//!
//! Programs are graphs of continuations: each lambda is a basic block with
//! typed params whose whole body is a single jump with arguments. Pure
//! values are hash-consed primops. On this graph the crate provides scope
//! extraction, reverse-postorder numbering, dominator and post-dominator
//! trees, loop forests, specialization by parameter dropping and free-value
//! lifting, and the lowering of higher-order calls into
//! continuation-passing first-order form.

pub mod analysis;
pub mod ir;
pub mod transform;

pub use analysis::{debug_verify, verify, DomTree, LoopTree, Scope};
pub use ir::{
    ArithOp, CmpOp, GenericMap, LambdaAttr, Lit, NodeId, PrimType, TypeId, World,
};
pub use transform::{lower2cff, mangle};
