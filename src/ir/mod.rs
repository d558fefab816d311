//! The continuation-based intermediate representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): typed ids and append-only node storage
//! - **Types** (`types.rs`): interned pi/prim/generic type table
//! - **Node** (`node.rs`): structural primops and params, nominal lambdas
//! - **World** (`world.rs`): graph owner — creation, interning, replacement,
//!   pass tokens, cleanup
//! - **Construct** (`construct.rs`): incremental SSA-style continuation
//!   construction with trivial-phi elimination
//!
//! # Design Principles
//!
//! - **Ids over pointers**: every edge is a `NodeId` into the world's arena
//! - **Hash-consing**: structurally equal primops share one node
//! - **Use-def chains**: reverse edges are maintained on every operand write
//! - **Pass tokens**: O(1) visited tests without clearing between traversals

pub mod arena;
pub mod construct;
pub mod node;
pub mod types;
pub mod world;

pub use arena::{Arena, BitSet, Id};
pub use node::{ArithOp, CmpOp, LambdaAttr, Lit, Node, NodeId, NodeOp, PrimOp, Use};
pub use types::{GenericMap, PrimType, Type, TypeId, TypeTable};
pub use world::World;
