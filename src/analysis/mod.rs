//! Analyses over the continuation graph.
//!
//! - **Scope** (`scope.rs`): region extraction and RPO numbering
//! - **DomTree** (`domtree.rs`): forward and backward dominator trees
//! - **LoopTree** (`looptree.rs`): natural-loop forest
//! - **Verify** (`verify.rs`): structural call-site checks

pub mod domtree;
pub mod looptree;
pub mod scope;
pub mod verify;

pub use domtree::DomTree;
pub use looptree::{Loop, LoopTree};
pub use scope::{top_level_entries, Scope};
pub use verify::{debug_verify, verify};
