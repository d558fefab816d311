//! Graph rewrites.
//!
//! - **Mangle** (`mangle.rs`): drop/lift/clone specialization of a scope
//! - **Lower2CFF** (`lower2cff.rs`): fixed-point lowering of higher-order
//!   calls into direct first-order calls

pub mod lower2cff;
pub mod mangle;

pub use lower2cff::lower2cff;
pub use mangle::mangle;
