//! Base intermediate representation for the Veil overlay.
//!
//! This crate provides the lower-level program representation that
//! `veil_overlay` shadows:
//!
//! - **Arena** (`arena.rs`): Typed identifiers and slot storage with
//!   permanently-vacated slots, so node identity is never recycled
//! - **Types** (`types.rs`): Scalar type descriptors
//! - **Node** (`node.rs`): Node taxonomy (functions, blocks, arguments,
//!   constants, instructions) and per-node storage
//! - **Module** (`module.rs`): The owning container with builders, queries,
//!   and in-place structural mutators
//!
//! # Design Principles
//!
//! - **Arena allocation**: O(1) node creation, identity by index
//! - **Incremental use lists**: Every operand mutation keeps the reverse
//!   edges of both the old and new operand current
//! - **In-place mutation**: Operand replacement, block splicing, unlinking
//!   and freeing are synchronous and immediately visible to callers

pub mod arena;
pub mod module;
pub mod node;
pub mod types;

pub use arena::{Arena, Id};
pub use module::Module;
pub use node::{CastOp, ConstValue, InstOp, MemFlags, Node, NodeId, NodeKind, UseSite};
pub use types::Ty;
