//! Transactional overlay IR.
//!
//! A lightweight object graph that shadows a `veil_ir` module one node at a
//! time while keeping both graphs synchronized through every structural
//! edit, plus a checkpoint protocol that makes any sequence of edits
//! reversible:
//!
//! ```text
//! let mut ctx = Context::new(module);
//! ctx.create_function(f);
//! ctx.save();                      // checkpoint
//! ctx.remove_from_parent(inst);    // speculative edits ...
//! ctx.set_operand(user, 0, other);
//! if profitable { ctx.accept() } else { ctx.revert() }
//! ```
//!
//! # Core Components
//!
//! - **Handles** (`handle.rs`): Generation-checked value handles
//! - **Kinds** (`kind.rs`): The closed subclass-tag and opcode enumerations
//! - **Values** (`value.rs`): Per-value storage and mirrored structure
//! - **Uses** (`uses.rs`): Operand edges and their iterators
//! - **Context** (`context.rs`): Registry, factories and the checkpoint
//!   protocol
//! - **Ops** (`ops.rs`): The operand protocol and instruction lifecycle
//! - **Views** (`views.rs`): Typed per-kind accessors and constructors
//! - **Tracker** (`tracker.rs`): The undo log
//! - **Verify** (`verify.rs`): On-demand structural validation
//!
//! # Design Principles
//!
//! - **Dual-graph consistency**: Every overlay value maps bijectively to an
//!   underlying node; every edit lands on both graphs before anyone can
//!   observe either
//! - **One funnel**: All operand mutation goes through `set_operand`, all
//!   structural mutation through five lifecycle primitives, so tracking is
//!   attached in exactly five places
//! - **Opt-in cost**: Outside a session, edits pay no tracking overhead;
//!   reverse-edge queries are linear-time projections, not cached counts
//!
//! The embedding system drives exactly one thread through one context at a
//! time; there is no internal locking.

pub mod context;
pub mod handle;
pub mod kind;
pub mod ops;
pub mod tracker;
pub mod uses;
pub mod value;
pub mod verify;
pub mod views;

pub use context::{Context, ContextConfig};
pub use handle::ValueId;
pub use kind::{Opcode, ValueKind};
pub use tracker::Tracker;
pub use uses::{OperandUses, Use, ValueUses};
pub use verify::{verify, VerifyError};
