//! The undo engine.
//!
//! The tracker records a linear log of reversible change records while a
//! session is open. There are exactly four record kinds, one per reversible
//! edit class; each carries the state its inverse needs, captured at
//! forward-edit time rather than recomputed at rollback time.
//!
//! State machine: *idle* ⇄ *recording*. `save` opens a session (a second
//! `save` is a warned no-op; sessions do not nest). The context drains the
//! log on `revert` (reverse replay) and `accept` (finalize erasures).
//!
//! Outside a session every mutator skips the tracker entirely, so tracking
//! is opt-in rather than a permanent tax on every edit.

use crate::handle::ValueId;
use crate::value::ValueData;
use smallvec::SmallVec;
use veil_ir::NodeId;

// =============================================================================
// Change Records
// =============================================================================

/// Snapshot captured by a tracked erasure: everything needed to reconstruct
/// the instruction, its operand edges and its position on rollback, and to
/// finalize the erasure on commit.
#[derive(Debug)]
pub(crate) struct EraseSnapshot {
    /// Handle of the erased instruction. Still resolvable on rollback: the
    /// slot is detached, not freed, until the session commits.
    pub(crate) value: ValueId,
    /// The underlying node, unlinked but not yet freed.
    pub(crate) node: NodeId,
    /// The detached overlay payload.
    pub(crate) data: ValueData,
    /// Operand list at erasure time.
    pub(crate) operands: SmallVec<[NodeId; 4]>,
    /// Block and position at erasure time.
    pub(crate) block: ValueId,
    pub(crate) index: usize,
}

/// One reversible edit.
#[derive(Debug)]
pub(crate) enum Change {
    /// Operand `slot` of `user` previously referenced `old`.
    OperandSet {
        user: ValueId,
        slot: u32,
        old: ValueId,
    },
    /// `inst` was spliced into a block: inserted fresh (`old` is `None`) or
    /// moved from a captured prior location.
    Splice {
        inst: ValueId,
        old: Option<(ValueId, usize)>,
    },
    /// `inst` was unlinked from `block` at `index`.
    Unlink {
        inst: ValueId,
        block: ValueId,
        index: usize,
    },
    /// `inst` was erased; the snapshot can reconstruct it.
    Erase(Box<EraseSnapshot>),
}

// =============================================================================
// Tracker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
}

/// Append-only change log with a checkpoint protocol.
#[derive(Debug)]
pub struct Tracker {
    state: State,
    log: Vec<Change>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Tracker {
            state: State::Idle,
            log: Vec::new(),
        }
    }

    /// Open a session. A second `save` while recording is a warned no-op.
    pub(crate) fn save(&mut self) {
        if self.state == State::Recording {
            tracing::warn!("save() while a session is already open; sessions do not nest");
            return;
        }
        self.state = State::Recording;
        tracing::debug!("opened tracking session");
    }

    /// Check if a session is open.
    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.state == State::Recording
    }

    /// Number of records in the open session.
    #[inline]
    pub fn num_records(&self) -> usize {
        self.log.len()
    }

    /// Append a record. Callers check `is_tracking` first.
    pub(crate) fn push(&mut self, change: Change) {
        debug_assert!(self.is_tracking(), "pushed a record with no open session");
        self.log.push(change);
    }

    /// Close the session and hand the log to the caller.
    pub(crate) fn take_log(&mut self) -> Vec<Change> {
        assert!(
            self.is_tracking(),
            "closing a tracking session that was never opened"
        );
        self.state = State::Idle;
        std::mem::take(&mut self.log)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let mut t = Tracker::new();
        assert!(!t.is_tracking());

        t.save();
        assert!(t.is_tracking());
        t.push(Change::Splice {
            inst: ValueId::INVALID,
            old: None,
        });
        assert_eq!(t.num_records(), 1);

        let log = t.take_log();
        assert_eq!(log.len(), 1);
        assert!(!t.is_tracking());
        assert_eq!(t.num_records(), 0);
    }

    #[test]
    fn test_double_save_is_noop() {
        let mut t = Tracker::new();
        t.save();
        t.push(Change::Splice {
            inst: ValueId::INVALID,
            old: None,
        });
        t.save();
        // The open session and its log survive.
        assert!(t.is_tracking());
        assert_eq!(t.num_records(), 1);
    }

    #[test]
    #[should_panic(expected = "never opened")]
    fn test_take_log_idle_panics() {
        let mut t = Tracker::new();
        let _ = t.take_log();
    }
}
