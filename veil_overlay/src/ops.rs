//! Structural operations: the operand protocol and the instruction
//! lifecycle.
//!
//! Every mutation in the system funnels through five primitives defined
//! here: `set_operand`, insertion, unlinking, moving and erasure. Each
//! primitive (1) performs the edit on the underlying module, (2) performs
//! the mirrored edit on the overlay, and (3) pushes one inverse record if a
//! tracking session is open. Everything else (`swap_operands`,
//! `replace_uses_of_with`, `replace_all_uses_with`, the typed views) is
//! expressed in terms of these primitives and is therefore undo-safe with
//! no extra machinery.
//!
//! Instruction lifecycle: *unattached* -> `insert_*` -> *attached* ->
//! `remove_from_parent` -> *unattached*, `move_*` (attached to attached),
//! `erase_from_parent` (attached to erased). Violating a transition
//! precondition panics.

use crate::context::Context;
use crate::handle::ValueId;
use crate::kind::{self, ValueKind};
use crate::tracker::{Change, EraseSnapshot};
use crate::uses::{OperandUses, Use};
use smallvec::SmallVec;
use veil_ir::{NodeId, UseSite};

impl Context {
    // =========================================================================
    // Operand Protocol
    // =========================================================================

    /// Number of operands of a user value.
    #[inline]
    pub fn num_operands(&self, user: ValueId) -> u32 {
        assert!(self.is_user(user), "num_operands on a non-user value");
        self.ir.operands(self.node_of(user)).len() as u32
    }

    /// The operand edge for `index`. Unlike the public `operand_use`, this
    /// accepts `index == num_operands` and yields the end edge used for
    /// iteration termination.
    pub(crate) fn operand_use_internal(&self, user: ValueId, index: u32) -> Use {
        Use::new(user, kind::operand_slot(self.kind(user), index))
    }

    /// The operand edge for `index`.
    pub fn operand_use(&self, user: ValueId, index: u32) -> Use {
        let n = self.num_operands(user);
        assert!(index < n, "operand index {index} out of range (user has {n})");
        self.operand_use_internal(user, index)
    }

    /// The value referenced by operand `index`.
    #[inline]
    pub fn operand(&self, user: ValueId, index: u32) -> ValueId {
        self.operand_use(user, index).get(self)
    }

    /// Iterate a user's operand edges. Reaches the end edge in exactly
    /// `num_operands` steps.
    pub fn operand_uses(&self, user: ValueId) -> OperandUses {
        let n = self.num_operands(user);
        OperandUses::new(
            self.operand_use_internal(user, 0),
            self.operand_use_internal(user, n),
        )
    }

    /// Iterate a user's operand values.
    pub fn operands(&self, user: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        self.operand_uses(user).map(|u| u.get(self))
    }

    /// Rewrite operand `index` of `user` to reference `value`.
    ///
    /// Updates the underlying slot (and with it the reverse edges of both
    /// the old and the new value) and logs the inverse when tracked.
    pub fn set_operand(&mut self, user: ValueId, index: u32, value: ValueId) {
        assert!(self.is_user(user), "set_operand on a non-user value");
        let n = self.num_operands(user);
        assert!(index < n, "operand index {index} out of range (user has {n})");
        let slot = kind::operand_slot(self.kind(user), index);

        let user_node = self.node_of(user);
        let value_node = self.node_of(value);

        if self.tracker.is_tracking() {
            let old_node = self.ir.operands(user_node)[slot as usize];
            let old = self
                .get_value(old_node)
                .expect("operand of a materialized user is not materialized");
            self.tracker.push(Change::OperandSet { user, slot, old });
        }
        self.ir.set_operand(user_node, slot, value_node);
    }

    /// Exchange the contents of operands `a` and `b`. Two tracked sets.
    pub fn swap_operands(&mut self, user: ValueId, a: u32, b: u32) {
        let ua = self.operand_use(user, a);
        let ub = self.operand_use(user, b);
        ua.swap(self, ub);
    }

    /// Replace every operand of `user` matching `from` with `to`. Returns
    /// whether any operand was replaced.
    pub fn replace_uses_of_with(&mut self, user: ValueId, from: ValueId, to: ValueId) -> bool {
        let mut changed = false;
        for index in 0..self.num_operands(user) {
            if self.operand(user, index) == from {
                self.set_operand(user, index, to);
                changed = true;
            }
        }
        changed
    }

    // =========================================================================
    // Value-Level Replacement
    // =========================================================================

    /// Rewrite every reverse edge of `old` to reference `new`. Users that
    /// are not yet materialized are materialized first, so the whole
    /// replacement is tracked.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "replacing a value's uses with itself");
        let old_node = self.node_of(old);
        let sites: SmallVec<[UseSite; 8]> = self.ir.uses(old_node).iter().copied().collect();
        for site in sites {
            let user = self.get_or_create_value(site.user);
            let index = kind::operand_index(self.kind(user), site.slot);
            self.set_operand(user, index, new);
        }
    }

    /// Like `replace_all_uses_with`, restricted to edges the predicate
    /// accepts.
    pub fn replace_uses_with_if<F>(&mut self, old: ValueId, new: ValueId, mut should_replace: F)
    where
        F: FnMut(&Context, Use) -> bool,
    {
        assert_ne!(old, new, "replacing a value's uses with itself");
        let old_node = self.node_of(old);
        let sites: SmallVec<[UseSite; 8]> = self.ir.uses(old_node).iter().copied().collect();
        for site in sites {
            let user = self.get_or_create_value(site.user);
            let edge = Use::new(user, site.slot);
            if should_replace(self, edge) {
                let index = kind::operand_index(self.kind(user), site.slot);
                self.set_operand(user, index, new);
            }
        }
    }

    // =========================================================================
    // Lifecycle Internals (no tracking)
    // =========================================================================

    pub(crate) fn insert_internal(&mut self, inst: ValueId, block: ValueId, index: usize) {
        debug_assert!(self.data(inst).parent().is_none());
        let block_node = self.node_of(block);
        let inst_node = self.node_of(inst);
        self.ir.insert_inst(block_node, index, inst_node);
        self.data_mut(block).block_insts_mut().insert(index, inst);
        self.data_mut(inst).set_parent(Some(block));
    }

    pub(crate) fn unlink_internal(&mut self, inst: ValueId) -> (ValueId, usize) {
        let block = self
            .data(inst)
            .parent()
            .expect("instruction is not attached to a block");
        let index = self
            .data(block)
            .block_insts()
            .iter()
            .position(|&i| i == inst)
            .expect("instruction missing from its parent's order");
        let inst_node = self.node_of(inst);
        self.ir.unlink_inst(inst_node);
        self.data_mut(block).block_insts_mut().remove(index);
        self.data_mut(inst).set_parent(None);
        (block, index)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Insert an unattached instruction into `block` at `index`.
    pub fn insert_into(&mut self, inst: ValueId, block: ValueId, index: usize) {
        assert!(self.is_instruction(inst), "inserting a non-instruction");
        assert_eq!(self.kind(block), ValueKind::Block, "expected a block");
        assert!(
            self.data(inst).parent().is_none(),
            "inserting an instruction that is already attached"
        );
        assert!(
            index <= self.data(block).block_insts().len(),
            "insertion index out of range"
        );
        self.insert_internal(inst, block, index);
        if self.tracker.is_tracking() {
            self.tracker.push(Change::Splice { inst, old: None });
        }
    }

    /// Insert an unattached instruction immediately before `before`.
    pub fn insert_before(&mut self, inst: ValueId, before: ValueId) {
        let block = self
            .data(before)
            .parent()
            .expect("insertion point is not attached to a block");
        let index = self.position_of(before).expect("attached instruction has a position");
        self.insert_into(inst, block, index);
    }

    /// Insert an unattached instruction immediately after `after`.
    pub fn insert_after(&mut self, inst: ValueId, after: ValueId) {
        let block = self
            .data(after)
            .parent()
            .expect("insertion point is not attached to a block");
        let index = self.position_of(after).expect("attached instruction has a position");
        self.insert_into(inst, block, index + 1);
    }

    /// Detach an instruction from its block without destroying it. The
    /// instruction stays valid and re-insertable.
    pub fn remove_from_parent(&mut self, inst: ValueId) {
        let (block, index) = self.unlink_internal(inst);
        if self.tracker.is_tracking() {
            self.tracker.push(Change::Unlink { inst, block, index });
        }
    }

    /// Move an attached instruction to `index` in `block` (the position is
    /// interpreted with the instruction already removed). One reversible
    /// step, not a remove plus an insert.
    pub fn move_before(&mut self, inst: ValueId, block: ValueId, index: usize) {
        assert_eq!(self.kind(block), ValueKind::Block, "expected a block");
        let old = self.unlink_internal(inst);
        assert!(
            index <= self.data(block).block_insts().len(),
            "move index out of range"
        );
        self.insert_internal(inst, block, index);
        if self.tracker.is_tracking() {
            self.tracker.push(Change::Splice {
                inst,
                old: Some(old),
            });
        }
    }

    /// Move an attached instruction immediately before `before`.
    pub fn move_before_inst(&mut self, inst: ValueId, before: ValueId) {
        assert_ne!(inst, before, "moving an instruction before itself");
        let old = self.unlink_internal(inst);
        let block = self
            .data(before)
            .parent()
            .expect("move target is not attached to a block");
        let index = self.position_of(before).expect("attached instruction has a position");
        self.insert_internal(inst, block, index);
        if self.tracker.is_tracking() {
            self.tracker.push(Change::Splice {
                inst,
                old: Some(old),
            });
        }
    }

    /// Move an attached instruction immediately after `after`.
    pub fn move_after_inst(&mut self, inst: ValueId, after: ValueId) {
        assert_ne!(inst, after, "moving an instruction after itself");
        let old = self.unlink_internal(inst);
        let block = self
            .data(after)
            .parent()
            .expect("move target is not attached to a block");
        let index = self.position_of(after).expect("attached instruction has a position");
        self.insert_internal(inst, block, index + 1);
        if self.tracker.is_tracking() {
            self.tracker.push(Change::Splice {
                inst,
                old: Some(old),
            });
        }
    }

    /// Detach an instruction and destroy it. The instruction must have no
    /// remaining uses. Untracked, storage is freed immediately and the
    /// handle goes stale; tracked, the erasure is held in the log so
    /// `revert` can reconstruct it and `accept` finalizes it.
    pub fn erase_from_parent(&mut self, inst: ValueId) {
        assert!(self.is_instruction(inst), "erasing a non-instruction");
        let node = self.node_of(inst);
        assert!(
            self.ir.uses(node).is_empty(),
            "erasing an instruction that still has uses"
        );
        let (block, index) = self.unlink_internal(inst);
        let operands: SmallVec<[NodeId; 4]> = self.ir.take_operands(node).into_iter().collect();
        let data = self.detach_value(inst);

        if self.tracker.is_tracking() {
            self.tracker.push(Change::Erase(Box::new(EraseSnapshot {
                value: inst,
                node,
                data,
                operands,
                block,
                index,
            })));
        } else {
            self.ir.free_node(node);
            self.values.free(inst);
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// The block containing an instruction, or `None` if unattached.
    #[inline]
    pub fn parent(&self, inst: ValueId) -> Option<ValueId> {
        self.data(inst).parent()
    }

    /// Position of an attached instruction within its block.
    pub fn position_of(&self, inst: ValueId) -> Option<usize> {
        let block = self.parent(inst)?;
        self.data(block)
            .block_insts()
            .iter()
            .position(|&i| i == inst)
    }

    /// The next instruction in the block, or `None` at the end.
    pub fn next_inst(&self, inst: ValueId) -> Option<ValueId> {
        let block = self.parent(inst)?;
        let index = self.position_of(inst)?;
        self.data(block).block_insts().get(index + 1).copied()
    }

    /// The previous instruction in the block, or `None` at the beginning.
    pub fn prev_inst(&self, inst: ValueId) -> Option<ValueId> {
        let block = self.parent(inst)?;
        let index = self.position_of(inst)?;
        self.data(block).block_insts().get(index.checked_sub(1)?).copied()
    }

    // =========================================================================
    // Block Access
    // =========================================================================

    /// Ordered instructions of a block.
    pub fn block_insts(&self, block: ValueId) -> &[ValueId] {
        self.data(block).block_insts()
    }

    /// Iterate a block's instructions. Reverse iteration is the same
    /// storage walked backwards.
    pub fn insts(&self, block: ValueId) -> impl DoubleEndedIterator<Item = ValueId> + '_ {
        self.data(block).block_insts().iter().copied()
    }

    /// Check if a block has no instructions.
    pub fn block_is_empty(&self, block: ValueId) -> bool {
        self.data(block).block_insts().is_empty()
    }

    /// The last instruction of a non-empty block.
    pub fn terminator(&self, block: ValueId) -> ValueId {
        *self
            .data(block)
            .block_insts()
            .last()
            .expect("terminator of an empty block")
    }

    /// First instruction of a block.
    pub fn front(&self, block: ValueId) -> Option<ValueId> {
        self.data(block).block_insts().first().copied()
    }

    /// Last instruction of a block.
    pub fn back(&self, block: ValueId) -> Option<ValueId> {
        self.data(block).block_insts().last().copied()
    }
}

// =============================================================================
// Tests
// =============================================================================
