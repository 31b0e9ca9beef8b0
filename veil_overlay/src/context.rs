//! The context: registry, owner, and transaction boundary.
//!
//! The context is the dual-graph synchronizer. It owns the underlying
//! `Module`, the slot arena holding every overlay value, the map from
//! underlying node identity to overlay value (a partial injection, lazily
//! populated), and the tracker. It is the sole factory for overlay values
//! and the only way to mutate the underlying module once it has been handed
//! over, so every structural edit is mirrored on both graphs before anyone
//! can observe either.
//!
//! Registration happens before content materialization, so cyclic
//! references (a branch targeting its own block) terminate.

use crate::handle::{SlotArena, ValueId};
use crate::kind::{self, Opcode, ValueKind};
use crate::tracker::{Change, Tracker};
use crate::uses::{Use, ValueUses};
use crate::value::{Payload, ValueData};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use veil_ir::{ConstValue, InstOp, Module, NodeId, NodeKind, Ty};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for a context.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Initial capacity of the overlay value arena.
    pub value_capacity: usize,
    /// Run the structural validator at the end of every `revert`, panicking
    /// on any inconsistency. Intended for test harnesses.
    pub verify_after_revert: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            value_capacity: 256,
            verify_after_revert: false,
        }
    }
}

impl ContextConfig {
    /// Configuration for tests: small arenas, validation after every revert.
    pub fn for_testing() -> Self {
        ContextConfig {
            value_capacity: 64,
            verify_after_revert: true,
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Owner of one overlay graph and its underlying module.
pub struct Context {
    pub(crate) ir: Module,
    pub(crate) values: SlotArena<ValueData>,
    pub(crate) map: FxHashMap<NodeId, ValueId>,
    pub(crate) tracker: Tracker,
    config: ContextConfig,
    next_uid: u32,
}

impl Context {
    /// Take ownership of a module and build an empty overlay over it.
    pub fn new(ir: Module) -> Self {
        Self::with_config(ir, ContextConfig::default())
    }

    /// Like `new`, with explicit configuration.
    pub fn with_config(ir: Module, config: ContextConfig) -> Self {
        Context {
            ir,
            values: SlotArena::with_capacity(config.value_capacity),
            map: FxHashMap::default(),
            tracker: Tracker::new(),
            config,
            next_uid: 0,
        }
    }

    /// Read-only view of the underlying module. All mutation goes through
    /// overlay operations.
    #[inline]
    pub fn ir(&self) -> &Module {
        &self.ir
    }

    /// Tear down the overlay and hand the module back.
    pub fn into_ir(self) -> Module {
        assert!(
            !self.tracker.is_tracking(),
            "tearing down a context with an open tracking session"
        );
        self.ir
    }

    /// Number of values registered with the context.
    #[inline]
    pub fn num_values(&self) -> usize {
        self.map.len()
    }

    // =========================================================================
    // Internal Access
    // =========================================================================

    #[inline]
    pub(crate) fn data(&self, v: ValueId) -> &ValueData {
        self.values
            .get(v)
            .unwrap_or_else(|| panic!("stale or detached value handle {v:?}"))
    }

    #[inline]
    pub(crate) fn data_mut(&mut self, v: ValueId) -> &mut ValueData {
        self.values
            .get_mut(v)
            .unwrap_or_else(|| panic!("stale or detached value handle {v:?}"))
    }

    /// The underlying node a value shadows.
    #[inline]
    pub(crate) fn node_of(&self, v: ValueId) -> NodeId {
        self.data(v).node
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Look up the overlay value for an underlying node, if materialized.
    #[inline]
    pub fn get_value(&self, node: NodeId) -> Option<ValueId> {
        self.map.get(&node).copied()
    }

    /// Get the overlay value for an underlying node, creating it (and, for
    /// blocks, its contents) on first request.
    pub fn get_or_create_value(&mut self, node: NodeId) -> ValueId {
        if let Some(&v) = self.map.get(&node) {
            return v;
        }

        enum Tag {
            Plain(ValueKind),
            Block,
            Inst(InstOp),
        }
        let tag = match self.ir.node(node).kind() {
            NodeKind::Argument { .. } => Tag::Plain(ValueKind::Argument),
            NodeKind::Constant(_) => Tag::Plain(ValueKind::Constant),
            NodeKind::Function { .. } => Tag::Plain(ValueKind::Function),
            NodeKind::Block { .. } => Tag::Block,
            NodeKind::Inst(op) => Tag::Inst(*op),
        };

        let uid = self.next_uid;
        self.next_uid += 1;

        match tag {
            Tag::Plain(k) => {
                let v = self.values.alloc(ValueData::plain(k, node, uid));
                self.map.insert(node, v);
                v
            }
            Tag::Block => {
                let v = self.values.alloc(ValueData::block(node, uid));
                self.map.insert(node, v);
                self.materialize_block(v, node);
                v
            }
            Tag::Inst(op) => {
                let (k, opcode) = kind::classify_inst(op);
                if k == ValueKind::Opaque {
                    tracing::debug!(op = ?op, "no dedicated overlay kind; using opaque");
                }
                let v = self.values.alloc(ValueData::inst(k, opcode, node, uid));
                self.map.insert(node, v);
                // The parent link is assigned by block materialization (or
                // by insertion, for factory-created instructions).
                // Operands are resolved eagerly so reads never need to
                // create values.
                for op_node in self.ir.operands(node).to_vec() {
                    self.get_or_create_value(op_node);
                }
                v
            }
        }
    }

    /// Walk the underlying block once, creating (or reusing) one overlay
    /// instruction per underlying instruction, in order.
    fn materialize_block(&mut self, block: ValueId, node: NodeId) {
        for inst_node in self.ir.block_insts(node).to_vec() {
            let iv = self.get_or_create_value(inst_node);
            self.data_mut(iv).set_parent(Some(block));
            self.data_mut(block).block_insts_mut().push(iv);
        }
    }

    /// Bulk-materialize an entire function: arguments, then every block and
    /// its instructions. This is the main entry point for building overlay
    /// state.
    pub fn create_function(&mut self, func: NodeId) -> ValueId {
        assert!(
            matches!(self.ir.node(func).kind(), NodeKind::Function { .. }),
            "create_function on a non-function node"
        );
        let fv = self.get_or_create_value(func);
        for arg in self.ir.func_args(func).to_vec() {
            self.get_or_create_value(arg);
        }
        for block in self.ir.func_blocks(func).to_vec() {
            self.get_or_create_value(block);
        }
        tracing::debug!(
            name = self.ir.func_name(func),
            values = self.num_values(),
            "materialized function"
        );
        fv
    }

    /// Remove a value's registry entry and hand its payload to the caller.
    /// Used by erasure; the slot is left detached, not freed.
    pub(crate) fn detach_value(&mut self, v: ValueId) -> ValueData {
        let data = self
            .values
            .detach(v)
            .unwrap_or_else(|| panic!("detaching a stale value handle {v:?}"));
        self.map.remove(&data.node);
        data
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Create a new unattached instruction over a fresh underlying node.
    /// Operands must already be materialized values of this context.
    pub fn create_instruction(&mut self, op: InstOp, ty: Ty, operands: &[ValueId]) -> ValueId {
        let nodes: SmallVec<[NodeId; 4]> =
            operands.iter().map(|&v| self.node_of(v)).collect();
        let node = self.ir.new_inst(op, ty, &nodes);
        self.get_or_create_value(node)
    }

    /// Create a constant over a fresh underlying node.
    pub fn create_constant(&mut self, value: ConstValue, ty: Ty) -> ValueId {
        let node = self.ir.new_const(value, ty);
        self.get_or_create_value(node)
    }

    // =========================================================================
    // Checkpoint Protocol
    // =========================================================================

    /// The undo engine behind this context.
    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Check if a tracking session is open.
    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// Open a tracking session (checkpoint). Convenience for the tracker.
    pub fn save(&mut self) {
        self.tracker.save();
    }

    /// Roll back every edit made since `save`, in strict reverse order, and
    /// close the session.
    pub fn revert(&mut self) {
        let log = self.tracker.take_log();
        let records = log.len();
        for change in log.into_iter().rev() {
            self.apply_inverse(change);
        }
        tracing::debug!(records, "reverted tracking session");
        if self.config.verify_after_revert {
            if let Err(e) = crate::verify::verify(self) {
                panic!("structural verification failed after revert: {e}");
            }
        }
    }

    /// Commit every edit made since `save`: finalize erasures and close the
    /// session without replaying anything.
    pub fn accept(&mut self) {
        let log = self.tracker.take_log();
        let records = log.len();
        for change in log {
            if let Change::Erase(snap) = change {
                self.ir.free_node(snap.node);
                self.values.free(snap.value);
            }
        }
        tracing::debug!(records, "accepted tracking session");
    }

    fn apply_inverse(&mut self, change: Change) {
        match change {
            Change::OperandSet { user, slot, old } => {
                let user_node = self.node_of(user);
                let old_node = self.node_of(old);
                self.ir.set_operand(user_node, slot, old_node);
            }
            Change::Splice { inst, old } => {
                self.unlink_internal(inst);
                if let Some((block, index)) = old {
                    self.insert_internal(inst, block, index);
                }
            }
            Change::Unlink { inst, block, index } => {
                self.insert_internal(inst, block, index);
            }
            Change::Erase(snap) => {
                let snap = *snap;
                self.map.insert(snap.node, snap.value);
                self.values.restore(snap.value, snap.data);
                self.ir.restore_operands(snap.node, &snap.operands);
                self.insert_internal(snap.value, snap.block, snap.index);
            }
        }
    }

    // =========================================================================
    // Value API
    // =========================================================================

    /// Subclass tag of a value.
    #[inline]
    pub fn kind(&self, v: ValueId) -> ValueKind {
        self.data(v).kind
    }

    /// Type of a value, projected from the underlying node.
    #[inline]
    pub fn ty(&self, v: ValueId) -> Ty {
        self.ir.node(self.node_of(v)).ty()
    }

    /// Opcode of an instruction value.
    #[inline]
    pub fn opcode(&self, v: ValueId) -> Opcode {
        self.data(v).opcode()
    }

    /// The underlying node a value shadows.
    #[inline]
    pub fn underlying(&self, v: ValueId) -> NodeId {
        self.node_of(v)
    }

    /// Stable debug identity of a value within this context.
    #[inline]
    pub fn uid(&self, v: ValueId) -> u32 {
        self.data(v).uid
    }

    /// Check if a value is an instruction.
    #[inline]
    pub fn is_instruction(&self, v: ValueId) -> bool {
        self.data(v).kind.is_instruction()
    }

    /// Check if a value has operands.
    #[inline]
    pub fn is_user(&self, v: ValueId) -> bool {
        self.data(v).kind.is_user()
    }

    /// Number of underlying instructions an instruction value represents.
    #[inline]
    pub fn num_ir_instrs(&self, v: ValueId) -> u32 {
        assert!(self.is_instruction(v), "num_ir_instrs on a non-instruction");
        kind::num_ir_instrs(self.data(v).kind)
    }

    /// The underlying instructions of an instruction value, in program
    /// order.
    pub fn ir_instrs(&self, v: ValueId) -> SmallVec<[NodeId; 1]> {
        assert!(self.is_instruction(v), "ir_instrs on a non-instruction");
        smallvec::smallvec![self.node_of(v)]
    }

    /// Name of a function value.
    pub fn function_name(&self, v: ValueId) -> &str {
        assert_eq!(self.kind(v), ValueKind::Function, "expected a function");
        self.ir.func_name(self.node_of(v))
    }

    // =========================================================================
    // Reverse Edges
    // =========================================================================

    /// Iterate the reverse edges of a value: every materialized operand slot
    /// currently referencing it.
    pub fn uses(&self, v: ValueId) -> ValueUses<'_> {
        ValueUses::new(self, self.ir.uses(self.node_of(v)))
    }

    /// Iterate the users of a value (one entry per referencing slot, so a
    /// user appears once per edge).
    pub fn users(&self, v: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        self.uses(v).map(|u| u.user())
    }

    /// Number of reverse edges. This is a linear-time operation.
    pub fn num_uses(&self, v: ValueId) -> usize {
        self.uses(v).count()
    }

    /// Check if a value has at least `n` reverse edges. Linear in `n`.
    pub fn has_n_uses_or_more(&self, v: ValueId, n: usize) -> bool {
        self.uses(v).take(n).count() == n
    }

    /// Check if a value has exactly `n` reverse edges. Linear in `n`.
    pub fn has_n_uses(&self, v: ValueId, n: usize) -> bool {
        self.uses(v).take(n + 1).count() == n
    }

    /// Dereference an operand edge.
    pub(crate) fn use_value(&self, u: Use) -> ValueId {
        let user_node = self.node_of(u.user());
        let operands = self.ir.operands(user_node);
        let slot = u.slot() as usize;
        assert!(
            slot < operands.len(),
            "dereferenced an end or out-of-range operand edge"
        );
        self.get_value(operands[slot])
            .expect("operand of a materialized user is not materialized")
    }

    // =========================================================================
    // Debug
    // =========================================================================

    /// Render a short description of a value, like `v3: load #12`.
    pub fn describe(&self, v: ValueId) -> String {
        let data = self.data(v);
        match data.payload {
            Payload::Inst { opcode, .. } => {
                format!("v{}: {} {}", data.uid, opcode, data.node)
            }
            _ => format!("v{}: {} {}", data.uid, data.kind, data.node),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
