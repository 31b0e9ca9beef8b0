//! The owning module: builders, queries, and structural mutation.
//!
//! `Module` owns every node and maintains the use lists as operand edges
//! change. The mutation API is the contract the overlay layer relies on:
//!
//! - Mutations are synchronous and immediately visible
//! - Node identity is never recycled (`free_node` vacates, never reuses)
//! - Every operand mutation keeps the old and new operand's use lists exact
//!
//! Structural preconditions (out-of-range slots, inserting an attached
//! instruction, freeing a node that still has uses) are programmer errors
//! and panic.

use crate::arena::Arena;
use crate::node::{ConstValue, InstOp, Node, NodeId, NodeKind, UseSite};
use crate::types::Ty;

// =============================================================================
// Module
// =============================================================================

/// An IR module: the arena of nodes plus the list of functions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    nodes: Arena<Node>,
    funcs: Vec<NodeId>,
}

impl Module {
    /// Create a new empty module.
    pub fn new() -> Self {
        Module {
            nodes: Arena::with_capacity(256),
            funcs: Vec::new(),
        }
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    /// Get a reference to a node. Panics if the node was freed.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Get a node by ID (optional).
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Check whether a node is live.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Number of live nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.live()
    }

    /// The functions of this module, in creation order.
    #[inline]
    pub fn functions(&self) -> &[NodeId] {
        &self.funcs
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Create a new empty function.
    pub fn new_function(&mut self, name: &str) -> NodeId {
        let id = self.nodes.alloc(Node::new(
            NodeKind::Function {
                name: name.to_string(),
                blocks: Vec::new(),
                args: Vec::new(),
            },
            Ty::Func,
        ));
        self.funcs.push(id);
        id
    }

    /// Create a new argument on `func`. Index is assigned in call order.
    pub fn new_argument(&mut self, func: NodeId, ty: Ty) -> NodeId {
        let index = self.func_args(func).len() as u32;
        let id = self.nodes.alloc(Node::new(NodeKind::Argument { index }, ty));
        self.nodes[id].parent = func;
        match &mut self.nodes[func].kind {
            NodeKind::Function { args, .. } => args.push(id),
            _ => panic!("new_argument on a non-function node"),
        }
        id
    }

    /// Create a new empty block appended to `func`.
    pub fn new_block(&mut self, func: NodeId) -> NodeId {
        let id = self
            .nodes
            .alloc(Node::new(NodeKind::Block { insts: Vec::new() }, Ty::Label));
        self.nodes[id].parent = func;
        match &mut self.nodes[func].kind {
            NodeKind::Function { blocks, .. } => blocks.push(id),
            _ => panic!("new_block on a non-function node"),
        }
        id
    }

    /// Create a constant node. Constants are not interned: two calls with
    /// the same value yield distinct nodes.
    pub fn new_const(&mut self, value: ConstValue, ty: Ty) -> NodeId {
        self.nodes.alloc(Node::new(NodeKind::Constant(value), ty))
    }

    /// Create a detached instruction with the given operands.
    pub fn new_inst(&mut self, op: InstOp, ty: Ty, operands: &[NodeId]) -> NodeId {
        let id = self.nodes.alloc(Node::new(NodeKind::Inst(op), ty));
        for (slot, &operand) in operands.iter().enumerate() {
            self.nodes[id].operands.push(operand);
            self.add_use(operand, id, slot as u32);
        }
        id
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Ordered operand list of a node.
    #[inline]
    pub fn operands(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].operands
    }

    /// Reverse edges of a node. Order is unspecified.
    #[inline]
    pub fn uses(&self, id: NodeId) -> &[UseSite] {
        &self.nodes[id].uses
    }

    /// The block containing an instruction, or `None` if detached.
    #[inline]
    pub fn parent_of(&self, inst: NodeId) -> Option<NodeId> {
        let parent = self.nodes[inst].parent;
        parent.is_valid().then_some(parent)
    }

    /// Position of an attached instruction within its block. Linear scan.
    pub fn position(&self, inst: NodeId) -> Option<usize> {
        let block = self.parent_of(inst)?;
        self.block_insts(block).iter().position(|&i| i == inst)
    }

    /// Ordered instructions of a block.
    pub fn block_insts(&self, block: NodeId) -> &[NodeId] {
        match &self.nodes[block].kind {
            NodeKind::Block { insts } => insts,
            _ => panic!("block_insts on a non-block node"),
        }
    }

    /// Ordered blocks of a function.
    pub fn func_blocks(&self, func: NodeId) -> &[NodeId] {
        match &self.nodes[func].kind {
            NodeKind::Function { blocks, .. } => blocks,
            _ => panic!("func_blocks on a non-function node"),
        }
    }

    /// Arguments of a function.
    pub fn func_args(&self, func: NodeId) -> &[NodeId] {
        match &self.nodes[func].kind {
            NodeKind::Function { args, .. } => args,
            _ => panic!("func_args on a non-function node"),
        }
    }

    /// Name of a function.
    pub fn func_name(&self, func: NodeId) -> &str {
        match &self.nodes[func].kind {
            NodeKind::Function { name, .. } => name,
            _ => panic!("func_name on a non-function node"),
        }
    }

    // =========================================================================
    // Use-List Upkeep
    // =========================================================================

    fn add_use(&mut self, def: NodeId, user: NodeId, slot: u32) {
        self.nodes[def].uses.push(UseSite { user, slot });
    }

    fn remove_use(&mut self, def: NodeId, user: NodeId, slot: u32) {
        let uses = &mut self.nodes[def].uses;
        let pos = uses
            .iter()
            .position(|u| u.user == user && u.slot == slot)
            .expect("use list out of sync with operand edge");
        uses.swap_remove(pos);
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace the operand at `slot` of `user`, updating both use lists.
    pub fn set_operand(&mut self, user: NodeId, slot: u32, value: NodeId) {
        let idx = slot as usize;
        assert!(
            idx < self.nodes[user].operands.len(),
            "operand slot {slot} out of range for {user}"
        );
        let old = self.nodes[user].operands[idx];
        self.remove_use(old, user, slot);
        self.nodes[user].operands[idx] = value;
        self.add_use(value, user, slot);
    }

    /// Insert a detached instruction into `block` at `index`.
    pub fn insert_inst(&mut self, block: NodeId, index: usize, inst: NodeId) {
        assert!(
            !self.nodes[inst].parent.is_valid(),
            "inserting an instruction that is already attached"
        );
        assert!(self.nodes[inst].kind.is_inst(), "inserting a non-instruction");
        match &mut self.nodes[block].kind {
            NodeKind::Block { insts } => {
                assert!(index <= insts.len(), "insertion index out of range");
                insts.insert(index, inst);
            }
            _ => panic!("insert_inst into a non-block node"),
        }
        self.nodes[inst].parent = block;
    }

    /// Unlink an attached instruction from its block. Storage, operands and
    /// use edges are untouched; the instruction can be re-inserted.
    pub fn unlink_inst(&mut self, inst: NodeId) {
        let block = self.nodes[inst].parent;
        assert!(block.is_valid(), "unlinking a detached instruction");
        match &mut self.nodes[block].kind {
            NodeKind::Block { insts } => {
                let pos = insts
                    .iter()
                    .position(|&i| i == inst)
                    .expect("instruction missing from its parent block");
                insts.remove(pos);
            }
            _ => panic!("instruction parent is not a block"),
        }
        self.nodes[inst].parent = NodeId::INVALID;
    }

    /// Append operands to `user`, registering the new use edges.
    pub fn push_operands(&mut self, user: NodeId, values: &[NodeId]) {
        for &value in values {
            let slot = self.nodes[user].operands.len() as u32;
            self.nodes[user].operands.push(value);
            self.add_use(value, user, slot);
        }
    }

    /// Remove `count` operands of `user` starting at `start`. Use sites of
    /// the operands after the removed range are re-slotted.
    pub fn remove_operand_range(&mut self, user: NodeId, start: usize, count: usize) {
        let len = self.nodes[user].operands.len();
        assert!(start + count <= len, "operand range out of bounds");
        for slot in start..start + count {
            let operand = self.nodes[user].operands[slot];
            self.remove_use(operand, user, slot as u32);
        }
        for slot in start + count..len {
            let operand = self.nodes[user].operands[slot];
            let uses = &mut self.nodes[operand].uses;
            let site = uses
                .iter_mut()
                .find(|u| u.user == user && u.slot == slot as u32)
                .expect("use list out of sync with operand edge");
            site.slot -= count as u32;
        }
        self.nodes[user].operands.drain(start..start + count);
    }

    /// Drop all operand edges of `user`, returning the old operand list.
    pub fn take_operands(&mut self, user: NodeId) -> Vec<NodeId> {
        let operands = std::mem::take(&mut self.nodes[user].operands);
        for (slot, &operand) in operands.iter().enumerate() {
            self.remove_use(operand, user, slot as u32);
        }
        operands
    }

    /// Re-install an operand list previously removed with `take_operands`.
    pub fn restore_operands(&mut self, user: NodeId, operands: &[NodeId]) {
        assert!(
            self.nodes[user].operands.is_empty(),
            "restoring operands over a non-empty operand list"
        );
        for (slot, &operand) in operands.iter().enumerate() {
            self.nodes[user].operands.push(operand);
            self.add_use(operand, user, slot as u32);
        }
    }

    /// Free a node's storage. The node must be detached, operand-free and
    /// unused; its identity is never reissued.
    pub fn free_node(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        assert!(!node.parent.is_valid(), "freeing an attached node");
        assert!(node.operands.is_empty(), "freeing a node with live operands");
        assert!(node.uses.is_empty(), "freeing a node that still has uses");
        self.nodes.free(id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MemFlags;

    fn setup() -> (Module, NodeId, NodeId) {
        let mut m = Module::new();
        let f = m.new_function("f");
        let b = m.new_block(f);
        (m, f, b)
    }

    #[test]
    fn test_function_layout() {
        let (mut m, f, b) = setup();
        let a0 = m.new_argument(f, Ty::Ptr);
        let a1 = m.new_argument(f, Ty::I64);

        assert_eq!(m.func_blocks(f), &[b]);
        assert_eq!(m.func_args(f), &[a0, a1]);
        assert_eq!(m.func_name(f), "f");
        match m.node(a1).kind() {
            NodeKind::Argument { index } => assert_eq!(*index, 1),
            _ => panic!("expected argument"),
        }
    }

    #[test]
    fn test_new_inst_registers_uses() {
        let (mut m, f, _b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let v = m.new_argument(f, Ty::I64);
        let st = m.new_inst(InstOp::Store(MemFlags::empty()), Ty::Void, &[v, p]);

        assert_eq!(m.operands(st), &[v, p]);
        assert_eq!(m.uses(v), &[UseSite { user: st, slot: 0 }]);
        assert_eq!(m.uses(p), &[UseSite { user: st, slot: 1 }]);
    }

    #[test]
    fn test_set_operand_updates_use_lists() {
        let (mut m, f, _b) = setup();
        let x = m.new_argument(f, Ty::I64);
        let y = m.new_argument(f, Ty::I64);
        let p = m.new_argument(f, Ty::Ptr);
        let st = m.new_inst(InstOp::Store(MemFlags::empty()), Ty::Void, &[x, p]);

        m.set_operand(st, 0, y);

        assert_eq!(m.operands(st)[0], y);
        assert!(m.uses(x).is_empty());
        assert_eq!(m.uses(y), &[UseSite { user: st, slot: 0 }]);
    }

    #[test]
    fn test_insert_unlink() {
        let (mut m, f, b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let l0 = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        let l1 = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);

        m.insert_inst(b, 0, l0);
        m.insert_inst(b, 1, l1);
        assert_eq!(m.block_insts(b), &[l0, l1]);
        assert_eq!(m.position(l1), Some(1));

        m.unlink_inst(l0);
        assert_eq!(m.block_insts(b), &[l1]);
        assert_eq!(m.parent_of(l0), None);

        // Re-insertion at the front restores the original order.
        m.insert_inst(b, 0, l0);
        assert_eq!(m.block_insts(b), &[l0, l1]);
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_insert_panics() {
        let (mut m, f, b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let l = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        m.insert_inst(b, 0, l);
        m.insert_inst(b, 0, l);
    }

    #[test]
    fn test_take_restore_operands() {
        let (mut m, f, _b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let v = m.new_argument(f, Ty::I64);
        let st = m.new_inst(InstOp::Store(MemFlags::empty()), Ty::Void, &[v, p]);

        let ops = m.take_operands(st);
        assert_eq!(ops, vec![v, p]);
        assert!(m.operands(st).is_empty());
        assert!(m.uses(v).is_empty());
        assert!(m.uses(p).is_empty());

        m.restore_operands(st, &ops);
        assert_eq!(m.operands(st), &[v, p]);
        assert_eq!(m.uses(v), &[UseSite { user: st, slot: 0 }]);
    }

    #[test]
    fn test_operand_range_removal_reslots_uses() {
        let (mut m, f, _b) = setup();
        let a = m.new_argument(f, Ty::I64);
        let b2 = m.new_argument(f, Ty::I64);
        let c = m.new_argument(f, Ty::I64);
        let callee = m.new_argument(f, Ty::Func);
        let call = m.new_inst(InstOp::Call, Ty::I64, &[a, b2, c, callee]);

        m.remove_operand_range(call, 1, 1);
        assert_eq!(m.operands(call), &[a, c, callee]);
        assert!(m.uses(b2).is_empty());
        // The use sites after the removed slot shift down.
        assert_eq!(m.uses(c), &[UseSite { user: call, slot: 1 }]);
        assert_eq!(m.uses(callee), &[UseSite { user: call, slot: 2 }]);

        m.push_operands(call, &[b2]);
        assert_eq!(m.operands(call), &[a, c, callee, b2]);
        assert_eq!(m.uses(b2), &[UseSite { user: call, slot: 3 }]);
    }

    #[test]
    fn test_free_node() {
        let (mut m, f, _b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let l = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);

        m.take_operands(l);
        m.free_node(l);
        assert!(!m.contains(l));

        // Identity is not recycled.
        let l2 = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        assert_ne!(l, l2);
    }

    #[test]
    #[should_panic(expected = "still has uses")]
    fn test_free_used_node_panics() {
        let (mut m, f, _b) = setup();
        let p = m.new_argument(f, Ty::Ptr);
        let l = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        let _st = m.new_inst(InstOp::Store(MemFlags::empty()), Ty::Void, &[l, p]);
        m.take_operands(l);
        m.free_node(l);
    }
}
