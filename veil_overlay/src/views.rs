//! Typed per-kind instruction views and constructors.
//!
//! Each accessor asserts its subclass tag and then projects over the
//! operand protocol, so every mutation performed through a view goes
//! through `set_operand` (or a lifecycle primitive) and is tracked
//! automatically. Opaque instructions have no view; their structural
//! facilities remain available through the generic protocol.
//!
//! Operand layouts are the conventions documented in `veil_ir::InstOp`:
//! callee last for calls, true successor first for branches, interleaved
//! value/block pairs for phis.
//!
//! The constructors only arrange operands; they create the underlying node
//! and the overlay value in one step and return the new instruction
//! unattached.

use crate::context::Context;
use crate::handle::ValueId;
use crate::kind::ValueKind;
use veil_ir::{CastOp, InstOp, MemFlags, Ty};

impl Context {
    #[inline]
    fn expect_kind(&self, v: ValueId, kind: ValueKind) {
        assert_eq!(
            self.kind(v),
            kind,
            "expected a {} value, got {}",
            kind,
            self.kind(v)
        );
    }

    // =========================================================================
    // Branch
    // =========================================================================

    /// Check if a branch is conditional.
    pub fn br_is_conditional(&self, br: ValueId) -> bool {
        self.expect_kind(br, ValueKind::Br);
        self.num_operands(br) == 3
    }

    /// Condition of a conditional branch.
    pub fn br_condition(&self, br: ValueId) -> ValueId {
        assert!(self.br_is_conditional(br), "unconditional branch");
        self.operand(br, 0)
    }

    pub fn br_set_condition(&mut self, br: ValueId, cond: ValueId) {
        assert!(self.br_is_conditional(br), "unconditional branch");
        self.set_operand(br, 0, cond);
    }

    /// Number of successor blocks: 1 or 2.
    pub fn br_num_successors(&self, br: ValueId) -> u32 {
        if self.br_is_conditional(br) {
            2
        } else {
            1
        }
    }

    /// Successor block: 0 is the taken/true successor, 1 the false one.
    pub fn br_successor(&self, br: ValueId, idx: u32) -> ValueId {
        let n = self.br_num_successors(br);
        assert!(idx < n, "successor index out of range");
        let base = if n == 2 { 1 } else { 0 };
        self.operand(br, base + idx)
    }

    pub fn br_set_successor(&mut self, br: ValueId, idx: u32, block: ValueId) {
        self.expect_kind(block, ValueKind::Block);
        let n = self.br_num_successors(br);
        assert!(idx < n, "successor index out of range");
        let base = if n == 2 { 1 } else { 0 };
        self.set_operand(br, base + idx, block);
    }

    /// Exchange the two successors of a conditional branch.
    pub fn br_swap_successors(&mut self, br: ValueId) {
        assert!(self.br_is_conditional(br), "unconditional branch");
        self.swap_operands(br, 1, 2);
    }

    // =========================================================================
    // Select
    // =========================================================================

    pub fn sel_condition(&self, sel: ValueId) -> ValueId {
        self.expect_kind(sel, ValueKind::Select);
        self.operand(sel, 0)
    }

    pub fn sel_true_value(&self, sel: ValueId) -> ValueId {
        self.expect_kind(sel, ValueKind::Select);
        self.operand(sel, 1)
    }

    pub fn sel_false_value(&self, sel: ValueId) -> ValueId {
        self.expect_kind(sel, ValueKind::Select);
        self.operand(sel, 2)
    }

    pub fn sel_set_condition(&mut self, sel: ValueId, v: ValueId) {
        self.expect_kind(sel, ValueKind::Select);
        self.set_operand(sel, 0, v);
    }

    pub fn sel_set_true_value(&mut self, sel: ValueId, v: ValueId) {
        self.expect_kind(sel, ValueKind::Select);
        self.set_operand(sel, 1, v);
    }

    pub fn sel_set_false_value(&mut self, sel: ValueId, v: ValueId) {
        self.expect_kind(sel, ValueKind::Select);
        self.set_operand(sel, 2, v);
    }

    /// Exchange the true and false values.
    pub fn sel_swap_values(&mut self, sel: ValueId) {
        self.expect_kind(sel, ValueKind::Select);
        self.swap_operands(sel, 1, 2);
    }

    // =========================================================================
    // Load / Store
    // =========================================================================

    pub fn load_ptr(&self, load: ValueId) -> ValueId {
        self.expect_kind(load, ValueKind::Load);
        self.operand(load, 0)
    }

    pub fn load_is_volatile(&self, load: ValueId) -> bool {
        self.expect_kind(load, ValueKind::Load);
        match self.ir().node(self.underlying(load)).inst_op() {
            Some(InstOp::Load(flags)) => flags.contains(MemFlags::VOLATILE),
            _ => unreachable!("load overlay over a non-load node"),
        }
    }

    pub fn store_value(&self, store: ValueId) -> ValueId {
        self.expect_kind(store, ValueKind::Store);
        self.operand(store, 0)
    }

    pub fn store_ptr(&self, store: ValueId) -> ValueId {
        self.expect_kind(store, ValueKind::Store);
        self.operand(store, 1)
    }

    pub fn store_is_volatile(&self, store: ValueId) -> bool {
        self.expect_kind(store, ValueKind::Store);
        match self.ir().node(self.underlying(store)).inst_op() {
            Some(InstOp::Store(flags)) => flags.contains(MemFlags::VOLATILE),
            _ => unreachable!("store overlay over a non-store node"),
        }
    }

    // =========================================================================
    // Ret
    // =========================================================================

    /// The returned value, or `None` for a void return.
    pub fn ret_value(&self, ret: ValueId) -> Option<ValueId> {
        self.expect_kind(ret, ValueKind::Ret);
        (self.num_operands(ret) == 1).then(|| self.operand(ret, 0))
    }

    // =========================================================================
    // Call
    // =========================================================================

    /// The called value (last operand).
    pub fn call_callee(&self, call: ValueId) -> ValueId {
        self.expect_kind(call, ValueKind::Call);
        self.operand(call, self.num_operands(call) - 1)
    }

    pub fn call_set_callee(&mut self, call: ValueId, callee: ValueId) {
        self.expect_kind(call, ValueKind::Call);
        let idx = self.num_operands(call) - 1;
        self.set_operand(call, idx, callee);
    }

    pub fn call_num_args(&self, call: ValueId) -> u32 {
        self.expect_kind(call, ValueKind::Call);
        self.num_operands(call) - 1
    }

    pub fn call_arg(&self, call: ValueId, idx: u32) -> ValueId {
        assert!(idx < self.call_num_args(call), "argument index out of range");
        self.operand(call, idx)
    }

    pub fn call_set_arg(&mut self, call: ValueId, idx: u32, arg: ValueId) {
        assert!(idx < self.call_num_args(call), "argument index out of range");
        self.set_operand(call, idx, arg);
    }

    /// Iterate the call's arguments (callee excluded).
    pub fn call_args(&self, call: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        let n = self.call_num_args(call);
        (0..n).map(move |i| self.operand(call, i))
    }

    // =========================================================================
    // GetElementPtr
    // =========================================================================

    pub fn gep_ptr(&self, gep: ValueId) -> ValueId {
        self.expect_kind(gep, ValueKind::GetElementPtr);
        self.operand(gep, 0)
    }

    pub fn gep_num_indices(&self, gep: ValueId) -> u32 {
        self.expect_kind(gep, ValueKind::GetElementPtr);
        self.num_operands(gep) - 1
    }

    pub fn gep_index(&self, gep: ValueId, idx: u32) -> ValueId {
        assert!(idx < self.gep_num_indices(gep), "index out of range");
        self.operand(gep, 1 + idx)
    }

    pub fn gep_indices(&self, gep: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        let n = self.gep_num_indices(gep);
        (0..n).map(move |i| self.operand(gep, 1 + i))
    }

    // =========================================================================
    // Cast
    // =========================================================================

    /// Source type of a cast: the type of its operand.
    pub fn cast_src_ty(&self, cast: ValueId) -> Ty {
        self.expect_kind(cast, ValueKind::Cast);
        self.ty(self.operand(cast, 0))
    }

    /// Destination type of a cast: the type of the cast itself.
    pub fn cast_dest_ty(&self, cast: ValueId) -> Ty {
        self.expect_kind(cast, ValueKind::Cast);
        self.ty(cast)
    }

    // =========================================================================
    // Phi
    // =========================================================================

    pub fn phi_num_incoming(&self, phi: ValueId) -> u32 {
        self.expect_kind(phi, ValueKind::Phi);
        self.num_operands(phi) / 2
    }

    pub fn phi_incoming_value(&self, phi: ValueId, idx: u32) -> ValueId {
        assert!(idx < self.phi_num_incoming(phi), "incoming index out of range");
        self.operand(phi, 2 * idx)
    }

    pub fn phi_incoming_block(&self, phi: ValueId, idx: u32) -> ValueId {
        assert!(idx < self.phi_num_incoming(phi), "incoming index out of range");
        self.operand(phi, 2 * idx + 1)
    }

    pub fn phi_set_incoming_value(&mut self, phi: ValueId, idx: u32, v: ValueId) {
        assert!(idx < self.phi_num_incoming(phi), "incoming index out of range");
        self.set_operand(phi, 2 * idx, v);
    }

    pub fn phi_set_incoming_block(&mut self, phi: ValueId, idx: u32, block: ValueId) {
        self.expect_kind(block, ValueKind::Block);
        assert!(idx < self.phi_num_incoming(phi), "incoming index out of range");
        self.set_operand(phi, 2 * idx + 1, block);
    }

    /// Index of the incoming edge from `block`.
    pub fn phi_block_index(&self, phi: ValueId, block: ValueId) -> Option<u32> {
        (0..self.phi_num_incoming(phi)).find(|&i| self.phi_incoming_block(phi, i) == block)
    }

    /// The value flowing in from `block`.
    pub fn phi_incoming_value_for_block(&self, phi: ValueId, block: ValueId) -> Option<ValueId> {
        self.phi_block_index(phi, block)
            .map(|i| self.phi_incoming_value(phi, i))
    }

    /// Append an incoming edge. Resizes the operand list, which is not a
    /// reversible edit: rejected while a tracking session is open.
    pub fn phi_add_incoming(&mut self, phi: ValueId, value: ValueId, block: ValueId) {
        self.expect_kind(phi, ValueKind::Phi);
        self.expect_kind(block, ValueKind::Block);
        assert!(
            !self.is_tracking(),
            "phi incoming-list resizing is not a reversible edit"
        );
        let (vn, bn) = (self.node_of(value), self.node_of(block));
        let phi_node = self.node_of(phi);
        self.ir.push_operands(phi_node, &[vn, bn]);
    }

    /// Remove incoming edge `idx`, returning its value. Not reversible:
    /// rejected while a tracking session is open.
    pub fn phi_remove_incoming(&mut self, phi: ValueId, idx: u32) -> ValueId {
        assert!(idx < self.phi_num_incoming(phi), "incoming index out of range");
        assert!(
            !self.is_tracking(),
            "phi incoming-list resizing is not a reversible edit"
        );
        let removed = self.phi_incoming_value(phi, idx);
        let phi_node = self.node_of(phi);
        self.ir
            .remove_operand_range(phi_node, 2 * idx as usize, 2);
        removed
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an unconditional branch to `dest`.
    pub fn create_branch(&mut self, dest: ValueId) -> ValueId {
        self.expect_kind(dest, ValueKind::Block);
        self.create_instruction(InstOp::Br, Ty::Void, &[dest])
    }

    /// Create a conditional branch.
    pub fn create_cond_branch(
        &mut self,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    ) -> ValueId {
        self.expect_kind(if_true, ValueKind::Block);
        self.expect_kind(if_false, ValueKind::Block);
        self.create_instruction(InstOp::Br, Ty::Void, &[cond, if_true, if_false])
    }

    /// Create a select. The result type is the true value's type.
    pub fn create_select(&mut self, cond: ValueId, if_true: ValueId, if_false: ValueId) -> ValueId {
        let ty = self.ty(if_true);
        self.create_instruction(InstOp::Select, ty, &[cond, if_true, if_false])
    }

    pub fn create_load(&mut self, ty: Ty, ptr: ValueId, flags: MemFlags) -> ValueId {
        self.create_instruction(InstOp::Load(flags), ty, &[ptr])
    }

    pub fn create_store(&mut self, value: ValueId, ptr: ValueId, flags: MemFlags) -> ValueId {
        self.create_instruction(InstOp::Store(flags), Ty::Void, &[value, ptr])
    }

    pub fn create_ret(&mut self, value: ValueId) -> ValueId {
        self.create_instruction(InstOp::Ret, Ty::Void, &[value])
    }

    pub fn create_ret_void(&mut self) -> ValueId {
        self.create_instruction(InstOp::Ret, Ty::Void, &[])
    }

    /// Create a call. Arguments precede the callee in the operand list.
    pub fn create_call(&mut self, ty: Ty, callee: ValueId, args: &[ValueId]) -> ValueId {
        let mut operands = args.to_vec();
        operands.push(callee);
        self.create_instruction(InstOp::Call, ty, &operands)
    }

    pub fn create_gep(&mut self, ptr: ValueId, indices: &[ValueId]) -> ValueId {
        let mut operands = vec![ptr];
        operands.extend_from_slice(indices);
        self.create_instruction(InstOp::GetElementPtr, Ty::Ptr, &operands)
    }

    pub fn create_cast(&mut self, op: CastOp, dest_ty: Ty, src: ValueId) -> ValueId {
        self.create_instruction(InstOp::Cast(op), dest_ty, &[src])
    }

    /// Create a phi from (value, incoming block) pairs.
    pub fn create_phi(&mut self, ty: Ty, incoming: &[(ValueId, ValueId)]) -> ValueId {
        let mut operands = Vec::with_capacity(incoming.len() * 2);
        for &(value, block) in incoming {
            self.expect_kind(block, ValueKind::Block);
            operands.push(value);
            operands.push(block);
        }
        self.create_instruction(InstOp::Phi, ty, &operands)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::context::{Context, ContextConfig};
    use crate::handle::ValueId;
    use crate::kind::{Opcode, ValueKind};
    use veil_ir::{CastOp, ConstValue, MemFlags, Module, NodeId, Ty};

    /// A function with two empty blocks and a few leaf values.
    fn scaffold() -> (Context, NodeId, [ValueId; 2], [ValueId; 3]) {
        let mut m = Module::new();
        let f = m.new_function("f");
        let p = m.new_argument(f, Ty::Ptr);
        let x = m.new_argument(f, Ty::I64);
        let c = m.new_argument(f, Ty::I1);
        let b0 = m.new_block(f);
        let b1 = m.new_block(f);

        let mut ctx = Context::with_config(m, ContextConfig::for_testing());
        ctx.create_function(f);
        let blocks = [ctx.get_value(b0).unwrap(), ctx.get_value(b1).unwrap()];
        let leaves = [
            ctx.get_value(p).unwrap(),
            ctx.get_value(x).unwrap(),
            ctx.get_value(c).unwrap(),
        ];
        (ctx, f, blocks, leaves)
    }

    #[test]
    fn test_branch_view() {
        let (mut ctx, _f, [b0, b1], [_p, _x, c]) = scaffold();

        let br = ctx.create_cond_branch(c, b0, b1);
        ctx.insert_into(br, b0, 0);

        assert!(ctx.br_is_conditional(br));
        assert_eq!(ctx.br_num_successors(br), 2);
        assert_eq!(ctx.br_condition(br), c);
        assert_eq!(ctx.br_successor(br, 0), b0);
        assert_eq!(ctx.br_successor(br, 1), b1);

        ctx.br_swap_successors(br);
        assert_eq!(ctx.br_successor(br, 0), b1);
        assert_eq!(ctx.br_successor(br, 1), b0);

        let plain = ctx.create_branch(b1);
        ctx.insert_into(plain, b1, 0);
        assert!(!ctx.br_is_conditional(plain));
        assert_eq!(ctx.br_successor(plain, 0), b1);
        crate::verify::verify(&ctx).unwrap();
    }

    #[test]
    fn test_select_view() {
        let (mut ctx, _f, [b0, _b1], [p, x, c]) = scaffold();
        let y = ctx.create_load(Ty::I64, p, MemFlags::empty());
        ctx.insert_into(y, b0, 0);
        let sel = ctx.create_select(c, x, y);
        ctx.insert_after(sel, y);

        assert_eq!(ctx.kind(sel), ValueKind::Select);
        assert_eq!(ctx.ty(sel), Ty::I64);
        assert_eq!(ctx.sel_condition(sel), c);
        assert_eq!(ctx.sel_true_value(sel), x);
        assert_eq!(ctx.sel_false_value(sel), y);

        ctx.sel_swap_values(sel);
        assert_eq!(ctx.sel_true_value(sel), y);
        assert_eq!(ctx.sel_false_value(sel), x);

        ctx.sel_set_false_value(sel, y);
        assert_eq!(ctx.sel_false_value(sel), y);
        crate::verify::verify(&ctx).unwrap();
    }

    #[test]
    fn test_call_view() {
        let (mut ctx, _f, [b0, _b1], [p, x, _c]) = scaffold();
        let callee = ctx.create_load(Ty::Func, p, MemFlags::empty());
        ctx.insert_into(callee, b0, 0);
        let call = ctx.create_call(Ty::I64, callee, &[x, x]);
        ctx.insert_after(call, callee);

        assert_eq!(ctx.kind(call), ValueKind::Call);
        assert_eq!(ctx.call_num_args(call), 2);
        assert_eq!(ctx.call_callee(call), callee);
        assert_eq!(ctx.call_arg(call, 0), x);
        let args: Vec<_> = ctx.call_args(call).collect();
        assert_eq!(args, vec![x, x]);
        crate::verify::verify(&ctx).unwrap();
    }

    #[test]
    fn test_cast_view() {
        let (mut ctx, _f, [b0, _b1], [_p, x, _c]) = scaffold();
        let trunc = ctx.create_cast(CastOp::Trunc, Ty::I32, x);
        ctx.insert_into(trunc, b0, 0);

        assert_eq!(ctx.kind(trunc), ValueKind::Cast);
        assert_eq!(ctx.opcode(trunc), Opcode::Trunc);
        assert_eq!(ctx.cast_src_ty(trunc), Ty::I64);
        assert_eq!(ctx.cast_dest_ty(trunc), Ty::I32);
    }

    #[test]
    fn test_phi_view() {
        let (mut ctx, _f, [b0, b1], [_p, x, _c]) = scaffold();
        let phi = ctx.create_phi(Ty::I64, &[(x, b0), (x, b1)]);
        ctx.insert_into(phi, b1, 0);

        assert_eq!(ctx.phi_num_incoming(phi), 2);
        assert_eq!(ctx.phi_incoming_value(phi, 0), x);
        assert_eq!(ctx.phi_incoming_block(phi, 1), b1);
        assert_eq!(ctx.phi_block_index(phi, b1), Some(1));
        assert_eq!(ctx.phi_incoming_value_for_block(phi, b0), Some(x));

        let removed = ctx.phi_remove_incoming(phi, 0);
        assert_eq!(removed, x);
        assert_eq!(ctx.phi_num_incoming(phi), 1);
        assert_eq!(ctx.phi_incoming_block(phi, 0), b1);

        ctx.phi_add_incoming(phi, x, b0);
        assert_eq!(ctx.phi_num_incoming(phi), 2);
        assert_eq!(ctx.phi_incoming_block(phi, 1), b0);
        crate::verify::verify(&ctx).unwrap();
    }

    #[test]
    fn test_store_view() {
        let (mut ctx, _f, [b0, _b1], [p, x, _c]) = scaffold();
        let st = ctx.create_store(x, p, MemFlags::VOLATILE);
        ctx.insert_into(st, b0, 0);
        assert_eq!(ctx.store_value(st), x);
        assert_eq!(ctx.store_ptr(st), p);
        assert!(ctx.store_is_volatile(st));
    }

    #[test]
    fn test_ret_view() {
        let (mut ctx, _f, [b0, b1], [_p, x, _c]) = scaffold();
        let r0 = ctx.create_ret(x);
        let r1 = ctx.create_ret_void();
        ctx.insert_into(r0, b0, 0);
        ctx.insert_into(r1, b1, 0);
        assert_eq!(ctx.ret_value(r0), Some(x));
        assert_eq!(ctx.ret_value(r1), None);
    }

    #[test]
    fn test_const_leaf() {
        let (mut ctx, _f, [b0, _b1], [p, _x, _c]) = scaffold();
        let konst = ctx.create_constant(ConstValue::Int(8), Ty::I64);
        assert_eq!(ctx.kind(konst), ValueKind::Constant);

        let st = ctx.create_store(konst, p, MemFlags::empty());
        ctx.insert_into(st, b0, 0);
        assert_eq!(ctx.store_value(st), konst);

        let gep = ctx.create_gep(p, &[konst, konst]);
        ctx.insert_after(gep, st);
        assert_eq!(ctx.gep_ptr(gep), p);
        assert_eq!(ctx.gep_num_indices(gep), 2);
        assert_eq!(ctx.gep_index(gep, 1), konst);
        crate::verify::verify(&ctx).unwrap();
    }
}
