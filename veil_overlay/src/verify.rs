//! On-demand structural validation.
//!
//! The validator is a pass, not a set of inline assertions: test harnesses
//! run it after every phase (and optionally after every revert via
//! `ContextConfig::verify_after_revert`) without the mutation paths paying
//! for it.
//!
//! Checked invariants:
//! 1. Bijection: the registry map and the value arena agree in both
//!    directions, and no two overlay values shadow the same node
//! 2. Tag agreement: every overlay tag is compatible with the real
//!    underlying node kind
//! 3. Mirroring: every materialized block's order equals the underlying
//!    order, and parent links agree with membership
//! 4. Reverse edges: the overlay use view of every value equals the operand
//!    scan over all materialized users
//! 5. Slot mapping: each kind's operand index/slot maps round-trip

use crate::context::Context;
use crate::handle::ValueId;
use crate::kind::{self, ValueKind};
use rustc_hash::FxHashMap;
use thiserror::Error;
use veil_ir::{NodeId, NodeKind};

// =============================================================================
// Errors
// =============================================================================

/// A violated structural invariant.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("value {value} shadows freed underlying node {node}")]
    DanglingUnderlying { value: ValueId, node: NodeId },

    #[error("value {value} shadows {node} but the registry disagrees")]
    BrokenBijection { value: ValueId, node: NodeId },

    #[error("registry entry for {node} resolves to a dead value handle")]
    DeadMapping { node: NodeId },

    #[error("registry holds {registered} entries but {live} values are live")]
    SizeMismatch { registered: usize, live: usize },

    #[error("value {value} is tagged {tag} but shadows an incompatible node")]
    KindMismatch { value: ValueId, tag: ValueKind },

    #[error("block {block} mirrors {overlay} instructions but the underlying block holds {underlying}")]
    LengthMismatch {
        block: ValueId,
        overlay: usize,
        underlying: usize,
    },

    #[error("block {block} order diverges from the underlying order at position {index}")]
    OrderMismatch { block: ValueId, index: usize },

    #[error("instruction {inst} disagrees with its block about membership")]
    ParentMismatch { inst: ValueId },

    #[error("reverse edges of {value} diverge from the operand scan")]
    UseListMismatch { value: ValueId },

    #[error("operand slot mapping of {value} does not round-trip at index {index}")]
    SlotMapMismatch { value: ValueId, index: u32 },
}

// =============================================================================
// Verification
// =============================================================================

/// Validate the whole overlay against its underlying module. Safe to run
/// mid-session: payloads detached by a pending erasure are out of scope.
pub fn verify(ctx: &Context) -> Result<(), VerifyError> {
    check_bijection(ctx)?;
    check_kinds(ctx)?;
    check_mirroring(ctx)?;
    check_reverse_edges(ctx)?;
    Ok(())
}

fn check_bijection(ctx: &Context) -> Result<(), VerifyError> {
    if ctx.values.live() != ctx.map.len() {
        return Err(VerifyError::SizeMismatch {
            registered: ctx.map.len(),
            live: ctx.values.live(),
        });
    }
    for (value, data) in ctx.values.iter() {
        if ctx.ir.get(data.node).is_none() {
            return Err(VerifyError::DanglingUnderlying {
                value,
                node: data.node,
            });
        }
        if ctx.map.get(&data.node) != Some(&value) {
            return Err(VerifyError::BrokenBijection {
                value,
                node: data.node,
            });
        }
    }
    for (&node, &value) in &ctx.map {
        match ctx.values.get(value) {
            None => return Err(VerifyError::DeadMapping { node }),
            Some(data) if data.node != node => {
                return Err(VerifyError::BrokenBijection { value, node })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_kinds(ctx: &Context) -> Result<(), VerifyError> {
    for (value, data) in ctx.values.iter() {
        let compatible = match (data.kind, ctx.ir.node(data.node).kind()) {
            (ValueKind::Argument, NodeKind::Argument { .. }) => true,
            (ValueKind::Constant, NodeKind::Constant(_)) => true,
            (ValueKind::Function, NodeKind::Function { .. }) => true,
            (ValueKind::Block, NodeKind::Block { .. }) => true,
            (tag, NodeKind::Inst(op)) => kind::classify_inst(*op).0 == tag,
            _ => false,
        };
        if !compatible {
            return Err(VerifyError::KindMismatch {
                value,
                tag: data.kind,
            });
        }
        if data.kind.is_user() {
            let n = ctx.ir.operands(data.node).len() as u32;
            for index in 0..n {
                let slot = kind::operand_slot(data.kind, index);
                if kind::operand_index(data.kind, slot) != index {
                    return Err(VerifyError::SlotMapMismatch { value, index });
                }
            }
        }
    }
    Ok(())
}

fn check_mirroring(ctx: &Context) -> Result<(), VerifyError> {
    for (block, data) in ctx.values.iter() {
        if data.kind != ValueKind::Block {
            continue;
        }
        let overlay = data.block_insts();
        let underlying = ctx.ir.block_insts(data.node);
        if overlay.len() != underlying.len() {
            return Err(VerifyError::LengthMismatch {
                block,
                overlay: overlay.len(),
                underlying: underlying.len(),
            });
        }
        for (index, (&iv, &inode)) in overlay.iter().zip(underlying).enumerate() {
            let Some(idata) = ctx.values.get(iv) else {
                return Err(VerifyError::OrderMismatch { block, index });
            };
            if idata.node != inode {
                return Err(VerifyError::OrderMismatch { block, index });
            }
            if idata.parent() != Some(block) {
                return Err(VerifyError::ParentMismatch { inst: iv });
            }
        }
    }
    // Instructions claiming detachment must not belong to a materialized
    // block on the underlying side.
    for (inst, data) in ctx.values.iter() {
        if !data.kind.is_instruction() || data.parent().is_some() {
            continue;
        }
        let parent_node = ctx.ir.node(data.node).parent();
        if parent_node.is_valid() && ctx.map.contains_key(&parent_node) {
            return Err(VerifyError::ParentMismatch { inst });
        }
    }
    Ok(())
}

fn check_reverse_edges(ctx: &Context) -> Result<(), VerifyError> {
    // Operand scan over every materialized user.
    let mut scanned: FxHashMap<ValueId, Vec<(ValueId, u32)>> = FxHashMap::default();
    for (user, data) in ctx.values.iter() {
        if !data.kind.is_user() {
            continue;
        }
        for (slot, opnode) in ctx.ir.operands(data.node).iter().enumerate() {
            if let Some(&operand) = ctx.map.get(opnode) {
                scanned.entry(operand).or_default().push((user, slot as u32));
            }
        }
    }

    for (value, _) in ctx.values.iter() {
        let mut view: Vec<(ValueId, u32)> =
            ctx.uses(value).map(|u| (u.user(), u.slot())).collect();
        let mut scan = scanned.remove(&value).unwrap_or_default();
        view.sort_unstable();
        scan.sort_unstable();
        if view != scan {
            return Err(VerifyError::UseListMismatch { value });
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::context::{Context, ContextConfig};
    use veil_ir::{InstOp, MemFlags, Module, Ty};

    #[test]
    fn test_clean_overlay_verifies() {
        let mut m = Module::new();
        let f = m.new_function("f");
        let p = m.new_argument(f, Ty::Ptr);
        let b = m.new_block(f);
        let l = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        let r = m.new_inst(InstOp::Ret, Ty::Void, &[l]);
        m.insert_inst(b, 0, l);
        m.insert_inst(b, 1, r);

        let mut ctx = Context::with_config(m, ContextConfig::for_testing());
        ctx.create_function(f);
        super::verify(&ctx).unwrap();
    }

    #[test]
    fn test_verify_mid_session_with_pending_erase() {
        let mut m = Module::new();
        let f = m.new_function("f");
        let p = m.new_argument(f, Ty::Ptr);
        let b = m.new_block(f);
        let l = m.new_inst(InstOp::Load(MemFlags::empty()), Ty::I64, &[p]);
        m.insert_inst(b, 0, l);

        let mut ctx = Context::with_config(m, ContextConfig::for_testing());
        ctx.create_function(f);
        let lv = ctx.get_value(l).unwrap();

        ctx.save();
        ctx.erase_from_parent(lv);
        super::verify(&ctx).unwrap();
        ctx.revert();
        super::verify(&ctx).unwrap();
    }
}
