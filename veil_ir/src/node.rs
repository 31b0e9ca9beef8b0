//! IR node definitions.
//!
//! Nodes are organized by category:
//! - **Function**: Owns an ordered list of blocks and a list of arguments
//! - **Block**: Owns an ordered list of instructions
//! - **Argument / Constant**: Leaf values
//! - **Instruction**: Operand-linked operations with a parent block
//!
//! Every node carries the same storage regardless of category: a kind tag,
//! a type, an operand list, a reverse-edge (use) list, and a parent link.
//! The use list is maintained incrementally by `Module`'s mutators; it is
//! never recomputed from scratch.

use crate::arena::Id;
use crate::types::Ty;

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node. Never reused while the module lives.
pub type NodeId = Id<Node>;

// =============================================================================
// Flags
// =============================================================================

bitflags::bitflags! {
    /// Memory-access properties of loads and stores.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MemFlags: u8 {
        /// Access must not be elided or reordered.
        const VOLATILE = 0b0000_0001;
        /// Access participates in atomic ordering.
        const ATOMIC = 0b0000_0010;
    }
}

impl MemFlags {
    /// A plain access: neither volatile nor atomic.
    #[inline]
    pub fn is_simple(self) -> bool {
        self.is_empty()
    }
}

// =============================================================================
// Constants
// =============================================================================

/// A constant value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Integer constant (interpreted at the node's type width).
    Int(i64),
    /// Float constant, stored as raw bits for Eq/Hash.
    Float(u64),
    /// Undefined value.
    Undef,
}

impl ConstValue {
    /// Build a float constant from an `f64`.
    #[inline]
    pub fn float(v: f64) -> Self {
        ConstValue::Float(v.to_bits())
    }

    /// Get as integer if this is one.
    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Get as float if this is one.
    #[inline]
    pub fn as_float(self) -> Option<f64> {
        match self {
            ConstValue::Float(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

// =============================================================================
// Instruction Operations
// =============================================================================

/// Cast operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CastOp {
    Trunc = 0,
    ZExt = 1,
    SExt = 2,
    FPTrunc = 3,
    FPExt = 4,
    FPToUI = 5,
    FPToSI = 6,
    UIToFP = 7,
    SIToFP = 8,
    PtrToInt = 9,
    IntToPtr = 10,
    BitCast = 11,
    AddrSpaceCast = 12,
}

/// Instruction operation.
///
/// Operand layout conventions:
/// - `Select`: `[cond, if_true, if_false]`
/// - `Br`: `[dest]` or `[cond, if_true, if_false]`
/// - `Load`: `[ptr]`
/// - `Store`: `[value, ptr]`
/// - `Ret`: `[]` or `[value]`
/// - `Call`: `[args.., callee]` (callee last)
/// - `GetElementPtr`: `[ptr, indices..]`
/// - `Cast`: `[src]`
/// - `Phi`: `[value0, block0, value1, block1, ..]` (interleaved pairs)
/// - `Alloca`: `[count]`
/// - `Freeze`: `[src]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstOp {
    Select,
    Br,
    Load(MemFlags),
    Store(MemFlags),
    Ret,
    Call,
    GetElementPtr,
    Cast(CastOp),
    Phi,
    Alloca,
    Freeze,
}

impl InstOp {
    /// Check if this operation ends a block.
    #[inline]
    pub const fn is_terminator(self) -> bool {
        matches!(self, InstOp::Br | InstOp::Ret)
    }

    /// Short printable mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            InstOp::Select => "select",
            InstOp::Br => "br",
            InstOp::Load(_) => "load",
            InstOp::Store(_) => "store",
            InstOp::Ret => "ret",
            InstOp::Call => "call",
            InstOp::GetElementPtr => "getelementptr",
            InstOp::Cast(_) => "cast",
            InstOp::Phi => "phi",
            InstOp::Alloca => "alloca",
            InstOp::Freeze => "freeze",
        }
    }
}

// =============================================================================
// Node Kind
// =============================================================================

/// Node category with per-category payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A function: ordered blocks plus arguments.
    Function {
        name: String,
        blocks: Vec<NodeId>,
        args: Vec<NodeId>,
    },
    /// A basic block: ordered instructions.
    Block { insts: Vec<NodeId> },
    /// A function argument.
    Argument { index: u32 },
    /// A constant.
    Constant(ConstValue),
    /// An instruction.
    Inst(InstOp),
}

impl NodeKind {
    /// Check if this is an instruction node.
    #[inline]
    pub const fn is_inst(&self) -> bool {
        matches!(self, NodeKind::Inst(_))
    }

    /// Check if this is a block node.
    #[inline]
    pub const fn is_block(&self) -> bool {
        matches!(self, NodeKind::Block { .. })
    }
}

// =============================================================================
// Use Sites
// =============================================================================

/// One reverse edge: `user`'s operand slot `slot` references this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    pub user: NodeId,
    pub slot: u32,
}

// =============================================================================
// Node
// =============================================================================

/// A node in the module.
///
/// Structure is defined by the operand edges; the use list is the exact
/// inverse of the operand edges across all live nodes.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) ty: Ty,
    pub(crate) operands: Vec<NodeId>,
    pub(crate) uses: Vec<UseSite>,
    pub(crate) parent: NodeId,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, ty: Ty) -> Self {
        Node {
            kind,
            ty,
            operands: Vec::new(),
            uses: Vec::new(),
            parent: NodeId::INVALID,
        }
    }

    /// The node's category.
    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The node's type.
    #[inline]
    pub fn ty(&self) -> Ty {
        self.ty
    }

    /// Ordered operand list.
    #[inline]
    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    /// Reverse edges: every (user, slot) currently referencing this node.
    /// Order is unspecified.
    #[inline]
    pub fn uses(&self) -> &[UseSite] {
        &self.uses
    }

    /// Parent link: the containing block for an attached instruction, the
    /// containing function for a block. `INVALID` when detached.
    #[inline]
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// The instruction operation, if this is an instruction.
    #[inline]
    pub fn inst_op(&self) -> Option<InstOp> {
        match self.kind {
            NodeKind::Inst(op) => Some(op),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_flags() {
        assert!(MemFlags::empty().is_simple());
        assert!(!MemFlags::VOLATILE.is_simple());
        let both = MemFlags::VOLATILE | MemFlags::ATOMIC;
        assert!(both.contains(MemFlags::ATOMIC));
    }

    #[test]
    fn test_const_value() {
        assert_eq!(ConstValue::Int(42).as_int(), Some(42));
        assert_eq!(ConstValue::float(1.5).as_float(), Some(1.5));
        assert_eq!(ConstValue::Undef.as_int(), None);
    }

    #[test]
    fn test_terminators() {
        assert!(InstOp::Br.is_terminator());
        assert!(InstOp::Ret.is_terminator());
        assert!(!InstOp::Load(MemFlags::empty()).is_terminator());
    }
}
