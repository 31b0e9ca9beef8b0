//! The overlay value taxonomy.
//!
//! Two closed enumerations drive the whole object model:
//!
//! - **`ValueKind`**: the subclass tag used for safe downcasting. The tag
//!   space is a superset of the underlying kind space: several underlying
//!   instruction ops share the `Opaque` tag, and the whole cast family
//!   shares the `Cast` tag.
//! - **`Opcode`**: the overlay-local instruction opcode space. Distinct from
//!   the underlying op space so the overlay can fan the cast family out into
//!   one opcode per cast kind and can define opcodes with no underlying
//!   counterpart.
//!
//! Every mapping between the two spaces is an exhaustive `match`, so adding
//! an underlying op without deciding its overlay classification is a compile
//! error.

use veil_ir::{CastOp, InstOp};

// =============================================================================
// ValueKind
// =============================================================================

/// Subclass tag of an overlay value.
///
/// The lattice levels: every kind is a Value; `Constant`, `Function` and
/// the instruction kinds are Users; `Select` through `Opaque` are
/// Instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Argument = 0,
    Block = 1,
    Constant = 2,
    Function = 3,
    Select = 4,
    Br = 5,
    Load = 6,
    Store = 7,
    Ret = 8,
    Call = 9,
    GetElementPtr = 10,
    Cast = 11,
    Phi = 12,
    /// Fallback for underlying instruction ops with no dedicated overlay
    /// kind. Structural facilities remain available; typed accessors do not.
    Opaque = 13,
}

impl ValueKind {
    /// Check if values of this kind have operands.
    #[inline]
    pub const fn is_user(self) -> bool {
        !matches!(self, ValueKind::Argument | ValueKind::Block)
    }

    /// Check if this is an instruction kind.
    #[inline]
    pub const fn is_instruction(self) -> bool {
        matches!(
            self,
            ValueKind::Select
                | ValueKind::Br
                | ValueKind::Load
                | ValueKind::Store
                | ValueKind::Ret
                | ValueKind::Call
                | ValueKind::GetElementPtr
                | ValueKind::Cast
                | ValueKind::Phi
                | ValueKind::Opaque
        )
    }

    /// Printable tag name.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Argument => "Argument",
            ValueKind::Block => "Block",
            ValueKind::Constant => "Constant",
            ValueKind::Function => "Function",
            ValueKind::Select => "Select",
            ValueKind::Br => "Br",
            ValueKind::Load => "Load",
            ValueKind::Store => "Store",
            ValueKind::Ret => "Ret",
            ValueKind::Call => "Call",
            ValueKind::GetElementPtr => "GetElementPtr",
            ValueKind::Cast => "Cast",
            ValueKind::Phi => "Phi",
            ValueKind::Opaque => "Opaque",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Opcode
// =============================================================================

/// Overlay instruction opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Select,
    Br,
    Load,
    Store,
    Ret,
    Call,
    GetElementPtr,
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    PtrToInt,
    IntToPtr,
    BitCast,
    AddrSpaceCast,
    Phi,
    Opaque,
}

impl Opcode {
    /// Check if this is one of the cast opcodes.
    #[inline]
    pub const fn is_cast(self) -> bool {
        matches!(
            self,
            Opcode::Trunc
                | Opcode::ZExt
                | Opcode::SExt
                | Opcode::FPTrunc
                | Opcode::FPExt
                | Opcode::FPToUI
                | Opcode::FPToSI
                | Opcode::UIToFP
                | Opcode::SIToFP
                | Opcode::PtrToInt
                | Opcode::IntToPtr
                | Opcode::BitCast
                | Opcode::AddrSpaceCast
        )
    }

    /// Printable opcode name.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Select => "select",
            Opcode::Br => "br",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Ret => "ret",
            Opcode::Call => "call",
            Opcode::GetElementPtr => "getelementptr",
            Opcode::Trunc => "trunc",
            Opcode::ZExt => "zext",
            Opcode::SExt => "sext",
            Opcode::FPTrunc => "fptrunc",
            Opcode::FPExt => "fpext",
            Opcode::FPToUI => "fptoui",
            Opcode::FPToSI => "fptosi",
            Opcode::UIToFP => "uitofp",
            Opcode::SIToFP => "sitofp",
            Opcode::PtrToInt => "ptrtoint",
            Opcode::IntToPtr => "inttoptr",
            Opcode::BitCast => "bitcast",
            Opcode::AddrSpaceCast => "addrspacecast",
            Opcode::Phi => "phi",
            Opcode::Opaque => "opaque",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Overlay opcode for a cast op.
pub(crate) const fn cast_opcode(op: CastOp) -> Opcode {
    match op {
        CastOp::Trunc => Opcode::Trunc,
        CastOp::ZExt => Opcode::ZExt,
        CastOp::SExt => Opcode::SExt,
        CastOp::FPTrunc => Opcode::FPTrunc,
        CastOp::FPExt => Opcode::FPExt,
        CastOp::FPToUI => Opcode::FPToUI,
        CastOp::FPToSI => Opcode::FPToSI,
        CastOp::UIToFP => Opcode::UIToFP,
        CastOp::SIToFP => Opcode::SIToFP,
        CastOp::PtrToInt => Opcode::PtrToInt,
        CastOp::IntToPtr => Opcode::IntToPtr,
        CastOp::BitCast => Opcode::BitCast,
        CastOp::AddrSpaceCast => Opcode::AddrSpaceCast,
    }
}

/// Overlay classification of an underlying instruction op. Ops with no
/// dedicated overlay kind classify as `Opaque`.
pub(crate) const fn classify_inst(op: InstOp) -> (ValueKind, Opcode) {
    match op {
        InstOp::Select => (ValueKind::Select, Opcode::Select),
        InstOp::Br => (ValueKind::Br, Opcode::Br),
        InstOp::Load(_) => (ValueKind::Load, Opcode::Load),
        InstOp::Store(_) => (ValueKind::Store, Opcode::Store),
        InstOp::Ret => (ValueKind::Ret, Opcode::Ret),
        InstOp::Call => (ValueKind::Call, Opcode::Call),
        InstOp::GetElementPtr => (ValueKind::GetElementPtr, Opcode::GetElementPtr),
        InstOp::Cast(c) => (ValueKind::Cast, cast_opcode(c)),
        InstOp::Phi => (ValueKind::Phi, Opcode::Phi),
        InstOp::Alloca | InstOp::Freeze => (ValueKind::Opaque, Opcode::Opaque),
    }
}

// =============================================================================
// Per-Kind Dispatch
// =============================================================================

/// Number of underlying instructions an overlay instruction of this kind
/// represents. Every kind shipped today maps 1:1; the hook exists so a
/// future composite kind only has to change this table and the slot maps.
pub(crate) const fn num_ir_instrs(kind: ValueKind) -> u32 {
    match kind {
        ValueKind::Select
        | ValueKind::Br
        | ValueKind::Load
        | ValueKind::Store
        | ValueKind::Ret
        | ValueKind::Call
        | ValueKind::GetElementPtr
        | ValueKind::Cast
        | ValueKind::Phi
        | ValueKind::Opaque => 1,
        ValueKind::Argument | ValueKind::Block | ValueKind::Constant | ValueKind::Function => 0,
    }
}

/// Map an overlay operand index to the underlying operand slot. Identity for
/// every kind shipped today; a composite kind would deviate here.
pub(crate) const fn operand_slot(kind: ValueKind, index: u32) -> u32 {
    match kind {
        ValueKind::Argument
        | ValueKind::Block
        | ValueKind::Constant
        | ValueKind::Function
        | ValueKind::Select
        | ValueKind::Br
        | ValueKind::Load
        | ValueKind::Store
        | ValueKind::Ret
        | ValueKind::Call
        | ValueKind::GetElementPtr
        | ValueKind::Cast
        | ValueKind::Phi
        | ValueKind::Opaque => index,
    }
}

/// Inverse of `operand_slot`: recover the operand index of an underlying
/// slot.
pub(crate) const fn operand_index(kind: ValueKind, slot: u32) -> u32 {
    match kind {
        ValueKind::Argument
        | ValueKind::Block
        | ValueKind::Constant
        | ValueKind::Function
        | ValueKind::Select
        | ValueKind::Br
        | ValueKind::Load
        | ValueKind::Store
        | ValueKind::Ret
        | ValueKind::Call
        | ValueKind::GetElementPtr
        | ValueKind::Cast
        | ValueKind::Phi
        | ValueKind::Opaque => slot,
    }
}

// =============================================================================
// Tests
// =============================================================================
