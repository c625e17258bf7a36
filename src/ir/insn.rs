//! Instruction records: opcodes, payloads, and operand slot addressing.
//!
//! An instruction is a shared header (opcode, result size, owning block,
//! target pseudo, result type, position) plus an opcode-shaped payload.
//! The opcode enum is laid out in contiguous ranges so that "any
//! terminator", "any binop", and "any compare" are single numeric range
//! checks; the ordering must not be disturbed.

use crate::common::diag::Pos;
use crate::common::types::Ty;
use crate::ir::ir::BlockId;
use crate::ir::pseudo::PseudoId;

/// Index of an instruction in its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

impl std::fmt::Display for InsnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Opaque handle to a front-end expression node (SETVAL payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprRef(pub u32);

/// One `(low, high, target)` entry of a switch jump table.
/// The default entry is encoded as `begin > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiJmp {
    pub begin: i64,
    pub end: i64,
    pub target: BlockId,
}

impl MultiJmp {
    pub fn range(begin: i64, end: i64, target: BlockId) -> MultiJmp {
        MultiJmp { begin, end, target }
    }

    pub fn default_to(target: BlockId) -> MultiJmp {
        MultiJmp { begin: 1, end: 0, target }
    }

    pub fn is_default(&self) -> bool {
        self.begin > self.end
    }
}

/// Instruction opcodes. The declaration order is load-bearing: range
/// predicates below compare numeric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    BadOp,
    Entry,

    // Terminators
    Ret,
    Br,
    Cbr,
    Switch,
    ComputedGoto,

    // Binary
    Add,
    Sub,
    Mul,
    DivU,
    DivS,
    ModU,
    ModS,
    Shl,
    Lsr,
    Asr,

    // Floating-point binops
    FAdd,
    FSub,
    FMul,
    FDiv,

    // Logical
    And,
    Or,
    Xor,
    AndBool,
    OrBool,

    // Floating-point comparison
    FcmpOrd,
    FcmpOeq,
    FcmpOne,
    FcmpOle,
    FcmpOge,
    FcmpOlt,
    FcmpOgt,
    FcmpUeq,
    FcmpUne,
    FcmpUle,
    FcmpUge,
    FcmpUlt,
    FcmpUgt,
    FcmpUno,

    // Binary comparison
    SetEq,
    SetNe,
    SetLe,
    SetGe,
    SetLt,
    SetGt,
    SetB,
    SetA,
    SetBe,
    SetAe,

    // Unary
    Not,
    Neg,
    FNeg,

    // Select: three input values
    Sel,

    // Memory
    Load,
    Store,
    SetVal,
    SetFVal,
    SymAddr,

    // Other
    Phi,
    PhiSource,
    Cast,
    SCast,
    FpCast,
    PtrCast,
    InlinedCall,
    Call,
    Slice,
    Nop,
    DeathNote,
    Asm,
    Context,
    Range,

    // Needed to translate SSA back to normal form
    Copy,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        (Opcode::Ret as u8..=Opcode::ComputedGoto as u8).contains(&(self as u8))
    }

    /// Any binary operation, including logical and boolean ops.
    pub fn is_binop(self) -> bool {
        (Opcode::Add as u8..=Opcode::OrBool as u8).contains(&(self as u8))
    }

    pub fn is_fp_compare(self) -> bool {
        (Opcode::FcmpOrd as u8..=Opcode::FcmpUno as u8).contains(&(self as u8))
    }

    pub fn is_int_compare(self) -> bool {
        (Opcode::SetEq as u8..=Opcode::SetAe as u8).contains(&(self as u8))
    }

    /// Any comparison, floating or integer.
    pub fn is_compare(self) -> bool {
        (Opcode::FcmpOrd as u8..=Opcode::SetAe as u8).contains(&(self as u8))
    }

    pub fn is_cast(self) -> bool {
        matches!(self, Opcode::Cast | Opcode::SCast | Opcode::FpCast | Opcode::PtrCast)
    }

    /// Commutative ops whose operands may be reordered freely.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Mul
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::AndBool
                | Opcode::OrBool
                | Opcode::SetEq
                | Opcode::SetNe
        )
    }

    /// The comparison computing the logical negation of this one.
    /// Float negation pairs ordered with unordered duals (IEEE 754).
    pub fn negate(self) -> Opcode {
        match self {
            Opcode::SetEq => Opcode::SetNe,
            Opcode::SetNe => Opcode::SetEq,
            Opcode::SetLe => Opcode::SetGt,
            Opcode::SetGe => Opcode::SetLt,
            Opcode::SetLt => Opcode::SetGe,
            Opcode::SetGt => Opcode::SetLe,
            Opcode::SetB => Opcode::SetAe,
            Opcode::SetA => Opcode::SetBe,
            Opcode::SetBe => Opcode::SetA,
            Opcode::SetAe => Opcode::SetB,
            Opcode::FcmpOrd => Opcode::FcmpUno,
            Opcode::FcmpUno => Opcode::FcmpOrd,
            Opcode::FcmpOeq => Opcode::FcmpUne,
            Opcode::FcmpOne => Opcode::FcmpUeq,
            Opcode::FcmpOle => Opcode::FcmpUgt,
            Opcode::FcmpOge => Opcode::FcmpUlt,
            Opcode::FcmpOlt => Opcode::FcmpUge,
            Opcode::FcmpOgt => Opcode::FcmpUle,
            Opcode::FcmpUeq => Opcode::FcmpOne,
            Opcode::FcmpUne => Opcode::FcmpOeq,
            Opcode::FcmpUle => Opcode::FcmpOgt,
            Opcode::FcmpUge => Opcode::FcmpOlt,
            Opcode::FcmpUlt => Opcode::FcmpOge,
            Opcode::FcmpUgt => Opcode::FcmpOle,
            _ => self,
        }
    }

    /// The comparison equivalent to this one with swapped operands.
    pub fn swap(self) -> Opcode {
        match self {
            Opcode::SetLe => Opcode::SetGe,
            Opcode::SetGe => Opcode::SetLe,
            Opcode::SetLt => Opcode::SetGt,
            Opcode::SetGt => Opcode::SetLt,
            Opcode::SetB => Opcode::SetA,
            Opcode::SetA => Opcode::SetB,
            Opcode::SetBe => Opcode::SetAe,
            Opcode::SetAe => Opcode::SetBe,
            Opcode::FcmpOle => Opcode::FcmpOge,
            Opcode::FcmpOge => Opcode::FcmpOle,
            Opcode::FcmpOlt => Opcode::FcmpOgt,
            Opcode::FcmpOgt => Opcode::FcmpOlt,
            Opcode::FcmpUle => Opcode::FcmpUge,
            Opcode::FcmpUge => Opcode::FcmpUle,
            Opcode::FcmpUlt => Opcode::FcmpUgt,
            Opcode::FcmpUgt => Opcode::FcmpUlt,
            _ => self,
        }
    }
}

/// Identifies one operand position inside an instruction.
///
/// `Src1` aliases every single-operand position (`src`, `addr`, `cond`,
/// `phi_src`, `func`, `sym`) so that opcode rewrites which keep the first
/// operand in place (SEL -> SET_EQ, CBR cond rebinding, MUL -> NEG) leave
/// existing use-list entries valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Src1,
    Src2,
    Src3,
    /// STORE only: the value being stored lives in the target field.
    Target,
    /// The i-th phi-node operand.
    Phi(u32),
    /// The i-th call argument.
    Arg(u32),
}

/// Opcode-specific instruction payload.
#[derive(Debug, Clone)]
pub enum InsnKind {
    /// ENTRY, NOP, BADOP, DEATHNOTE: no operands.
    Empty,
    Ret { src: PseudoId },
    Br { target: BlockId },
    Cbr { cond: PseudoId, bb_true: BlockId, bb_false: BlockId },
    Switch { cond: PseudoId, jumps: Vec<MultiJmp> },
    ComputedGoto { cond: PseudoId, targets: Vec<BlockId> },
    /// Binary ops and all comparisons.
    Binop { src1: PseudoId, src2: PseudoId },
    Sel { cond: PseudoId, if_true: PseudoId, if_false: PseudoId },
    Range { src: PseudoId, lo: PseudoId, hi: PseudoId },
    /// NOT, NEG, FNEG, COPY.
    Unop { src: PseudoId },
    Cast { src: PseudoId, orig_ty: Ty },
    /// LOAD and STORE. For STORE the value pseudo lives in `target`.
    Memop { addr: PseudoId, offset: i64 },
    SymAddr { sym: PseudoId },
    SetVal { expr: ExprRef },
    SetFVal { value: f64 },
    Phi { list: Vec<PseudoId> },
    /// The back-list records which phi-nodes consume this source; it is
    /// maintained for the de-SSA pass.
    PhiSource { src: PseudoId, users: Vec<InsnId> },
    Call { func: PseudoId, args: Vec<PseudoId>, arg_types: Vec<Ty> },
    Slice { base: PseudoId, from: u32, len: u32 },
    Asm { template: String },
    Context { increment: i32, check: bool },
}

/// An instruction: shared header plus opcode-shaped payload.
#[derive(Debug, Clone)]
pub struct Insn {
    pub opcode: Opcode,
    /// Result width in bits.
    pub size: u32,
    /// Owning block. `None` means the instruction is deleted and must be
    /// ignored by every consumer.
    pub bb: Option<BlockId>,
    /// Result pseudo; the stored value for STORE; VOID when no result.
    pub target: PseudoId,
    pub ty: Ty,
    pub pos: Pos,
    pub kind: InsnKind,
}

impl Insn {
    /// Read the pseudo held by `slot`, if the slot exists for this payload.
    pub fn operand(&self, slot: Slot) -> Option<PseudoId> {
        match (&self.kind, slot) {
            (InsnKind::Ret { src }, Slot::Src1) => Some(*src),
            (InsnKind::Cbr { cond, .. }, Slot::Src1) => Some(*cond),
            (InsnKind::Switch { cond, .. }, Slot::Src1) => Some(*cond),
            (InsnKind::ComputedGoto { cond, .. }, Slot::Src1) => Some(*cond),
            (InsnKind::Binop { src1, .. }, Slot::Src1) => Some(*src1),
            (InsnKind::Binop { src2, .. }, Slot::Src2) => Some(*src2),
            (InsnKind::Sel { cond, .. }, Slot::Src1) => Some(*cond),
            (InsnKind::Sel { if_true, .. }, Slot::Src2) => Some(*if_true),
            (InsnKind::Sel { if_false, .. }, Slot::Src3) => Some(*if_false),
            (InsnKind::Range { src, .. }, Slot::Src1) => Some(*src),
            (InsnKind::Range { lo, .. }, Slot::Src2) => Some(*lo),
            (InsnKind::Range { hi, .. }, Slot::Src3) => Some(*hi),
            (InsnKind::Unop { src }, Slot::Src1) => Some(*src),
            (InsnKind::Cast { src, .. }, Slot::Src1) => Some(*src),
            (InsnKind::Memop { addr, .. }, Slot::Src1) => Some(*addr),
            (InsnKind::SymAddr { sym }, Slot::Src1) => Some(*sym),
            (InsnKind::PhiSource { src, .. }, Slot::Src1) => Some(*src),
            (InsnKind::Call { func, .. }, Slot::Src1) => Some(*func),
            (InsnKind::Slice { base, .. }, Slot::Src1) => Some(*base),
            (InsnKind::Phi { list }, Slot::Phi(i)) => list.get(i as usize).copied(),
            (InsnKind::Call { args, .. }, Slot::Arg(i)) => args.get(i as usize).copied(),
            (_, Slot::Target) if self.opcode == Opcode::Store => Some(self.target),
            _ => None,
        }
    }

    /// Mutable access to the pseudo held by `slot`.
    pub fn operand_mut(&mut self, slot: Slot) -> Option<&mut PseudoId> {
        if slot == Slot::Target {
            return if self.opcode == Opcode::Store { Some(&mut self.target) } else { None };
        }
        match (&mut self.kind, slot) {
            (InsnKind::Ret { src }, Slot::Src1) => Some(src),
            (InsnKind::Cbr { cond, .. }, Slot::Src1) => Some(cond),
            (InsnKind::Switch { cond, .. }, Slot::Src1) => Some(cond),
            (InsnKind::ComputedGoto { cond, .. }, Slot::Src1) => Some(cond),
            (InsnKind::Binop { src1, .. }, Slot::Src1) => Some(src1),
            (InsnKind::Binop { src2, .. }, Slot::Src2) => Some(src2),
            (InsnKind::Sel { cond, .. }, Slot::Src1) => Some(cond),
            (InsnKind::Sel { if_true, .. }, Slot::Src2) => Some(if_true),
            (InsnKind::Sel { if_false, .. }, Slot::Src3) => Some(if_false),
            (InsnKind::Range { src, .. }, Slot::Src1) => Some(src),
            (InsnKind::Range { lo, .. }, Slot::Src2) => Some(lo),
            (InsnKind::Range { hi, .. }, Slot::Src3) => Some(hi),
            (InsnKind::Unop { src }, Slot::Src1) => Some(src),
            (InsnKind::Cast { src, .. }, Slot::Src1) => Some(src),
            (InsnKind::Memop { addr, .. }, Slot::Src1) => Some(addr),
            (InsnKind::SymAddr { sym }, Slot::Src1) => Some(sym),
            (InsnKind::PhiSource { src, .. }, Slot::Src1) => Some(src),
            (InsnKind::Call { func, .. }, Slot::Src1) => Some(func),
            (InsnKind::Slice { base, .. }, Slot::Src1) => Some(base),
            (InsnKind::Phi { list }, Slot::Phi(i)) => list.get_mut(i as usize),
            (InsnKind::Call { args, .. }, Slot::Arg(i)) => args.get_mut(i as usize),
            _ => None,
        }
    }

    /// Every operand slot of this instruction, in payload order. STORE's
    /// value-in-target is included; result targets are not.
    pub fn operand_slots(&self) -> Vec<Slot> {
        match &self.kind {
            InsnKind::Empty
            | InsnKind::Br { .. }
            | InsnKind::SetVal { .. }
            | InsnKind::SetFVal { .. }
            | InsnKind::Asm { .. }
            | InsnKind::Context { .. } => Vec::new(),
            InsnKind::Ret { .. }
            | InsnKind::Cbr { .. }
            | InsnKind::Switch { .. }
            | InsnKind::ComputedGoto { .. }
            | InsnKind::Unop { .. }
            | InsnKind::Cast { .. }
            | InsnKind::SymAddr { .. }
            | InsnKind::PhiSource { .. }
            | InsnKind::Slice { .. } => vec![Slot::Src1],
            InsnKind::Binop { .. } => vec![Slot::Src1, Slot::Src2],
            InsnKind::Sel { .. } | InsnKind::Range { .. } => {
                vec![Slot::Src1, Slot::Src2, Slot::Src3]
            }
            InsnKind::Memop { .. } => {
                if self.opcode == Opcode::Store {
                    vec![Slot::Src1, Slot::Target]
                } else {
                    vec![Slot::Src1]
                }
            }
            InsnKind::Phi { list } => (0..list.len() as u32).map(Slot::Phi).collect(),
            InsnKind::Call { args, .. } => {
                let mut slots = vec![Slot::Src1];
                slots.extend((0..args.len() as u32).map(Slot::Arg));
                slots
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_ranges() {
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::ComputedGoto.is_terminator());
        assert!(!Opcode::Add.is_terminator());

        assert!(Opcode::Add.is_binop());
        assert!(Opcode::OrBool.is_binop());
        assert!(!Opcode::FcmpOrd.is_binop());
        assert!(!Opcode::SetEq.is_binop());

        assert!(Opcode::FcmpOrd.is_compare());
        assert!(Opcode::SetAe.is_compare());
        assert!(Opcode::SetEq.is_int_compare());
        assert!(!Opcode::FcmpUno.is_int_compare());
        assert!(!Opcode::Not.is_compare());
    }

    #[test]
    fn test_negate_is_involutive() {
        let compares = [
            Opcode::SetEq,
            Opcode::SetNe,
            Opcode::SetLe,
            Opcode::SetGe,
            Opcode::SetLt,
            Opcode::SetGt,
            Opcode::SetB,
            Opcode::SetA,
            Opcode::SetBe,
            Opcode::SetAe,
            Opcode::FcmpOrd,
            Opcode::FcmpUno,
            Opcode::FcmpOeq,
            Opcode::FcmpUne,
            Opcode::FcmpOlt,
            Opcode::FcmpUge,
        ];
        for op in compares {
            assert_eq!(op.negate().negate(), op, "negate(negate({:?}))", op);
            assert_eq!(op.swap().swap(), op, "swap(swap({:?}))", op);
        }
    }

    #[test]
    fn test_mirror_table() {
        assert_eq!(Opcode::SetLt.swap(), Opcode::SetGt);
        assert_eq!(Opcode::SetLe.swap(), Opcode::SetGe);
        assert_eq!(Opcode::SetB.swap(), Opcode::SetA);
        assert_eq!(Opcode::SetEq.swap(), Opcode::SetEq);
        assert_eq!(Opcode::SetLt.negate(), Opcode::SetGe);
        assert_eq!(Opcode::SetBe.negate(), Opcode::SetA);
        assert_eq!(Opcode::FcmpOle.negate(), Opcode::FcmpUgt);
    }
}
