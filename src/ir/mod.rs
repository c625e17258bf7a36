//! The SSA intermediate representation.
//!
//! A function body is three per-function arenas -- pseudos, instructions,
//! and basic blocks -- tied together by `u32` index newtypes. Indices break
//! the pseudo <-> instruction reference cycles and make deletion cheap: a
//! killed instruction keeps its arena slot but has `bb == None`, and every
//! consumer ignores it.

pub mod cfg;
pub mod insn;
pub mod ir;
pub mod print;
pub mod pseudo;
pub mod usedef;
pub mod verify;

pub use insn::{ExprRef, Insn, InsnId, InsnKind, MultiJmp, Opcode, Slot};
pub use ir::{BasicBlock, BlockId, Function, Symbol, SymbolId};
pub use pseudo::{Pseudo, PseudoId, PseudoKind, PseudoUse, VOID};
