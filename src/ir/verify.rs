//! Structural IR validation.
//!
//! Checks the invariants every pass must preserve; run by tests after each
//! transformation and available to hosts behind a debug switch. A failed
//! check on well-formed input is a bug in whichever pass ran last.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ir::cfg;
use crate::ir::insn::{InsnId, Slot};
use crate::ir::ir::{BlockId, Function};
use crate::ir::pseudo::{PseudoId, PseudoKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{insn} holds {pseudo:?} in {slots} slot(s) but its use list has {entries} matching entries")]
    UseCountMismatch { insn: InsnId, pseudo: PseudoId, slots: usize, entries: usize },

    #[error("use list of {pseudo:?} references {insn} slot {slot:?}, which does not hold it")]
    StaleUse { pseudo: PseudoId, insn: InsnId, slot: Slot },

    #[error("{pseudo:?} is not the target of its defining instruction {def}")]
    BadDef { pseudo: PseudoId, def: InsnId },

    #[error("{pseudo:?} has users but its defining instruction {def} is deleted")]
    UsersOfDeadDef { pseudo: PseudoId, def: InsnId },

    #[error("reachable block {block} does not end with a terminator")]
    MissingTerminator { block: BlockId },

    #[error("{insn} is a terminator in the middle of block {block}")]
    MisplacedTerminator { block: BlockId, insn: InsnId },

    #[error("deleted instruction {insn} is still listed in block {block}")]
    DeletedListed { block: BlockId, insn: InsnId },

    #[error("phi {insn} has {operands} live operands but its block has {parents} parents")]
    PhiParity { insn: InsnId, operands: usize, parents: usize },
}

/// Check every structural invariant the simplifier promises to preserve.
pub fn verify_function(f: &Function) -> Result<(), VerifyError> {
    verify_blocks(f)?;
    verify_use_lists(f)?;
    verify_defs(f)?;
    verify_phis(f)?;
    Ok(())
}

fn verify_blocks(f: &Function) -> Result<(), VerifyError> {
    for (b, block) in f.blocks.iter().enumerate() {
        let bb = BlockId(b as u32);
        for &id in &block.insns {
            if f.insn(id).bb != Some(bb) {
                return Err(VerifyError::DeletedListed { block: bb, insn: id });
            }
        }
    }
    // Reachable blocks must be well-formed: exactly one terminator, last.
    for bb in cfg::postorder(f) {
        let live: Vec<InsnId> = f
            .block(bb)
            .insns
            .iter()
            .copied()
            .filter(|&i| f.insn(i).bb.is_some())
            .collect();
        let Some((&last, rest)) = live.split_last() else {
            continue;
        };
        for &i in rest {
            if f.insn(i).opcode.is_terminator() {
                return Err(VerifyError::MisplacedTerminator { block: bb, insn: i });
            }
        }
        if !f.insn(last).opcode.is_terminator() {
            return Err(VerifyError::MissingTerminator { block: bb });
        }
    }
    Ok(())
}

fn verify_use_lists(f: &Function) -> Result<(), VerifyError> {
    // Occurrences from the instruction side, live instructions only.
    let mut occurrences: FxHashMap<(PseudoId, InsnId), usize> = FxHashMap::default();
    for (i, insn) in f.insns.iter().enumerate() {
        if insn.bb.is_none() {
            continue;
        }
        let id = InsnId(i as u32);
        for slot in insn.operand_slots() {
            let Some(p) = insn.operand(slot) else { continue };
            if f.pseudo(p).has_use_list() {
                *occurrences.entry((p, id)).or_insert(0) += 1;
            }
        }
    }

    // Use-list side: each entry must point at a live slot holding the
    // pseudo, and the counts must agree both ways.
    for (pi, pseudo) in f.pseudos.iter().enumerate() {
        let p = PseudoId(pi as u32);
        let mut counted: FxHashMap<InsnId, usize> = FxHashMap::default();
        for u in &pseudo.users {
            let insn = f.insn(u.insn);
            if insn.bb.is_none() || insn.operand(u.slot) != Some(p) {
                return Err(VerifyError::StaleUse { pseudo: p, insn: u.insn, slot: u.slot });
            }
            *counted.entry(u.insn).or_insert(0) += 1;
        }
        for (&insn, &entries) in &counted {
            let slots = occurrences.get(&(p, insn)).copied().unwrap_or(0);
            if slots != entries {
                return Err(VerifyError::UseCountMismatch { insn, pseudo: p, slots, entries });
            }
        }
    }

    // Slots with no matching use entry at all.
    for ((p, insn), &slots) in &occurrences {
        let entries = f.pseudo(*p).users.iter().filter(|u| u.insn == *insn).count();
        if entries != slots {
            return Err(VerifyError::UseCountMismatch { insn: *insn, pseudo: *p, slots, entries });
        }
    }
    Ok(())
}

fn verify_defs(f: &Function) -> Result<(), VerifyError> {
    for (pi, pseudo) in f.pseudos.iter().enumerate() {
        let p = PseudoId(pi as u32);
        let def = match pseudo.kind {
            PseudoKind::Reg { def, .. } | PseudoKind::Phi { def, .. } => def,
            _ => continue,
        };
        if f.insn(def).bb.is_none() {
            if pseudo.has_users() {
                return Err(VerifyError::UsersOfDeadDef { pseudo: p, def });
            }
            continue;
        }
        if f.insn(def).target != p {
            return Err(VerifyError::BadDef { pseudo: p, def });
        }
    }
    Ok(())
}

fn verify_phis(f: &Function) -> Result<(), VerifyError> {
    use crate::ir::insn::{InsnKind, Opcode};
    for (i, insn) in f.insns.iter().enumerate() {
        let Some(bb) = insn.bb else { continue };
        if insn.opcode != Opcode::Phi {
            continue;
        }
        let InsnKind::Phi { list } = &insn.kind else { continue };
        let live = list.iter().filter(|&&p| p != crate::ir::pseudo::VOID).count();
        let parents = f.block(bb).parents.len();
        if live > parents {
            return Err(VerifyError::PhiParity { insn: InsnId(i as u32), operands: live, parents });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Ty;
    use crate::ir::pseudo::PseudoUse;
    use crate::ir::{Opcode, VOID};

    #[test]
    fn test_well_formed_function_passes() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        f.insn_ret(f.entry, 32, t);
        assert_eq!(verify_function(&f), Ok(()));
    }

    #[test]
    fn test_detects_missing_use_entry() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        f.insn_ret(f.entry, 32, t);
        // Corrupt: drop x's use entry behind the primitives' back.
        f.pseudo_mut(x).users.clear();
        assert!(matches!(verify_function(&f), Err(VerifyError::UseCountMismatch { .. })));
    }

    #[test]
    fn test_detects_stale_use_entry() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        let def = f.pseudo(t).def().unwrap();
        f.insn_ret(f.entry, 32, t);
        // Corrupt: an extra entry for a slot that holds y, not x.
        f.pseudo_mut(x).users.push(PseudoUse { insn: def, slot: Slot::Src2 });
        assert!(matches!(verify_function(&f), Err(VerifyError::StaleUse { .. })));
    }

    #[test]
    fn test_detects_missing_terminator() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        assert!(matches!(verify_function(&f), Err(VerifyError::MissingTerminator { .. })));
    }

    #[test]
    fn test_detects_hijacked_def() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        let def = f.pseudo(t).def().unwrap();
        f.insn_ret(f.entry, 32, t);
        // Corrupt: point the instruction at a different result pseudo.
        f.insn_mut(def).target = x;
        assert!(matches!(verify_function(&f), Err(VerifyError::BadDef { .. })));
    }

    #[test]
    fn test_detects_phi_operand_overflow() {
        let mut f = Function::new("t");
        let (b1, b2) = (f.add_block(), f.add_block());
        let c = f.arg_pseudo(0);
        let x = f.arg_pseudo(1);
        f.insn_cbr(f.entry, c, b1, b2);
        f.insn_br(b1, b2);
        let ph1 = f.alloc_phi(f.entry, x, Ty::int(32));
        let ph2 = f.alloc_phi(b1, x, Ty::int(32));
        // b2 has two parents; a third live operand breaks phi parity.
        let ph3 = f.alloc_phi(b1, x, Ty::int(32));
        let r = f.insn_phi(b2, 32, Ty::int(32), vec![ph1, ph2, ph3]);
        f.insn_ret(b2, 32, r);
        assert!(matches!(verify_function(&f), Err(VerifyError::PhiParity { .. })));
    }

    #[test]
    fn test_detects_deleted_but_listed() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let st = f.insn_store(f.entry, 32, Ty::int(32), x, x, 0);
        f.insn_ret(f.entry, 32, VOID);
        f.kill_insn(st, true);
        // Without compaction the dead id still sits in the block list.
        assert!(matches!(verify_function(&f), Err(VerifyError::DeletedListed { .. })));
        f.compact_insns();
        assert_eq!(verify_function(&f), Ok(()));
    }
}
