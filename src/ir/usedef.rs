//! Use-def maintenance primitives and the instruction killer.
//!
//! All operand mutation goes through these entry points so that the use
//! lists stay exact: for every use-listed pseudo `p` and instruction `i`,
//! the number of slots in `i` holding `p` equals the number of `(i, _)`
//! entries in `p.users`. Iteration over use lists snapshots the list
//! first; nothing here mutates a list while walking it.

use crate::ir::insn::{InsnId, InsnKind, Opcode, Slot};
use crate::ir::ir::{BlockId, Function};
use crate::ir::pseudo::{PseudoId, PseudoKind, PseudoUse, VOID};
use crate::passes::Repeat;

impl Function {
    /// Write `p` into the slot and register the use.
    pub fn use_pseudo(&mut self, insn: InsnId, p: PseudoId, slot: Slot) {
        match self.insn_mut(insn).operand_mut(slot) {
            Some(op) => *op = p,
            None => {
                debug_assert!(false, "instruction {} has no operand slot {:?}", insn, slot);
                return;
            }
        }
        if self.pseudo(p).has_use_list() {
            self.pseudo_mut(p).users.push(PseudoUse { insn, slot });
        }
    }

    /// Drop the `(insn, slot)` entry from `p`'s use list. With `kill`,
    /// a pseudo left without users takes its defining instruction with it.
    pub(crate) fn rem_usage(&mut self, p: PseudoId, insn: InsnId, slot: Slot, kill: bool) -> Repeat {
        let mut repeat = Repeat::empty();
        if !self.pseudo(p).has_use_list() {
            return repeat;
        }
        if self.pseudo(p).is_sym() {
            repeat |= Repeat::SYMBOL_CLEANUP;
        }
        let users = &mut self.pseudo_mut(p).users;
        if let Some(at) = users.iter().position(|u| u.insn == insn && u.slot == slot) {
            users.remove(at);
        } else {
            debug_assert!(false, "missing use entry for pseudo in {} slot {:?}", insn, slot);
        }
        if kill && !self.pseudo(p).has_users() {
            if let Some(def) = self.pseudo(p).def() {
                repeat |= self.kill_insn(def, false);
            }
        }
        repeat
    }

    /// `rem_usage` with the dead-def cascade, for callers that already
    /// rewrote the slot themselves.
    pub(crate) fn remove_usage(&mut self, p: PseudoId, insn: InsnId, slot: Slot) -> Repeat {
        self.rem_usage(p, insn, slot, true)
    }

    /// Clear the slot to VOID and unregister the use; a def left without
    /// users is killed recursively.
    pub fn kill_use(&mut self, insn: InsnId, slot: Slot) -> Repeat {
        let Some(p) = self.insn(insn).operand(slot) else {
            return Repeat::empty();
        };
        if let Some(op) = self.insn_mut(insn).operand_mut(slot) {
            *op = VOID;
        }
        self.rem_usage(p, insn, slot, true)
    }

    /// Like `kill_use`, but never cascades into the defining instruction.
    pub fn remove_use(&mut self, insn: InsnId, slot: Slot) -> Repeat {
        let Some(p) = self.insn(insn).operand(slot) else {
            return Repeat::empty();
        };
        if let Some(op) = self.insn_mut(insn).operand_mut(slot) {
            *op = VOID;
        }
        self.rem_usage(p, insn, slot, false)
    }

    /// Redirect every user of `insn.target` to `new`, keeping both use
    /// lists exact. Afterwards the old target has no users.
    pub fn replace_target(&mut self, insn: InsnId, new: PseudoId) {
        let target = self.insn(insn).target;
        if target == new {
            return;
        }
        let users = std::mem::take(&mut self.pseudo_mut(target).users);
        for u in &users {
            if let Some(op) = self.insn_mut(u.insn).operand_mut(u.slot) {
                *op = new;
            }
        }
        if self.pseudo(new).has_use_list() {
            self.pseudo_mut(new).users.extend(users);
        }
    }

    /// Swap the contents of two operand slots, preserving use lists.
    pub fn switch_pseudo(&mut self, insn1: InsnId, slot1: Slot, insn2: InsnId, slot2: Slot) {
        let p1 = self.insn(insn1).operand(slot1).unwrap_or(VOID);
        let p2 = self.insn(insn2).operand(slot2).unwrap_or(VOID);
        self.use_pseudo(insn1, p2, slot1);
        self.use_pseudo(insn2, p1, slot2);
        self.rem_usage(p1, insn1, slot1, true);
        self.rem_usage(p2, insn2, slot2, true);
    }

    pub(crate) fn kill_phi_list(&mut self, insn: InsnId) -> Repeat {
        let n = match &self.insn(insn).kind {
            InsnKind::Phi { list } => list.len(),
            _ => 0,
        };
        let mut repeat = Repeat::empty();
        for i in 0..n {
            let slot = Slot::Phi(i as u32);
            if self.insn(insn).operand(slot) != Some(VOID) {
                repeat |= self.kill_use(insn, slot);
            }
        }
        repeat
    }

    /// Kill an instruction: remove the usage of its operands and detach it
    /// from its block. Without `force`, instructions with (possible) side
    /// effects survive: STOREs, volatile LOADs, and CALLs to anything but
    /// a statically known pure symbol. Returns the empty set when the
    /// instruction was spared (or already dead).
    pub fn kill_insn(&mut self, insn: InsnId, force: bool) -> Repeat {
        if self.insn(insn).bb.is_none() {
            return Repeat::empty();
        }
        let mut repeat = Repeat::empty();
        let opcode = self.insn(insn).opcode;
        match opcode {
            Opcode::Sel | Opcode::Range => {
                repeat |= self.kill_use(insn, Slot::Src3);
                repeat |= self.kill_use(insn, Slot::Src2);
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            op if op.is_binop() || op.is_compare() => {
                repeat |= self.kill_use(insn, Slot::Src2);
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Cast
            | Opcode::SCast
            | Opcode::FpCast
            | Opcode::PtrCast
            | Opcode::Not
            | Opcode::Neg
            | Opcode::FNeg
            | Opcode::Slice
            | Opcode::Copy
            | Opcode::Ret
            | Opcode::PhiSource => {
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Phi => {
                repeat |= self.kill_phi_list(insn);
            }
            Opcode::SymAddr => {
                repeat |= Repeat::SYMBOL_CLEANUP;
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Cbr | Opcode::ComputedGoto | Opcode::Switch => {
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Call | Opcode::InlinedCall => {
                if !force {
                    let func = self.insn(insn).operand(Slot::Src1).unwrap_or(VOID);
                    let pure_fn = match self.pseudo(func).kind {
                        PseudoKind::Sym(s) => self.symbol(s).pure_fn,
                        _ => false,
                    };
                    if !pure_fn {
                        return Repeat::empty();
                    }
                }
                let nargs = match &self.insn(insn).kind {
                    InsnKind::Call { args, .. } => args.len(),
                    _ => 0,
                };
                for i in 0..nargs {
                    repeat |= self.kill_use(insn, Slot::Arg(i as u32));
                }
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Load => {
                if !force && self.insn(insn).ty.volatile {
                    return Repeat::empty();
                }
                repeat |= self.kill_use(insn, Slot::Src1);
            }
            Opcode::Store => {
                if !force {
                    return Repeat::empty();
                }
                repeat |= self.kill_use(insn, Slot::Src1);
                repeat |= self.kill_use(insn, Slot::Target);
            }
            Opcode::Entry => return Repeat::empty(),
            // BR, SETVAL, SETFVAL, NOP, ASM, CONTEXT carry no operand uses.
            _ => {}
        }
        self.insn_mut(insn).bb = None;
        repeat | Repeat::CSE
    }

    /// Kill a trivially dead instruction: if the target has no users,
    /// drop the given operand uses and detach. Returns `None` when the
    /// instruction is still live.
    pub fn dead_insn(&mut self, insn: InsnId, slots: &[Slot]) -> Option<Repeat> {
        let target = self.insn(insn).target;
        if self.pseudo(target).has_users() {
            return None;
        }
        let mut repeat = Repeat::CSE;
        for &slot in slots {
            repeat |= self.kill_use(insn, slot);
        }
        self.insn_mut(insn).bb = None;
        Some(repeat)
    }

    /// Safe-point compaction: drop deleted instructions from every block's
    /// instruction list. Never call while iterating a block.
    pub fn compact_insns(&mut self) {
        for b in 0..self.blocks.len() {
            let keep: Vec<InsnId> = self.blocks[b]
                .insns
                .iter()
                .copied()
                .filter(|&i| self.insns[i.0 as usize].bb == Some(BlockId(b as u32)))
                .collect();
            self.blocks[b].insns = keep;
        }
    }

    /// Replace a CBR/SWITCH terminator with an unconditional BR to
    /// `target`, dropping the condition use and pruning the other edges.
    /// Raises `CFG_CLEANUP` when a detached child loses its last parent.
    pub fn insert_branch(&mut self, bb: BlockId, insn: InsnId, target: BlockId) -> Repeat {
        let mut repeat = Repeat::CSE;
        repeat |= self.kill_use(insn, Slot::Src1);
        {
            let i = self.insn_mut(insn);
            i.opcode = Opcode::Br;
            i.kind = InsnKind::Br { target };
        }
        let children = std::mem::take(&mut self.block_mut(bb).children);
        let mut kept = false;
        for child in children {
            if child == target && !kept {
                kept = true;
                self.block_mut(bb).children.push(child);
                continue;
            }
            Function::remove_edge_entry(&mut self.block_mut(child).parents, bb);
            if self.block(child).parents.is_empty() {
                repeat |= Repeat::CFG_CLEANUP;
            }
        }
        if !kept {
            self.block_mut(bb).children.push(target);
            self.block_mut(target).parents.push(bb);
        }
        repeat
    }

    /// Materialize `SEL(cond, if_true, if_false)` immediately before the
    /// conditional branch `br`, re-using its condition. The select steals
    /// the phi-node's target (and becomes its def); the caller kills the
    /// phi afterwards.
    pub fn insert_select(
        &mut self,
        bb: BlockId,
        br: InsnId,
        phi: InsnId,
        if_true: PseudoId,
        if_false: PseudoId,
    ) -> InsnId {
        let (size, ty, pos) = {
            let p = self.insn(phi);
            (p.size, p.ty, p.pos)
        };
        let cond = self.insn(br).operand(Slot::Src1).unwrap_or(VOID);
        let select = InsnId(self.insns.len() as u32);
        self.insns.push(crate::ir::insn::Insn {
            opcode: Opcode::Sel,
            size,
            bb: Some(bb),
            target: VOID,
            ty,
            pos,
            kind: InsnKind::Sel { cond: VOID, if_true: VOID, if_false: VOID },
        });
        self.use_pseudo(select, cond, Slot::Src1);
        self.use_pseudo(select, if_true, Slot::Src2);
        self.use_pseudo(select, if_false, Slot::Src3);

        let target = self.insn(phi).target;
        if let PseudoKind::Reg { def, .. } = &mut self.pseudo_mut(target).kind {
            *def = select;
        }
        self.insn_mut(select).target = target;

        let insns = &mut self.block_mut(bb).insns;
        let at = insns.iter().position(|&i| i == br).unwrap_or(insns.len());
        insns.insert(at, select);
        select
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Ty;
    use crate::ir::Opcode;

    fn use_count(f: &Function, p: PseudoId) -> usize {
        f.pseudo(p).users.len()
    }

    #[test]
    fn test_use_and_kill_use() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        assert_eq!(use_count(&f, x), 1);
        assert_eq!(use_count(&f, y), 1);

        let def = f.pseudo(t).def().unwrap();
        let r = f.kill_use(def, Slot::Src1);
        assert!(r.is_empty(), "arg pseudos have no def to cascade into");
        assert_eq!(use_count(&f, x), 0);
        assert_eq!(f.insn(def).operand(Slot::Src1), Some(VOID));
    }

    #[test]
    fn test_kill_insn_cascades_through_defs() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        // t1 = x + y; t2 = t1 * t1 -- killing t2 must take t1 with it.
        let t1 = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        let t2 = f.insn_binop(f.entry, Opcode::Mul, 32, t1, t1);
        let d1 = f.pseudo(t1).def().unwrap();
        let d2 = f.pseudo(t2).def().unwrap();

        let r = f.kill_insn(d2, false);
        assert!(r.contains(Repeat::CSE));
        assert!(f.insn(d2).bb.is_none());
        assert!(f.insn(d1).bb.is_none(), "t1 lost its only users");
        assert_eq!(use_count(&f, x), 0);
        assert_eq!(use_count(&f, y), 0);
    }

    #[test]
    fn test_remove_use_does_not_cascade() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t1 = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        let t2 = f.insn_binop(f.entry, Opcode::Mul, 32, t1, t1);
        let d1 = f.pseudo(t1).def().unwrap();
        let d2 = f.pseudo(t2).def().unwrap();

        f.remove_use(d2, Slot::Src1);
        f.remove_use(d2, Slot::Src2);
        assert_eq!(use_count(&f, t1), 0);
        assert!(f.insn(d1).bb.is_some(), "remove_use must not kill the def");
    }

    #[test]
    fn test_replace_target_rewires_users() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let y = f.arg_pseudo(1);
        let t1 = f.insn_binop(f.entry, Opcode::Add, 32, x, y);
        let t2 = f.insn_binop(f.entry, Opcode::Mul, 32, t1, t1);
        let d1 = f.pseudo(t1).def().unwrap();
        let d2 = f.pseudo(t2).def().unwrap();

        f.replace_target(d1, x);
        assert_eq!(use_count(&f, t1), 0);
        // x: original Src1 of d1 plus both slots of d2.
        assert_eq!(use_count(&f, x), 3);
        assert_eq!(f.insn(d2).operand(Slot::Src1), Some(x));
        assert_eq!(f.insn(d2).operand(Slot::Src2), Some(x));
    }

    #[test]
    fn test_switch_pseudo_same_insn() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let s = f.add_symbol("g", Ty::int(32), false);
        let g = f.sym_pseudo(s);
        let t = f.insn_binop(f.entry, Opcode::Add, 32, g, x);
        let def = f.pseudo(t).def().unwrap();

        f.switch_pseudo(def, Slot::Src1, def, Slot::Src2);
        assert_eq!(f.insn(def).operand(Slot::Src1), Some(x));
        assert_eq!(f.insn(def).operand(Slot::Src2), Some(g));
        assert_eq!(use_count(&f, x), 1);
        assert_eq!(use_count(&f, g), 1);
    }

    #[test]
    fn test_store_survives_kill_without_force() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let a = f.arg_pseudo(1);
        let st = f.insn_store(f.entry, 32, Ty::int(32), x, a, 0);
        assert!(f.kill_insn(st, false).is_empty());
        assert!(f.insn(st).bb.is_some());
        assert!(!f.kill_insn(st, true).is_empty());
        assert!(f.insn(st).bb.is_none());
        assert_eq!(use_count(&f, x), 0);
        assert_eq!(use_count(&f, a), 0);
    }

    #[test]
    fn test_volatile_load_never_killed() {
        let mut f = Function::new("t");
        let a = f.arg_pseudo(0);
        let v = f.insn_load(f.entry, 32, Ty::int(32).volatile(), a, 0);
        let def = f.pseudo(v).def().unwrap();
        assert!(f.kill_insn(def, false).is_empty());
        assert!(f.insn(def).bb.is_some());
    }

    #[test]
    fn test_pure_call_killable_impure_kept() {
        let mut f = Function::new("t");
        let pure_sym = f.add_symbol("f_pure", Ty::int(32), true);
        let impure_sym = f.add_symbol("f_impure", Ty::int(32), false);
        let x = f.arg_pseudo(0);

        let pf = f.sym_pseudo(pure_sym);
        let t1 = f.insn_call(f.entry, 32, Ty::int(32), pf, vec![x], vec![Ty::int(32)]);
        let d1 = f.pseudo(t1).def().unwrap();
        assert!(!f.kill_insn(d1, false).is_empty());

        let ipf = f.sym_pseudo(impure_sym);
        let t2 = f.insn_call(f.entry, 32, Ty::int(32), ipf, vec![x], vec![Ty::int(32)]);
        let d2 = f.pseudo(t2).def().unwrap();
        assert!(f.kill_insn(d2, false).is_empty());
        assert!(f.insn(d2).bb.is_some());
    }

    #[test]
    fn test_insert_branch_prunes_edges() {
        let mut f = Function::new("t");
        let (b1, b2) = (f.add_block(), f.add_block());
        let x = f.arg_pseudo(0);
        let cbr = f.insn_cbr(f.entry, x, b1, b2);

        let r = f.insert_branch(f.entry, cbr, b1);
        assert!(r.contains(Repeat::CSE));
        assert!(r.contains(Repeat::CFG_CLEANUP), "b2 lost its only parent");
        assert_eq!(f.insn(cbr).opcode, Opcode::Br);
        assert_eq!(f.block(f.entry).children, vec![b1]);
        assert!(f.block(b2).parents.is_empty());
        assert_eq!(use_count(&f, x), 0);
    }
}
