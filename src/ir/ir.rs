//! Functions, basic blocks, and the builder API used by the linearizer.
//!
//! A `Function` owns three arenas (pseudos, instructions, blocks) plus the
//! interning caches for constants, symbol references, and arguments. All
//! structural mutation funnels through the use-def primitives in `usedef`
//! so the use-list invariant holds between any two operations.

use rustc_hash::FxHashMap;

use crate::common::diag::Pos;
use crate::common::types::Ty;
use crate::ir::insn::{ExprRef, Insn, InsnId, InsnKind, MultiJmp, Opcode, Slot};
use crate::ir::pseudo::{Pseudo, PseudoId, PseudoKind, VOID};

/// Index of a basic block in its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Declaration metadata consumed from the front-end: everything the
/// simplifier needs to know about a named symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Ty,
    /// The `pure` modifier: calls to this function have no observable side
    /// effects and may be removed when their result is unused.
    pub pure_fn: bool,
}

/// An ordered instruction sequence with explicit predecessor/successor
/// lists. A well-formed non-empty block ends with exactly one terminator.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub pos: Pos,
    /// Predecessor blocks, one entry per incoming edge.
    pub parents: Vec<BlockId>,
    /// Successor blocks, one entry per outgoing edge.
    pub children: Vec<BlockId>,
    pub insns: Vec<InsnId>,
}

/// A function body: name, entry block, and the per-function arenas.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub entry: BlockId,
    pub blocks: Vec<BasicBlock>,
    pub insns: Vec<Insn>,
    pub pseudos: Vec<Pseudo>,
    pub symbols: Vec<Symbol>,
    /// Promotable address-taken accesses, consumed by mem2reg.
    pub accesses: Vec<PseudoId>,
    vals: FxHashMap<i64, PseudoId>,
    syms: FxHashMap<SymbolId, PseudoId>,
    args: FxHashMap<u32, PseudoId>,
    next_reg: u32,
}

impl Function {
    /// Create a function with an entry block holding an ENTRY instruction.
    pub fn new(name: impl Into<String>) -> Function {
        let mut f = Function {
            name: name.into(),
            entry: BlockId(0),
            blocks: vec![BasicBlock::default()],
            insns: Vec::new(),
            pseudos: vec![Pseudo::new(PseudoKind::Void)],
            symbols: Vec::new(),
            accesses: Vec::new(),
            vals: FxHashMap::default(),
            syms: FxHashMap::default(),
            args: FxHashMap::default(),
            next_reg: 0,
        };
        f.create_insn(BlockId(0), Opcode::Entry, 0, Ty::void(), InsnKind::Empty);
        f
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn block(&self, bb: BlockId) -> &BasicBlock {
        &self.blocks[bb.0 as usize]
    }

    pub fn block_mut(&mut self, bb: BlockId) -> &mut BasicBlock {
        &mut self.blocks[bb.0 as usize]
    }

    pub fn insn(&self, id: InsnId) -> &Insn {
        &self.insns[id.0 as usize]
    }

    pub fn insn_mut(&mut self, id: InsnId) -> &mut Insn {
        &mut self.insns[id.0 as usize]
    }

    pub fn pseudo(&self, id: PseudoId) -> &Pseudo {
        &self.pseudos[id.0 as usize]
    }

    pub fn pseudo_mut(&mut self, id: PseudoId) -> &mut Pseudo {
        &mut self.pseudos[id.0 as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// True for a VAL pseudo with value 0.
    pub fn is_zero(&self, p: PseudoId) -> bool {
        self.pseudo(p).value() == Some(0)
    }

    /// True for a VAL pseudo with a nonzero value.
    pub fn is_nonzero(&self, p: PseudoId) -> bool {
        matches!(self.pseudo(p).value(), Some(v) if v != 0)
    }

    /// The last live instruction of a block, if any.
    pub fn last_insn(&self, bb: BlockId) -> Option<InsnId> {
        self.block(bb).insns.iter().rev().copied().find(|&i| self.insn(i).bb.is_some())
    }

    /// The block's terminator: its last live instruction when that is in
    /// the terminator opcode range.
    pub fn terminator(&self, bb: BlockId) -> Option<InsnId> {
        self.last_insn(bb).filter(|&i| self.insn(i).opcode.is_terminator())
    }

    // ── Pseudo allocation ─────────────────────────────────────────────────

    /// The interned VAL pseudo for `v`: same value, same pseudo.
    pub fn value_pseudo(&mut self, v: i64) -> PseudoId {
        if let Some(&id) = self.vals.get(&v) {
            return id;
        }
        let id = PseudoId(self.pseudos.len() as u32);
        self.pseudos.push(Pseudo::new(PseudoKind::Val(v)));
        self.vals.insert(v, id);
        id
    }

    /// The interned SYM pseudo referencing `sym`.
    pub fn sym_pseudo(&mut self, sym: SymbolId) -> PseudoId {
        if let Some(&id) = self.syms.get(&sym) {
            return id;
        }
        let id = PseudoId(self.pseudos.len() as u32);
        self.pseudos.push(Pseudo::new(PseudoKind::Sym(sym)));
        self.syms.insert(sym, id);
        id
    }

    /// The interned ARG pseudo for the n-th formal parameter.
    pub fn arg_pseudo(&mut self, n: u32) -> PseudoId {
        if let Some(&id) = self.args.get(&n) {
            return id;
        }
        let id = PseudoId(self.pseudos.len() as u32);
        self.pseudos.push(Pseudo::new(PseudoKind::Arg(n)));
        self.args.insert(n, id);
        id
    }

    /// A fresh REG pseudo defined by `def`.
    pub fn alloc_pseudo(&mut self, def: InsnId) -> PseudoId {
        self.next_reg += 1;
        let id = PseudoId(self.pseudos.len() as u32);
        self.pseudos.push(Pseudo::new(PseudoKind::Reg { def, nr: self.next_reg }));
        id
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, ty: Ty, pure_fn: bool) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol { name: name.into(), ty, pure_fn });
        id
    }

    // ── Block and instruction construction ────────────────────────────────

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    /// Append a raw instruction to `bb`. Operands in `kind` are not yet
    /// registered on use lists; builders call `use_pseudo` afterwards.
    pub fn create_insn(
        &mut self,
        bb: BlockId,
        opcode: Opcode,
        size: u32,
        ty: Ty,
        kind: InsnKind,
    ) -> InsnId {
        let id = InsnId(self.insns.len() as u32);
        self.insns.push(Insn {
            opcode,
            size,
            bb: Some(bb),
            target: VOID,
            ty,
            pos: Pos::none(),
            kind,
        });
        self.block_mut(bb).insns.push(id);
        id
    }

    fn def_target(&mut self, insn: InsnId) -> PseudoId {
        let target = self.alloc_pseudo(insn);
        self.insn_mut(insn).target = target;
        target
    }

    fn link_blocks(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).children.push(to);
        self.block_mut(to).parents.push(from);
    }

    /// Remove one `entry` occurrence from a block edge list.
    pub(crate) fn remove_edge_entry(list: &mut Vec<BlockId>, entry: BlockId) -> bool {
        if let Some(i) = list.iter().position(|&b| b == entry) {
            list.remove(i);
            return true;
        }
        false
    }

    // ── Builders ──────────────────────────────────────────────────────────

    pub fn insn_binop(
        &mut self,
        bb: BlockId,
        op: Opcode,
        size: u32,
        src1: PseudoId,
        src2: PseudoId,
    ) -> PseudoId {
        let insn =
            self.create_insn(bb, op, size, Ty::int(size), InsnKind::Binop { src1: VOID, src2: VOID });
        self.use_pseudo(insn, src1, Slot::Src1);
        self.use_pseudo(insn, src2, Slot::Src2);
        self.def_target(insn)
    }

    pub fn insn_unop(&mut self, bb: BlockId, op: Opcode, size: u32, src: PseudoId) -> PseudoId {
        let insn = self.create_insn(bb, op, size, Ty::int(size), InsnKind::Unop { src: VOID });
        self.use_pseudo(insn, src, Slot::Src1);
        self.def_target(insn)
    }

    pub fn insn_cast(
        &mut self,
        bb: BlockId,
        op: Opcode,
        size: u32,
        ty: Ty,
        orig_ty: Ty,
        src: PseudoId,
    ) -> PseudoId {
        let insn = self.create_insn(bb, op, size, ty, InsnKind::Cast { src: VOID, orig_ty });
        self.use_pseudo(insn, src, Slot::Src1);
        self.def_target(insn)
    }

    pub fn insn_sel(
        &mut self,
        bb: BlockId,
        size: u32,
        cond: PseudoId,
        if_true: PseudoId,
        if_false: PseudoId,
    ) -> PseudoId {
        let insn = self.create_insn(
            bb,
            Opcode::Sel,
            size,
            Ty::int(size),
            InsnKind::Sel { cond: VOID, if_true: VOID, if_false: VOID },
        );
        self.use_pseudo(insn, cond, Slot::Src1);
        self.use_pseudo(insn, if_true, Slot::Src2);
        self.use_pseudo(insn, if_false, Slot::Src3);
        self.def_target(insn)
    }

    pub fn insn_load(
        &mut self,
        bb: BlockId,
        size: u32,
        ty: Ty,
        addr: PseudoId,
        offset: i64,
    ) -> PseudoId {
        let insn = self.create_insn(bb, Opcode::Load, size, ty, InsnKind::Memop { addr: VOID, offset });
        self.use_pseudo(insn, addr, Slot::Src1);
        self.def_target(insn)
    }

    pub fn insn_store(
        &mut self,
        bb: BlockId,
        size: u32,
        ty: Ty,
        value: PseudoId,
        addr: PseudoId,
        offset: i64,
    ) -> InsnId {
        let insn =
            self.create_insn(bb, Opcode::Store, size, ty, InsnKind::Memop { addr: VOID, offset });
        self.use_pseudo(insn, addr, Slot::Src1);
        self.use_pseudo(insn, value, Slot::Target);
        insn
    }

    pub fn insn_symaddr(&mut self, bb: BlockId, sym: SymbolId) -> PseudoId {
        let sp = self.sym_pseudo(sym);
        let insn = self.create_insn(bb, Opcode::SymAddr, 64, Ty::ptr(), InsnKind::SymAddr { sym: VOID });
        self.use_pseudo(insn, sp, Slot::Src1);
        self.def_target(insn)
    }

    pub fn insn_setval(&mut self, bb: BlockId, size: u32, ty: Ty, expr: ExprRef) -> PseudoId {
        let insn = self.create_insn(bb, Opcode::SetVal, size, ty, InsnKind::SetVal { expr });
        self.def_target(insn)
    }

    pub fn insn_setfval(&mut self, bb: BlockId, size: u32, value: f64) -> PseudoId {
        let insn =
            self.create_insn(bb, Opcode::SetFVal, size, Ty::float(size), InsnKind::SetFVal { value });
        self.def_target(insn)
    }

    pub fn insn_call(
        &mut self,
        bb: BlockId,
        size: u32,
        ty: Ty,
        func: PseudoId,
        args: Vec<PseudoId>,
        arg_types: Vec<Ty>,
    ) -> PseudoId {
        let insn = self.create_insn(
            bb,
            Opcode::Call,
            size,
            ty,
            InsnKind::Call { func: VOID, args: vec![VOID; args.len()], arg_types },
        );
        self.use_pseudo(insn, func, Slot::Src1);
        for (i, arg) in args.into_iter().enumerate() {
            self.use_pseudo(insn, arg, Slot::Arg(i as u32));
        }
        self.def_target(insn)
    }

    /// Build a phi-node over already-allocated PHI operand pseudos, and
    /// register it on each operand's phi-source back-list.
    pub fn insn_phi(&mut self, bb: BlockId, size: u32, ty: Ty, sources: Vec<PseudoId>) -> PseudoId {
        let n = sources.len();
        let insn = self.create_insn(bb, Opcode::Phi, size, ty, InsnKind::Phi { list: vec![VOID; n] });
        for (i, src) in sources.into_iter().enumerate() {
            self.use_pseudo(insn, src, Slot::Phi(i as u32));
            if let Some(def) = self.pseudo(src).def() {
                if let InsnKind::PhiSource { users, .. } = &mut self.insn_mut(def).kind {
                    users.push(insn);
                }
            }
        }
        self.def_target(insn)
    }

    /// Allocate a PHI pseudo fed by `operand`, defining it with a
    /// phi-source instruction placed before the terminator of `source_bb`.
    pub fn alloc_phi(&mut self, source_bb: BlockId, operand: PseudoId, ty: Ty) -> PseudoId {
        let size = ty.bits;
        let insn = self.create_insn(
            source_bb,
            Opcode::PhiSource,
            size,
            ty,
            InsnKind::PhiSource { src: VOID, users: Vec::new() },
        );
        // Keep the phi-source ahead of the block's terminator.
        let at = {
            let list = &self.block(source_bb).insns;
            list[..list.len() - 1]
                .iter()
                .position(|&i| self.insn(i).opcode.is_terminator())
        };
        if let Some(at) = at {
            let list = &mut self.block_mut(source_bb).insns;
            if let Some(last) = list.pop() {
                list.insert(at, last);
            }
        }

        self.use_pseudo(insn, operand, Slot::Src1);
        self.next_reg += 1;
        let phi = PseudoId(self.pseudos.len() as u32);
        self.pseudos.push(Pseudo::new(PseudoKind::Phi { def: insn, nr: self.next_reg }));
        self.insn_mut(insn).target = phi;
        phi
    }

    pub fn insn_range(
        &mut self,
        bb: BlockId,
        size: u32,
        src: PseudoId,
        lo: PseudoId,
        hi: PseudoId,
    ) -> InsnId {
        let insn = self.create_insn(
            bb,
            Opcode::Range,
            size,
            Ty::int(size),
            InsnKind::Range { src: VOID, lo: VOID, hi: VOID },
        );
        self.use_pseudo(insn, src, Slot::Src1);
        self.use_pseudo(insn, lo, Slot::Src2);
        self.use_pseudo(insn, hi, Slot::Src3);
        insn
    }

    // ── Terminator builders ───────────────────────────────────────────────

    pub fn insn_ret(&mut self, bb: BlockId, size: u32, src: PseudoId) -> InsnId {
        let insn = self.create_insn(bb, Opcode::Ret, size, Ty::int(size), InsnKind::Ret { src: VOID });
        self.use_pseudo(insn, src, Slot::Src1);
        insn
    }

    pub fn insn_br(&mut self, bb: BlockId, target: BlockId) -> InsnId {
        let insn = self.create_insn(bb, Opcode::Br, 0, Ty::void(), InsnKind::Br { target });
        self.link_blocks(bb, target);
        insn
    }

    pub fn insn_cbr(
        &mut self,
        bb: BlockId,
        cond: PseudoId,
        bb_true: BlockId,
        bb_false: BlockId,
    ) -> InsnId {
        let insn =
            self.create_insn(bb, Opcode::Cbr, 0, Ty::void(), InsnKind::Cbr { cond: VOID, bb_true, bb_false });
        self.use_pseudo(insn, cond, Slot::Src1);
        self.link_blocks(bb, bb_true);
        self.link_blocks(bb, bb_false);
        insn
    }

    pub fn insn_switch(&mut self, bb: BlockId, cond: PseudoId, jumps: Vec<MultiJmp>) -> InsnId {
        for jmp in &jumps {
            self.link_blocks(bb, jmp.target);
        }
        let insn =
            self.create_insn(bb, Opcode::Switch, 0, Ty::void(), InsnKind::Switch { cond: VOID, jumps });
        self.use_pseudo(insn, cond, Slot::Src1);
        insn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_interning() {
        let mut f = Function::new("t");
        let a = f.value_pseudo(42);
        let b = f.value_pseudo(42);
        let c = f.value_pseudo(7);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(f.pseudo(a).is_val());
    }

    #[test]
    fn test_entry_block() {
        let f = Function::new("t");
        assert_eq!(f.entry, BlockId(0));
        let entry = f.block(f.entry);
        assert_eq!(entry.insns.len(), 1);
        assert_eq!(f.insn(entry.insns[0]).opcode, Opcode::Entry);
    }

    #[test]
    fn test_cbr_links_edges() {
        let mut f = Function::new("t");
        let (b1, b2) = (f.add_block(), f.add_block());
        let x = f.arg_pseudo(0);
        f.insn_cbr(f.entry, x, b1, b2);
        assert_eq!(f.block(f.entry).children, vec![b1, b2]);
        assert_eq!(f.block(b1).parents, vec![f.entry]);
        assert_eq!(f.block(b2).parents, vec![f.entry]);
    }

    #[test]
    fn test_alloc_phi_precedes_terminator() {
        let mut f = Function::new("t");
        let b1 = f.add_block();
        let x = f.arg_pseudo(0);
        f.insn_br(f.entry, b1);
        let phi = f.alloc_phi(f.entry, x, Ty::int(32));
        let def = f.pseudo(phi).def().unwrap();
        let insns = &f.block(f.entry).insns;
        let def_at = insns.iter().position(|&i| i == def).unwrap();
        assert_eq!(def_at, insns.len() - 2, "phi source sits before the BR");
        assert_eq!(f.insn(def).target, phi);
    }

    #[test]
    fn test_store_value_is_a_use() {
        let mut f = Function::new("t");
        let x = f.arg_pseudo(0);
        let a = f.arg_pseudo(1);
        let st = f.insn_store(f.entry, 32, Ty::int(32), x, a, 0);
        assert!(f.pseudo(x).users.iter().any(|u| u.insn == st && u.slot == Slot::Target));
        assert!(f.pseudo(a).users.iter().any(|u| u.insn == st && u.slot == Slot::Src1));
    }
}
