//! Local instruction simplification.
//!
//! Opcode-dispatched rewrites over one instruction at a time:
//!
//! - canonicalization: constants to the right of commutative ops and
//!   eq/ne; non-commutative compares mirrored into canonical order
//! - constant folding of integer binops, compares, and unops
//! - algebraic identities: x+0, x-0, x|0, x^0, x<<0 => x; x*0, x&0 => 0;
//!   x*1, x/1 => x; x%1 => 0; x-c => x+(-c); x*(-1), x/(-1) => -x
//! - same-operand forms: x-x, x^x => 0; x&x, x|x => x; x&&x => x != 0;
//!   self-comparisons fold to their truth value
//! - compare-with-bool fusion: setne(setcc(a,b), 0) => setcc(a,b) and the
//!   negated variants, over the whole compare range
//! - associative reassociation shuffling constants outward
//! - not(not x), neg(neg x) => x
//! - no-op cast elimination and cast-of-constant folding
//! - memop address folding: symaddr bases and constant add chains are
//!   absorbed into the access offset
//! - select: constant or equal-arm reduction, the {0,1} pair to a compare
//! - phi collapsing and if-conversion of two-arm diamonds into SEL
//! - branch folding: constant or compare-driven CBR rewrites, constant
//!   SWITCH reduction to an unconditional BR
//!
//! Floating-point arithmetic is carried but never folded. Every rewrite
//! preserves SSA and reports what it may have exposed via `Repeat`.

use crate::common::diag::WarningKind;
use crate::ir::insn::{InsnId, InsnKind, Opcode, Slot};
use crate::ir::ir::{BlockId, Function};
use crate::ir::pseudo::{PseudoId, PseudoKind, VOID};
use crate::passes::{eval, Repeat, SimplifyCtx};

/// Simplify one instruction. Deleted instructions are ignored.
pub fn simplify_instruction(f: &mut Function, insn: InsnId, ctx: &mut SimplifyCtx) -> Repeat {
    if f.insn(insn).bb.is_none() {
        return Repeat::empty();
    }
    match f.insn(insn).opcode {
        Opcode::Add
        | Opcode::Mul
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::AndBool
        | Opcode::OrBool => {
            let repeat = canonicalize_commutative(f, insn);
            let r = simplify_binop(f, insn, ctx);
            if !r.is_empty() {
                return repeat | r;
            }
            repeat | simplify_associative_binop(f, insn)
        }

        Opcode::SetEq | Opcode::SetNe => {
            let repeat = canonicalize_commutative(f, insn);
            repeat | simplify_binop(f, insn, ctx)
        }

        Opcode::SetLe
        | Opcode::SetGe
        | Opcode::SetLt
        | Opcode::SetGt
        | Opcode::SetB
        | Opcode::SetA
        | Opcode::SetBe
        | Opcode::SetAe => {
            let repeat = canonicalize_compare(f, insn);
            repeat | simplify_binop(f, insn, ctx)
        }

        Opcode::Sub
        | Opcode::DivU
        | Opcode::DivS
        | Opcode::ModU
        | Opcode::ModS
        | Opcode::Shl
        | Opcode::Lsr
        | Opcode::Asr => simplify_binop(f, insn, ctx),

        Opcode::Not | Opcode::Neg => simplify_unop(f, insn),

        Opcode::Load => {
            let target = f.insn(insn).target;
            if !f.pseudo(target).has_users() {
                return f.kill_insn(insn, false);
            }
            simplify_memop(f, insn, ctx)
        }
        Opcode::Store => simplify_memop(f, insn, ctx),

        Opcode::SymAddr => {
            if let Some(r) = f.dead_insn(insn, &[Slot::Src1]) {
                return r | Repeat::SYMBOL_CLEANUP;
            }
            let sym = f.insn(insn).operand(Slot::Src1).unwrap_or(VOID);
            replace_with_pseudo(f, insn, sym)
        }

        Opcode::Cast | Opcode::SCast | Opcode::FpCast | Opcode::PtrCast => simplify_cast(f, insn),

        Opcode::Phi => {
            let target = f.insn(insn).target;
            if !f.pseudo(target).has_users() {
                let mut r = f.dead_insn(insn, &[]).unwrap_or_default();
                r |= f.kill_phi_list(insn);
                return r;
            }
            clean_up_phi(f, insn)
        }
        Opcode::PhiSource => f.dead_insn(insn, &[Slot::Src1]).unwrap_or_default(),

        Opcode::Sel => simplify_select(f, insn),
        Opcode::Cbr => simplify_branch(f, insn),
        Opcode::Switch => simplify_switch(f, insn, ctx),
        Opcode::Range => simplify_range(f, insn),

        _ => Repeat::empty(),
    }
}

fn srcs2(f: &Function, insn: InsnId) -> (PseudoId, PseudoId) {
    match f.insn(insn).kind {
        InsnKind::Binop { src1, src2 } => (src1, src2),
        _ => (VOID, VOID),
    }
}

/// Replace every user of the instruction's target with `pseudo`, drop the
/// operand uses, and detach the instruction.
fn replace_with_pseudo(f: &mut Function, insn: InsnId, pseudo: PseudoId) -> Repeat {
    f.replace_target(insn, pseudo);
    let mut repeat = Repeat::CSE;
    match f.insn(insn).opcode {
        Opcode::Sel | Opcode::Range => {
            repeat |= f.kill_use(insn, Slot::Src3);
            repeat |= f.kill_use(insn, Slot::Src2);
            repeat |= f.kill_use(insn, Slot::Src1);
        }
        op if op.is_binop() || op.is_compare() => {
            repeat |= f.kill_use(insn, Slot::Src2);
            repeat |= f.kill_use(insn, Slot::Src1);
        }
        Opcode::Not
        | Opcode::Neg
        | Opcode::SymAddr
        | Opcode::Cast
        | Opcode::SCast
        | Opcode::FpCast
        | Opcode::PtrCast => {
            repeat |= f.kill_use(insn, Slot::Src1);
        }
        op => debug_assert!(false, "replace_with_pseudo on {:?}", op),
    }
    f.insn_mut(insn).bb = None;
    repeat
}

// ── Canonicalization ──────────────────────────────────────────────────────

/// Canonical operand placement: the more-constant operand on the right
/// (VAL rightmost, then SYM, then REG).
fn canonical_order(f: &Function, p1: PseudoId, p2: PseudoId) -> bool {
    match f.pseudo(p1).kind {
        PseudoKind::Val(_) => f.pseudo(p2).is_val(),
        PseudoKind::Sym(_) => f.pseudo(p2).is_val() || f.pseudo(p2).is_sym(),
        _ => true,
    }
}

fn canonicalize_commutative(f: &mut Function, insn: InsnId) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    if canonical_order(f, s1, s2) {
        return Repeat::empty();
    }
    f.switch_pseudo(insn, Slot::Src1, insn, Slot::Src2);
    Repeat::CSE
}

/// Non-commutative compares swap operands and mirror the opcode.
fn canonicalize_compare(f: &mut Function, insn: InsnId) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    if canonical_order(f, s1, s2) {
        return Repeat::empty();
    }
    f.switch_pseudo(insn, Slot::Src1, insn, Slot::Src2);
    let i = f.insn_mut(insn);
    i.opcode = i.opcode.swap();
    Repeat::CSE
}

// ── Binops ────────────────────────────────────────────────────────────────

fn simplify_binop(f: &mut Function, insn: InsnId, ctx: &mut SimplifyCtx) -> Repeat {
    if let Some(r) = f.dead_insn(insn, &[Slot::Src1, Slot::Src2]) {
        return r;
    }
    let (s1, s2) = srcs2(f, insn);
    if f.pseudo(s1).is_val() {
        if f.pseudo(s2).is_val() {
            return simplify_constant_binop(f, insn);
        }
        return simplify_constant_leftside(f, insn);
    }
    if f.pseudo(s2).is_val() {
        return simplify_constant_rightside(f, insn, ctx);
    }
    if s1 == s2 {
        return simplify_binop_same_args(f, insn, s1, ctx);
    }
    Repeat::empty()
}

fn simplify_constant_binop(f: &mut Function, insn: InsnId) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    let (opcode, size) = {
        let i = f.insn(insn);
        (i.opcode, i.size)
    };
    let left = f.pseudo(s1).value().unwrap_or(0);
    let right = f.pseudo(s2).value().unwrap_or(0);
    match eval::eval_binop(opcode, size, left, right) {
        Some(res) => {
            let val = f.value_pseudo(res);
            replace_with_pseudo(f, insn, val)
        }
        None => Repeat::empty(),
    }
}

fn simplify_constant_leftside(f: &mut Function, insn: InsnId) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    let value = f.pseudo(s1).value().unwrap_or(0);
    if value != 0 {
        return Repeat::empty();
    }
    match f.insn(insn).opcode {
        // 0 + x, 0 | x, 0 ^ x => x
        Opcode::Add | Opcode::Or | Opcode::Xor => replace_with_pseudo(f, insn, s2),
        // 0 << x, 0 >> x, 0 * x, 0 & x => 0
        Opcode::Shl | Opcode::Lsr | Opcode::Asr | Opcode::And | Opcode::Mul => {
            replace_with_pseudo(f, insn, s1)
        }
        _ => Repeat::empty(),
    }
}

fn simplify_constant_rightside(f: &mut Function, insn: InsnId, ctx: &mut SimplifyCtx) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    let value = f.pseudo(s2).value().unwrap_or(0);

    match f.insn(insn).opcode {
        Opcode::OrBool => {
            if value == 1 {
                return replace_with_pseudo(f, insn, s2);
            }
            if value == 0 {
                return replace_with_pseudo(f, insn, s1);
            }
            Repeat::empty()
        }

        Opcode::Sub => {
            if value != 0 {
                // x - c => x + (-c)
                let neg = f.value_pseudo(value.wrapping_neg());
                let i = f.insn_mut(insn);
                i.opcode = Opcode::Add;
                if let InsnKind::Binop { src2, .. } = &mut i.kind {
                    *src2 = neg;
                }
                return Repeat::CSE;
            }
            replace_with_pseudo(f, insn, s1)
        }

        Opcode::Add | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Lsr => {
            if value == 0 {
                return replace_with_pseudo(f, insn, s1);
            }
            Repeat::empty()
        }

        Opcode::Asr => simplify_asr(f, insn, s1, value, ctx),

        Opcode::ModU | Opcode::ModS => {
            if value == 1 {
                let zero = f.value_pseudo(0);
                return replace_with_pseudo(f, insn, zero);
            }
            Repeat::empty()
        }

        Opcode::DivU | Opcode::DivS | Opcode::Mul => simplify_mul_div(f, insn, value),

        Opcode::AndBool => {
            if value == 1 {
                return replace_with_pseudo(f, insn, s1);
            }
            if value == 0 {
                return replace_with_pseudo(f, insn, s2);
            }
            Repeat::empty()
        }
        Opcode::And => {
            if value == 0 {
                return replace_with_pseudo(f, insn, s2);
            }
            Repeat::empty()
        }

        Opcode::SetNe | Opcode::SetEq => simplify_seteq_setne(f, insn, value, s1),

        _ => Repeat::empty(),
    }
}

/// Number of significant bits in a constant, rounded up to 8/16/32/64.
fn value_size(value: i64) -> u32 {
    let v = value >> 8;
    if v == 0 {
        return 8;
    }
    let v = v >> 8;
    if v == 0 {
        return 16;
    }
    let v = v >> 16;
    if v == 0 {
        return 32;
    }
    64
}

/// Best known upper bound on the significant bits of an operand: follows
/// zero-extending casts and constant magnitudes.
fn operand_size(f: &Function, insn: InsnId, pseudo: PseudoId) -> u32 {
    let mut size = f.insn(insn).size;
    match f.pseudo(pseudo).kind {
        PseudoKind::Reg { def, .. } => {
            let d = f.insn(def);
            if d.opcode == Opcode::Cast {
                if let InsnKind::Cast { orig_ty, .. } = d.kind {
                    if orig_ty.bits > 0 && orig_ty.bits < size {
                        size = orig_ty.bits;
                    }
                }
            }
        }
        PseudoKind::Val(v) => {
            let s = value_size(v);
            if s < size {
                size = s;
            }
        }
        _ => {}
    }
    size
}

fn simplify_asr(
    f: &mut Function,
    insn: InsnId,
    pseudo: PseudoId,
    value: i64,
    ctx: &mut SimplifyCtx,
) -> Repeat {
    let size = operand_size(f, insn, pseudo);
    if value >= size as i64 {
        let pos = f.insn(insn).pos;
        ctx.diag.warn(pos, WarningKind::ShiftCountOverflow, "right shift by bigger than source value");
        let zero = f.value_pseudo(0);
        return replace_with_pseudo(f, insn, zero);
    }
    if value == 0 {
        return replace_with_pseudo(f, insn, pseudo);
    }
    Repeat::empty()
}

fn simplify_mul_div(f: &mut Function, insn: InsnId, value: i64) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    let (opcode, size) = {
        let i = f.insn(insn);
        (i.opcode, i.size)
    };
    if size == 0 || size > 64 {
        return Repeat::empty();
    }

    if value == 1 {
        return replace_with_pseudo(f, insn, s1);
    }

    if opcode == Opcode::Mul && value == 0 {
        return replace_with_pseudo(f, insn, s2);
    }

    if opcode == Opcode::Mul || opcode == Opcode::DivS {
        let sbit = 1u64 << (size - 1);
        let bits = sbit | (sbit - 1);
        if (value as u64) & sbit != 0 {
            // Negative at this width; only -1 is interesting.
            let extended = ((value as u64) | !bits) as i64;
            if extended == -1 {
                // x * (-1), x / (-1) => -x
                let i = f.insn_mut(insn);
                i.opcode = Opcode::Neg;
                i.kind = InsnKind::Unop { src: s1 };
                return Repeat::CSE;
            }
        }
    }

    Repeat::empty()
}

/// Fuse a 0/1 comparison of a comparison:
///   setcc.n %t <- %a, %b ; setne.m %r <- %t, $0
/// becomes
///   setcc.m %r <- %a, %b
/// (negating setcc when the test inverts the sense).
fn simplify_seteq_setne(f: &mut Function, insn: InsnId, value: i64, old: PseudoId) -> Repeat {
    if value != 0 && value != 1 {
        return Repeat::empty();
    }
    let Some(def) = f.pseudo(old).def() else {
        return Repeat::empty();
    };
    let def_opcode = f.insn(def).opcode;
    if !def_opcode.is_compare() {
        return Repeat::empty();
    }
    let (a, b) = srcs2(f, def);
    let inverse = (f.insn(insn).opcode == Opcode::SetNe) == (value == 1);
    f.insn_mut(insn).opcode = if inverse { def_opcode.negate() } else { def_opcode };
    f.use_pseudo(insn, a, Slot::Src1);
    f.use_pseudo(insn, b, Slot::Src2);
    f.remove_usage(old, insn, Slot::Src1) | Repeat::CSE
}

fn simplify_binop_same_args(
    f: &mut Function,
    insn: InsnId,
    arg: PseudoId,
    ctx: &mut SimplifyCtx,
) -> Repeat {
    let pos = f.insn(insn).pos;
    match f.insn(insn).opcode {
        Opcode::SetNe | Opcode::SetLt | Opcode::SetGt | Opcode::SetB | Opcode::SetA => {
            ctx.diag.warn(pos, WarningKind::TautologicalCompare, "self-comparison always evaluates to false");
            let zero = f.value_pseudo(0);
            replace_with_pseudo(f, insn, zero)
        }
        Opcode::Sub | Opcode::Xor => {
            let zero = f.value_pseudo(0);
            replace_with_pseudo(f, insn, zero)
        }
        Opcode::SetEq | Opcode::SetLe | Opcode::SetGe | Opcode::SetBe | Opcode::SetAe => {
            ctx.diag.warn(pos, WarningKind::TautologicalCompare, "self-comparison always evaluates to true");
            let one = f.value_pseudo(1);
            replace_with_pseudo(f, insn, one)
        }
        Opcode::And | Opcode::Or => replace_with_pseudo(f, insn, arg),
        Opcode::AndBool | Opcode::OrBool => {
            // x && x, x || x => x != 0
            let r = f.remove_usage(arg, insn, Slot::Src2);
            let zero = f.value_pseudo(0);
            let i = f.insn_mut(insn);
            i.opcode = Opcode::SetNe;
            if let InsnKind::Binop { src2, .. } = &mut i.kind {
                *src2 = zero;
            }
            r | Repeat::CSE
        }
        _ => Repeat::empty(),
    }
}

/// For a commutative associative chain `(x op c1) op c2` whose inner value
/// has a single user, swap the inner left operand with the outer constant
/// so both constants meet in the inner instruction and fold there.
fn simplify_associative_binop(f: &mut Function, insn: InsnId) -> Repeat {
    let (s1, s2) = srcs2(f, insn);
    if !f.pseudo(s2).is_simple() {
        return Repeat::empty();
    }
    let PseudoKind::Reg { def, .. } = f.pseudo(s1).kind else {
        return Repeat::empty();
    };
    if def == insn {
        return Repeat::empty();
    }
    if f.insn(def).opcode != f.insn(insn).opcode {
        return Repeat::empty();
    }
    let (_, inner2) = srcs2(f, def);
    if !f.pseudo(inner2).is_simple() {
        return Repeat::empty();
    }
    if f.pseudo(f.insn(def).target).users.len() != 1 {
        return Repeat::empty();
    }
    f.switch_pseudo(def, Slot::Src1, insn, Slot::Src2);
    Repeat::CSE
}

// ── Unops ─────────────────────────────────────────────────────────────────

fn simplify_unop(f: &mut Function, insn: InsnId) -> Repeat {
    if let Some(r) = f.dead_insn(insn, &[Slot::Src1]) {
        return r;
    }
    let src = match f.insn(insn).kind {
        InsnKind::Unop { src } => src,
        _ => return Repeat::empty(),
    };
    let (opcode, size) = {
        let i = f.insn(insn);
        (i.opcode, i.size)
    };

    if let Some(v) = f.pseudo(src).value() {
        return match eval::eval_unop(opcode, size, v) {
            Some(res) => {
                let val = f.value_pseudo(res);
                replace_with_pseudo(f, insn, val)
            }
            None => Repeat::empty(),
        };
    }

    // not(not x) => x, neg(neg x) => x
    let Some(def) = f.pseudo(src).def() else {
        return Repeat::empty();
    };
    if f.insn(def).opcode == opcode {
        if let InsnKind::Unop { src: inner } = f.insn(def).kind {
            return replace_with_pseudo(f, insn, inner);
        }
    }
    Repeat::empty()
}

// ── Memory ops ────────────────────────────────────────────────────────────

fn simplify_one_memop(f: &mut Function, insn: InsnId, orig: PseudoId, ctx: &mut SimplifyCtx) -> Repeat {
    let addr = f.insn(insn).operand(Slot::Src1).unwrap_or(VOID);
    let PseudoKind::Reg { def, .. } = f.pseudo(addr).kind else {
        return Repeat::empty();
    };

    match f.insn(def).opcode {
        Opcode::SymAddr => {
            let sym = f.insn(def).operand(Slot::Src1).unwrap_or(VOID);
            if sym == VOID {
                return Repeat::empty();
            }
            let r = f.kill_use(insn, Slot::Src1);
            f.use_pseudo(insn, sym, Slot::Src1);
            r | Repeat::CSE | Repeat::SYMBOL_CLEANUP
        }
        Opcode::Add => {
            let (a, b) = srcs2(f, def);
            let (mut new, off) = if f.pseudo(b).is_val() {
                (a, b)
            } else if f.pseudo(a).is_val() {
                (b, a)
            } else {
                return Repeat::empty();
            };
            if new == orig {
                if new == VOID {
                    return Repeat::empty();
                }
                // A base that resolves back to this very address is broken
                // input unless the block is about to be removed.
                if ctx.pending.contains(Repeat::CFG_CLEANUP) {
                    return Repeat::empty();
                }
                let pos = f.insn(insn).pos;
                ctx.diag.warn(pos, WarningKind::InvalidAddress, "self-referencing address computation");
                new = VOID;
            }
            let off_value = f.pseudo(off).value().unwrap_or(0);
            if let InsnKind::Memop { offset, .. } = &mut f.insn_mut(insn).kind {
                *offset += off_value;
            }
            f.use_pseudo(insn, new, Slot::Src1);
            f.remove_usage(addr, insn, Slot::Src1) | Repeat::CSE | Repeat::SYMBOL_CLEANUP
        }
        _ => Repeat::empty(),
    }
}

/// Walk the whole chain of address adds backwards; iterating here (rather
/// than one step per pass) also lets the loop detection see the original
/// address.
fn simplify_memop(f: &mut Function, insn: InsnId, ctx: &mut SimplifyCtx) -> Repeat {
    let orig = f.insn(insn).operand(Slot::Src1).unwrap_or(VOID);
    let mut ret = Repeat::empty();
    loop {
        let one = simplify_one_memop(f, insn, orig, ctx);
        if one.is_empty() {
            break;
        }
        ret |= one;
    }
    ret
}

// ── Casts ─────────────────────────────────────────────────────────────────

fn simplify_cast(f: &mut Function, insn: InsnId) -> Repeat {
    if let Some(r) = f.dead_insn(insn, &[Slot::Src1]) {
        return r;
    }
    let (src, orig_ty) = match f.insn(insn).kind {
        InsnKind::Cast { src, orig_ty } => (src, orig_ty),
        _ => return Repeat::empty(),
    };
    if orig_ty.bits == 0 {
        return Repeat::empty();
    }

    let (opcode, size, ty) = {
        let i = f.insn(insn);
        (i.opcode, i.size, i.ty)
    };

    // Keep casts with a pointer on either side.
    if orig_ty.is_ptr() || ty.is_ptr() {
        return Repeat::empty();
    }
    // Keep float-to-int casts.
    if orig_ty.is_float() && !ty.is_float() {
        return Repeat::empty();
    }

    let orig_size = orig_ty.bits;
    if size == 0 {
        return Repeat::empty();
    }

    // A cast of a constant folds outright.
    if let Some(v) = f.pseudo(src).value() {
        let folded = eval::cast_value(v, orig_size, size, orig_ty.is_signed());
        let val = f.value_pseudo(folded);
        return replace_with_pseudo(f, insn, val);
    }

    // A cast of an AND whose mask already clears the high bits is a no-op.
    if let PseudoKind::Reg { def, .. } = f.pseudo(src).kind {
        let d = f.insn(def);
        if d.opcode == Opcode::And && d.size >= size {
            if let InsnKind::Binop { src2, .. } = d.kind {
                if let Some(mask) = f.pseudo(src2).value() {
                    if (mask as u64) >> (size - 1) == 0 {
                        return replace_with_pseudo(f, insn, src);
                    }
                }
            }
        }
    }

    // Same width and matching signedness: the cast changes nothing.
    if size == orig_size {
        let matching = if orig_ty.is_signed() { Opcode::SCast } else { Opcode::Cast };
        if opcode == matching {
            return replace_with_pseudo(f, insn, src);
        }
        if opcode == Opcode::FpCast && orig_ty.is_float() {
            return replace_with_pseudo(f, insn, src);
        }
    }

    Repeat::empty()
}

// ── Select ────────────────────────────────────────────────────────────────

fn simplify_select(f: &mut Function, insn: InsnId) -> Repeat {
    if let Some(r) = f.dead_insn(insn, &[Slot::Src1, Slot::Src2, Slot::Src3]) {
        return r;
    }
    let (cond, s1, s2) = match f.insn(insn).kind {
        InsnKind::Sel { cond, if_true, if_false } => (cond, if_true, if_false),
        _ => return Repeat::empty(),
    };

    if f.pseudo(cond).is_val() || s1 == s2 {
        let take_true = f.pseudo(cond).value().map_or(true, |v| v != 0);
        let mut r = f.kill_use(insn, Slot::Src1);
        let (take, kill) = if take_true { (s1, Slot::Src3) } else { (s2, Slot::Src2) };
        r |= f.kill_use(insn, kill);
        return r | replace_with_pseudo(f, insn, take);
    }

    if let (Some(v1), Some(v2)) = (f.pseudo(s1).value(), f.pseudo(s2).value()) {
        // The pair {0, 1} is special: it is the condition's truth value.
        if (v1 | v2) == 1 {
            let (zero, opcode) =
                if v1 != 0 { (s2, Opcode::SetNe) } else { (s1, Opcode::SetEq) };
            let i = f.insn_mut(insn);
            i.opcode = opcode;
            i.kind = InsnKind::Binop { src1: cond, src2: zero };
            return Repeat::CSE;
        }
    }

    // SEL(cond, 0, cond) => 0
    if cond == s2 && f.is_zero(s1) {
        let mut r = f.kill_use(insn, Slot::Src1);
        r |= f.kill_use(insn, Slot::Src3);
        let zero = f.value_pseudo(0);
        return r | replace_with_pseudo(f, insn, zero);
    }

    Repeat::empty()
}

// ── Phi-nodes ─────────────────────────────────────────────────────────────

fn phisource_src(f: &Function, def: InsnId) -> PseudoId {
    match f.insn(def).kind {
        InsnKind::PhiSource { src, .. } => src,
        _ => VOID,
    }
}

fn clean_up_phi(f: &mut Function, insn: InsnId) -> Repeat {
    let list = match &f.insn(insn).kind {
        InsnKind::Phi { list } => list.clone(),
        _ => return Repeat::empty(),
    };

    let mut last: Option<InsnId> = None;
    let mut same = true;
    for phi in list {
        if phi == VOID {
            continue;
        }
        let Some(def) = f.pseudo(phi).def() else {
            continue;
        };
        let src = phisource_src(f, def);
        if src == VOID || f.insn(def).bb.is_none() {
            continue;
        }
        if let Some(last_def) = last {
            if phisource_src(f, last_def) != src {
                same = false;
            }
            continue;
        }
        last = Some(def);
    }

    if same {
        let pseudo = last.map_or(VOID, |d| phisource_src(f, d));
        f.replace_target(insn, pseudo);
        return f.kill_insn(insn, false) | Repeat::CSE;
    }

    if_convert_phi(f, insn)
}

/// The nearest block from which `source` is reached through single-entry
/// single-exit blocks that do not themselves define `pseudo`.
fn phi_parent(f: &Function, source: BlockId, pseudo: PseudoId) -> BlockId {
    if let PseudoKind::Reg { def, .. } = f.pseudo(pseudo).kind {
        if f.insn(def).bb == Some(source) {
            return source;
        }
    }
    let b = f.block(source);
    if b.children.len() != 1 || b.parents.len() != 1 {
        return source;
    }
    b.parents[0]
}

fn if_convert_phi(f: &mut Function, insn: InsnId) -> Repeat {
    let Some(bb) = f.insn(insn).bb else {
        return Repeat::empty();
    };

    // Exactly two live phi-sources.
    let mut sources: Vec<InsnId> = Vec::new();
    let list = match &f.insn(insn).kind {
        InsnKind::Phi { list } => list.clone(),
        _ => return Repeat::empty(),
    };
    for phi in list {
        if phi == VOID {
            continue;
        }
        let Some(def) = f.pseudo(phi).def() else {
            return Repeat::empty();
        };
        if sources.len() == 2 {
            return Repeat::empty();
        }
        sources.push(def);
    }
    if sources.len() != 2 {
        return Repeat::empty();
    }

    let parents = f.block(bb).parents.clone();
    if parents.len() != 2 {
        return Repeat::empty();
    }

    let mut p1 = phisource_src(f, sources[0]);
    let mut p2 = phisource_src(f, sources[1]);
    let (Some(bb1), Some(bb2)) = (f.insn(sources[0]).bb, f.insn(sources[1]).bb) else {
        return Repeat::empty();
    };

    // Only the simple "direct parents" case.
    if (bb1 != parents[0] || bb2 != parents[1]) && (bb1 != parents[1] || bb2 != parents[0]) {
        return Repeat::empty();
    }

    let source = phi_parent(f, bb1, p1);
    if source != phi_parent(f, bb2, p2) {
        return Repeat::empty();
    }

    // The exit of the common parent decides the phi; only a plain
    // conditional branch qualifies (no multijumps, no computed gotos).
    let Some(br) = f.last_insn(source) else {
        return Repeat::empty();
    };
    let (bb_true, bb_false) = match f.insn(br).kind {
        InsnKind::Cbr { bb_true, bb_false, .. } if f.insn(br).opcode == Opcode::Cbr => {
            (bb_true, bb_false)
        }
        _ => return Repeat::empty(),
    };

    // Match up the true/false arms with p1/p2.
    if bb_true == bb2 || bb_false == bb1 {
        std::mem::swap(&mut p1, &mut p2);
    }

    f.insert_select(source, br, insn, p1, p2);
    f.kill_insn(insn, false);
    Repeat::CSE
}

// ── Branches and switches ─────────────────────────────────────────────────

/// Rebind a CBR testing `set_ne(x, 0)` / `set_eq(x, 0)` directly to `x`,
/// swapping the arms for the eq form.
fn simplify_cond_branch(
    f: &mut Function,
    br: InsnId,
    cond: PseudoId,
    def: InsnId,
    which: Slot,
) -> Repeat {
    let p = f.insn(def).operand(which).unwrap_or(VOID);
    let invert = f.insn(def).opcode == Opcode::SetEq;
    f.use_pseudo(br, p, Slot::Src1);
    let r = f.remove_usage(cond, br, Slot::Src1);
    if invert {
        if let InsnKind::Cbr { bb_true, bb_false, .. } = &mut f.insn_mut(br).kind {
            std::mem::swap(bb_true, bb_false);
        }
    }
    r | Repeat::CSE
}

fn simplify_branch(f: &mut Function, insn: InsnId) -> Repeat {
    let (cond, bb_true, bb_false) = match f.insn(insn).kind {
        InsnKind::Cbr { cond, bb_true, bb_false } => (cond, bb_true, bb_false),
        _ => return Repeat::empty(),
    };
    let Some(bb) = f.insn(insn).bb else {
        return Repeat::empty();
    };

    // Constant condition: take the branch now.
    if let Some(v) = f.pseudo(cond).value() {
        return f.insert_branch(bb, insn, if v != 0 { bb_true } else { bb_false });
    }

    // Both arms identical: drop the condition and one duplicate edge.
    if bb_true == bb_false {
        Function::remove_edge_entry(&mut f.block_mut(bb_false).parents, bb);
        Function::remove_edge_entry(&mut f.block_mut(bb).children, bb_false);
        let r = f.kill_use(insn, Slot::Src1);
        let i = f.insn_mut(insn);
        i.opcode = Opcode::Br;
        i.kind = InsnKind::Br { target: bb_false };
        return r | Repeat::CSE;
    }

    let PseudoKind::Reg { def, .. } = f.pseudo(cond).kind else {
        return Repeat::empty();
    };

    match f.insn(def).opcode {
        Opcode::SetNe | Opcode::SetEq => {
            let (a, b) = srcs2(f, def);
            if f.is_zero(a) {
                return simplify_cond_branch(f, insn, cond, def, Slot::Src2);
            }
            if f.is_zero(b) {
                return simplify_cond_branch(f, insn, cond, def, Slot::Src1);
            }
            Repeat::empty()
        }
        Opcode::Sel => {
            let (sel_cond, if_true, if_false) = match f.insn(def).kind {
                InsnKind::Sel { cond, if_true, if_false } => (cond, if_true, if_false),
                _ => return Repeat::empty(),
            };
            let (Some(v1), Some(v2)) = (f.pseudo(if_true).value(), f.pseudo(if_false).value())
            else {
                return Repeat::empty();
            };
            if v1 == 0 && v2 == 0 {
                return f.insert_branch(bb, insn, bb_false);
            }
            if v1 != 0 && v2 != 0 {
                return f.insert_branch(bb, insn, bb_true);
            }
            if v2 != 0 {
                if let InsnKind::Cbr { bb_true, bb_false, .. } = &mut f.insn_mut(insn).kind {
                    std::mem::swap(bb_true, bb_false);
                }
            }
            f.use_pseudo(insn, sel_cond, Slot::Src1);
            f.remove_usage(cond, insn, Slot::Src1) | Repeat::CSE
        }
        Opcode::Cast | Opcode::SCast => {
            // A widening (zero/sign extension) never changes truthiness.
            let (src, orig_ty) = match f.insn(def).kind {
                InsnKind::Cast { src, orig_ty } => (src, orig_ty),
                _ => return Repeat::empty(),
            };
            if f.insn(def).size > orig_ty.bits {
                f.use_pseudo(insn, src, Slot::Src1);
                return f.remove_usage(cond, insn, Slot::Src1) | Repeat::CSE;
            }
            Repeat::empty()
        }
        _ => Repeat::empty(),
    }
}

fn simplify_switch(f: &mut Function, insn: InsnId, ctx: &mut SimplifyCtx) -> Repeat {
    let (cond, jumps) = match &f.insn(insn).kind {
        InsnKind::Switch { cond, jumps } => (*cond, jumps.clone()),
        _ => return Repeat::empty(),
    };
    let Some(val) = f.pseudo(cond).value() else {
        return Repeat::empty();
    };
    let Some(bb) = f.insn(insn).bb else {
        return Repeat::empty();
    };

    let mut taken = None;
    let mut default = None;
    for jmp in &jumps {
        if jmp.is_default() {
            if default.is_none() {
                default = Some(jmp.target);
            }
            continue;
        }
        if val >= jmp.begin && val <= jmp.end {
            taken = Some(jmp.target);
            break;
        }
    }
    match taken.or(default) {
        Some(target) => f.insert_branch(bb, insn, target),
        None => {
            let pos = f.insn(insn).pos;
            ctx.diag.warn(pos, WarningKind::ImpossibleCase, "impossible case statement");
            Repeat::empty()
        }
    }
}

/// A RANGE whose operand is statically inside its constant bounds has
/// nothing left to check.
fn simplify_range(f: &mut Function, insn: InsnId) -> Repeat {
    let (src, lo, hi) = match f.insn(insn).kind {
        InsnKind::Range { src, lo, hi } => (src, lo, hi),
        _ => return Repeat::empty(),
    };
    let (Some(l), Some(h)) = (f.pseudo(lo).value(), f.pseudo(hi).value()) else {
        return Repeat::empty();
    };
    if let Some(v) = f.pseudo(src).value() {
        if v >= l && v <= h {
            return f.kill_insn(insn, false);
        }
    }
    Repeat::empty()
}
