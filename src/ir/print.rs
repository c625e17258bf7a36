//! Textual IR dump, for `-fdump-ir` and test failure output.
//!
//! The format is one instruction per line inside labeled blocks:
//!
//! ```text
//! foo:
//! .L0:
//!     <entry>
//!     add.32      %r1 <- %arg0, $3
//!     cbr         %r1, .L1, .L2
//! ```

use crate::ir::insn::{InsnId, InsnKind, Opcode};
use crate::ir::ir::Function;
use crate::ir::pseudo::{PseudoId, PseudoKind};

pub fn show_pseudo(f: &Function, p: PseudoId) -> String {
    match f.pseudo(p).kind {
        PseudoKind::Void => "VOID".to_string(),
        PseudoKind::Val(v) => format!("${}", v),
        PseudoKind::Sym(s) => f.symbol(s).name.clone(),
        PseudoKind::Reg { nr, .. } => format!("%r{}", nr),
        PseudoKind::Arg(n) => format!("%arg{}", n),
        PseudoKind::Phi { nr, .. } => format!("%phi{}", nr),
    }
}

fn opcode_name(op: Opcode) -> &'static str {
    match op {
        Opcode::BadOp => "badop",
        Opcode::Entry => "entry",
        Opcode::Ret => "ret",
        Opcode::Br => "br",
        Opcode::Cbr => "cbr",
        Opcode::Switch => "switch",
        Opcode::ComputedGoto => "jmp",
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::DivU => "divu",
        Opcode::DivS => "divs",
        Opcode::ModU => "modu",
        Opcode::ModS => "mods",
        Opcode::Shl => "shl",
        Opcode::Lsr => "lsr",
        Opcode::Asr => "asr",
        Opcode::FAdd => "fadd",
        Opcode::FSub => "fsub",
        Opcode::FMul => "fmul",
        Opcode::FDiv => "fdiv",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        Opcode::AndBool => "and-bool",
        Opcode::OrBool => "or-bool",
        Opcode::FcmpOrd => "fcmpord",
        Opcode::FcmpOeq => "fcmpoeq",
        Opcode::FcmpOne => "fcmpone",
        Opcode::FcmpOle => "fcmpole",
        Opcode::FcmpOge => "fcmpoge",
        Opcode::FcmpOlt => "fcmpolt",
        Opcode::FcmpOgt => "fcmpogt",
        Opcode::FcmpUeq => "fcmpueq",
        Opcode::FcmpUne => "fcmpune",
        Opcode::FcmpUle => "fcmpule",
        Opcode::FcmpUge => "fcmpuge",
        Opcode::FcmpUlt => "fcmpult",
        Opcode::FcmpUgt => "fcmpugt",
        Opcode::FcmpUno => "fcmpuno",
        Opcode::SetEq => "seteq",
        Opcode::SetNe => "setne",
        Opcode::SetLe => "setle",
        Opcode::SetGe => "setge",
        Opcode::SetLt => "setlt",
        Opcode::SetGt => "setgt",
        Opcode::SetB => "setb",
        Opcode::SetA => "seta",
        Opcode::SetBe => "setbe",
        Opcode::SetAe => "setae",
        Opcode::Not => "not",
        Opcode::Neg => "neg",
        Opcode::FNeg => "fneg",
        Opcode::Sel => "select",
        Opcode::Load => "load",
        Opcode::Store => "store",
        Opcode::SetVal => "setval",
        Opcode::SetFVal => "setfval",
        Opcode::SymAddr => "symaddr",
        Opcode::Phi => "phi",
        Opcode::PhiSource => "phisrc",
        Opcode::Cast => "cast",
        Opcode::SCast => "scast",
        Opcode::FpCast => "fpcast",
        Opcode::PtrCast => "ptrcast",
        Opcode::InlinedCall => "call",
        Opcode::Call => "call",
        Opcode::Slice => "slice",
        Opcode::Nop => "nop",
        Opcode::DeathNote => "dead",
        Opcode::Asm => "asm",
        Opcode::Context => "context",
        Opcode::Range => "range-check",
        Opcode::Copy => "copy",
    }
}

pub fn show_insn(f: &Function, id: InsnId) -> String {
    let insn = f.insn(id);
    let name = opcode_name(insn.opcode);
    let target = || show_pseudo(f, insn.target);
    match &insn.kind {
        InsnKind::Empty => format!("<{}>", name),
        InsnKind::Ret { src } => format!("{}.{} {}", name, insn.size, show_pseudo(f, *src)),
        InsnKind::Br { target } => format!("{} {}", name, target),
        InsnKind::Cbr { cond, bb_true, bb_false } => {
            format!("{} {}, {}, {}", name, show_pseudo(f, *cond), bb_true, bb_false)
        }
        InsnKind::Switch { cond, jumps } => {
            let mut s = format!("{} {}", name, show_pseudo(f, *cond));
            for jmp in jumps {
                if jmp.is_default() {
                    s.push_str(&format!(", default -> {}", jmp.target));
                } else if jmp.begin == jmp.end {
                    s.push_str(&format!(", {} -> {}", jmp.begin, jmp.target));
                } else {
                    s.push_str(&format!(", {}..{} -> {}", jmp.begin, jmp.end, jmp.target));
                }
            }
            s
        }
        InsnKind::ComputedGoto { cond, targets } => {
            let labels: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            format!("{} *{}, [{}]", name, show_pseudo(f, *cond), labels.join(", "))
        }
        InsnKind::Binop { src1, src2 } => format!(
            "{}.{} {} <- {}, {}",
            name,
            insn.size,
            target(),
            show_pseudo(f, *src1),
            show_pseudo(f, *src2)
        ),
        InsnKind::Sel { cond, if_true, if_false } => format!(
            "{}.{} {} <- {}, {}, {}",
            name,
            insn.size,
            target(),
            show_pseudo(f, *cond),
            show_pseudo(f, *if_true),
            show_pseudo(f, *if_false)
        ),
        InsnKind::Range { src, lo, hi } => format!(
            "{} {} between {}..{}",
            name,
            show_pseudo(f, *src),
            show_pseudo(f, *lo),
            show_pseudo(f, *hi)
        ),
        InsnKind::Unop { src } => {
            format!("{}.{} {} <- {}", name, insn.size, target(), show_pseudo(f, *src))
        }
        InsnKind::Cast { src, .. } => {
            format!("{}.{} {} <- {}", name, insn.size, target(), show_pseudo(f, *src))
        }
        InsnKind::Memop { addr, offset } => {
            if insn.opcode == Opcode::Store {
                format!("{}.{} {} -> {}[{}]", name, insn.size, target(), offset, show_pseudo(f, *addr))
            } else {
                format!("{}.{} {} <- {}[{}]", name, insn.size, target(), offset, show_pseudo(f, *addr))
            }
        }
        InsnKind::SymAddr { sym } => {
            format!("{}.{} {} <- {}", name, insn.size, target(), show_pseudo(f, *sym))
        }
        InsnKind::SetVal { expr } => format!("{}.{} {} <- expr({})", name, insn.size, target(), expr.0),
        InsnKind::SetFVal { value } => format!("{}.{} {} <- {}", name, insn.size, target(), value),
        InsnKind::Phi { list } => {
            let ops: Vec<String> = list.iter().map(|&p| show_pseudo(f, p)).collect();
            format!("{}.{} {} <- {}", name, insn.size, target(), ops.join(", "))
        }
        InsnKind::PhiSource { src, .. } => {
            format!("{}.{} {} <- {}", name, insn.size, target(), show_pseudo(f, *src))
        }
        InsnKind::Call { func, args, .. } => {
            let ops: Vec<String> = args.iter().map(|&p| show_pseudo(f, p)).collect();
            format!("{}.{} {} <- {}({})", name, insn.size, target(), show_pseudo(f, *func), ops.join(", "))
        }
        InsnKind::Slice { base, from, len } => {
            format!("{} {} <- {}[{}:{}]", name, target(), show_pseudo(f, *base), from, len)
        }
        InsnKind::Asm { template } => format!("{} \"{}\"", name, template),
        InsnKind::Context { increment, .. } => format!("{} {}", name, increment),
    }
}

pub fn show_function(f: &Function) -> String {
    let mut out = format!("{}:\n", f.name);
    for (i, block) in f.blocks.iter().enumerate() {
        let live: Vec<InsnId> = block
            .insns
            .iter()
            .copied()
            .filter(|&id| f.insn(id).bb.is_some())
            .collect();
        if live.is_empty() && block.parents.is_empty() && i != f.entry.0 as usize {
            continue;
        }
        out.push_str(&format!(".L{}:\n", i));
        for id in live {
            out.push_str(&format!("    {}\n", show_insn(f, id)));
        }
    }
    out
}
