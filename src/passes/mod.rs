//! The simplification pass and its fixed-point driver.
//!
//! Every rewrite reports what further work it may have exposed through a
//! `Repeat` bitset. The driver keeps sweeping a function in reverse
//! postorder until a sweep raises no `CSE` flag; the `SYMBOL_CLEANUP` and
//! `CFG_CLEANUP` bits are returned to the caller, which owns the passes
//! that consume them (mem2reg, CFG simplification).

pub mod eval;
pub mod simplify;

use std::ops::{BitOr, BitOrAssign};

use crate::common::diag::Diagnostics;
use crate::ir::cfg;
use crate::ir::Function;

/// Bitset of pending re-simplification phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Repeat(u32);

impl Repeat {
    /// Another instruction-simplification sweep may find more rewrites.
    pub const CSE: Repeat = Repeat(1 << 0);
    /// A symbol lost a use; mem2reg may promote more accesses.
    pub const SYMBOL_CLEANUP: Repeat = Repeat(1 << 1);
    /// A CFG edge vanished; unreachable blocks may need removal.
    pub const CFG_CLEANUP: Repeat = Repeat(1 << 2);

    pub const fn empty() -> Repeat {
        Repeat(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Repeat) -> bool {
        self.0 & other.0 == other.0
    }

    /// This set minus `other`.
    pub fn without(self, other: Repeat) -> Repeat {
        Repeat(self.0 & !other.0)
    }
}

impl BitOr for Repeat {
    type Output = Repeat;
    fn bitor(self, rhs: Repeat) -> Repeat {
        Repeat(self.0 | rhs.0)
    }
}

impl BitOrAssign for Repeat {
    fn bitor_assign(&mut self, rhs: Repeat) {
        self.0 |= rhs.0;
    }
}

/// Host-controlled pass configuration.
///
/// The CLI surface (`-foptim-disable`, `-vpostorder`, warning switches) is
/// parsed by the driver host; this struct is what reaches the core.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub enable_simplify: bool,
    /// Dump the function on stderr after the pass converges
    /// (`-fdump-ir=simplify`).
    pub dump_ir: bool,
    /// Re-check the structural invariants after every sweep.
    pub verify: bool,
    /// Emit the computed block order on stderr (`-vpostorder`).
    pub verbose_postorder: bool,
    /// Report each killed instruction on stderr (`-vdead`).
    pub verbose_dead: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig {
            enable_simplify: true,
            dump_ir: false,
            verify: false,
            verbose_postorder: false,
            verbose_dead: false,
        }
    }
}

impl PassConfig {
    /// Environment overrides, mainly for bisecting miscompiles:
    /// `CSA_DISABLE_PASSES=simplify` turns the pass off wholesale,
    /// `CSA_VERIFY_IR=1` re-checks invariants after every sweep, and
    /// `CSA_DUMP_IR=1` dumps each function once it converges.
    pub fn from_env() -> PassConfig {
        let disabled = std::env::var("CSA_DISABLE_PASSES").unwrap_or_default();
        PassConfig {
            enable_simplify: !disabled.contains("simplify") && !disabled.contains("all"),
            dump_ir: std::env::var("CSA_DUMP_IR").is_ok(),
            verify: std::env::var("CSA_VERIFY_IR").is_ok(),
            ..PassConfig::default()
        }
    }
}

/// Per-sweep state threaded through the simplifier.
pub struct SimplifyCtx<'a> {
    pub diag: &'a mut Diagnostics,
    /// Flags raised so far. A pending `CFG_CLEANUP` suppresses the
    /// self-referential-address warning: the offending memop may sit in a
    /// block that is about to be removed.
    pub pending: Repeat,
}

impl<'a> SimplifyCtx<'a> {
    pub fn new(diag: &'a mut Diagnostics) -> SimplifyCtx<'a> {
        SimplifyCtx { diag, pending: Repeat::empty() }
    }
}

/// Run the simplifier to a fixed point over one function.
///
/// Blocks are visited in reverse postorder, instructions top to bottom.
/// Rewrites may create new users of already-visited instructions; the
/// repeat flag, not a worklist, drives convergence. Returns the residual
/// `SYMBOL_CLEANUP`/`CFG_CLEANUP` bits for the host's cleanup passes.
pub fn run_simplify(f: &mut Function, config: &PassConfig, diag: &mut Diagnostics) -> Repeat {
    let mut residual = Repeat::empty();
    if !config.enable_simplify {
        return residual;
    }
    loop {
        let order = cfg::reverse_postorder(f);
        if config.verbose_postorder {
            let labels: Vec<String> = order.iter().map(|b| b.to_string()).collect();
            eprintln!("{}: postorder {}", f.name, labels.join(" "));
        }
        let mut round = Repeat::empty();
        let mut ctx = SimplifyCtx { diag: &mut *diag, pending: residual };
        for &bb in &order {
            // Snapshot: rewrites may insert or kill instructions mid-block.
            let insns = f.block(bb).insns.clone();
            for insn in insns {
                let r = simplify::simplify_instruction(f, insn, &mut ctx);
                if config.verbose_dead && !r.is_empty() && f.insn(insn).bb.is_none() {
                    eprintln!("{}: killed {}", f.name, insn);
                }
                ctx.pending |= r;
                round |= r;
            }
        }
        // Safe point: drop deleted instructions from the block lists.
        f.compact_insns();
        if config.verify {
            if let Err(e) = crate::ir::verify::verify_function(f) {
                panic!("{}: IR verification failed after simplify sweep: {}", f.name, e);
            }
        }
        residual |= round.without(Repeat::CSE);
        if !round.contains(Repeat::CSE) {
            break;
        }
    }
    if config.dump_ir {
        eprintln!("{}", crate::ir::print::show_function(f));
    }
    residual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_bitset() {
        let mut r = Repeat::empty();
        assert!(r.is_empty());
        r |= Repeat::CSE;
        r |= Repeat::CFG_CLEANUP;
        assert!(r.contains(Repeat::CSE));
        assert!(r.contains(Repeat::CFG_CLEANUP));
        assert!(!r.contains(Repeat::SYMBOL_CLEANUP));
        assert_eq!(r.without(Repeat::CSE), Repeat::CFG_CLEANUP);
    }
}
