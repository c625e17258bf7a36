//! SSA intermediate representation and local instruction simplifier for a
//! C static analyzer front-end.
//!
//! The crate owns two tightly coupled subsystems:
//!
//! - the IR data model: pseudo registers (SSA values) with use-def chains,
//!   tagged instruction records, basic blocks with explicit parent/child
//!   edges, and phi-nodes (`ir`);
//! - the simplification engine: a peephole + algebraic rewriter that runs
//!   as a repeat-until-stable fixed point over every function body
//!   (`passes`).
//!
//! The front-end, the linearizer that emits IR from the AST, mem2reg,
//! de-SSA, and code generation are external collaborators: they construct
//! `ir::Function` values and consume the pass API in `passes`.

pub mod common;
pub mod ir;
pub mod passes;
