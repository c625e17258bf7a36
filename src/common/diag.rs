//! Diagnostic sink for warnings raised during simplification.
//!
//! Diagnostics are collected, not printed: the simplifier pushes entries at
//! instruction positions and the driver host decides when (and whether) to
//! render them. This keeps the core testable in isolation -- tests assert
//! on the collected list instead of capturing stderr.
//!
//! # Warning control
//! Most simplifier warnings are unconditional. Tautological self-comparison
//! reports are gated behind `-Wtautological-compare`, mirrored here by the
//! `tautological_compare` switch (off by default).

/// A source position carried on every instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub const fn new(line: u32, col: u32) -> Pos {
        Pos { line, col }
    }

    /// Position for synthetic instructions with no source counterpart.
    pub const fn none() -> Pos {
        Pos { line: 0, col: 0 }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Categories of simplifier warnings, named after their `-W` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Right shift by at least the operand's width. Always enabled.
    ShiftCountOverflow,
    /// Self-comparison with a statically known result.
    /// Flag: -Wtautological-compare (off by default).
    TautologicalCompare,
    /// A memory operand's address computation resolved to itself.
    InvalidAddress,
    /// A constant switch selector that matches no case range and no default.
    ImpossibleCase,
}

impl WarningKind {
    /// The flag name for this warning (without the -W prefix).
    pub fn flag_name(self) -> &'static str {
        match self {
            WarningKind::ShiftCountOverflow => "shift-count-overflow",
            WarningKind::TautologicalCompare => "tautological-compare",
            WarningKind::InvalidAddress => "invalid-address",
            WarningKind::ImpossibleCase => "impossible-case",
        }
    }
}

/// A single collected diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub pos: Pos,
    pub kind: WarningKind,
    pub message: String,
}

/// Collects warnings emitted by the simplifier.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Name of the translation unit, used when rendering.
    pub file: String,
    /// Enables tautological self-comparison warnings (-Wtautological-compare).
    pub tautological_compare: bool,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(file: impl Into<String>) -> Diagnostics {
        Diagnostics { file: file.into(), tautological_compare: false, entries: Vec::new() }
    }

    /// Record a warning at `pos`, unless its kind is gated off.
    pub fn warn(&mut self, pos: Pos, kind: WarningKind, message: impl Into<String>) {
        if kind == WarningKind::TautologicalCompare && !self.tautological_compare {
            return;
        }
        self.entries.push(Diagnostic { pos, kind, message: message.into() });
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Drain the collected warnings (tests and hosts that re-use the sink).
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    /// Render all collected warnings in `file:line:col: warning: ...` form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.entries {
            out.push_str(&format!(
                "{}:{}: warning: {} [-W{}]\n",
                self.file,
                d.pos,
                d.message,
                d.kind.flag_name()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tautological_gate() {
        let mut diag = Diagnostics::new("t.c");
        diag.warn(Pos::new(1, 1), WarningKind::TautologicalCompare, "self-comparison");
        assert!(diag.warnings().is_empty());

        diag.tautological_compare = true;
        diag.warn(Pos::new(1, 1), WarningKind::TautologicalCompare, "self-comparison");
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn test_render_format() {
        let mut diag = Diagnostics::new("t.c");
        diag.warn(Pos::new(3, 7), WarningKind::ShiftCountOverflow, "shift too wide");
        let out = diag.render();
        assert_eq!(out, "t.c:3:7: warning: shift too wide [-Wshift-count-overflow]\n");
    }
}
