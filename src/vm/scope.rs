//=====================================================
// File: vm/scope.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Structured control-flow scopes and call frames
//=====================================================

use crate::program::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Global,
    Function,
    Loop,
    Tick,
    If,
}

impl ScopeKind {
    pub(crate) fn is_loop(self) -> bool {
        matches!(self, ScopeKind::Loop | ScopeKind::Tick)
    }

    /// Scopes that `BREAK`, `CONTINUE` and `RETURN` may not unwind past.
    pub(crate) fn is_boundary(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::Function)
    }
}

/// An active body: `start..end` is executed, then control moves to `after`
/// (or back to `start` for loops).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope {
    pub(crate) kind: ScopeKind,
    pub(crate) start: u32,
    pub(crate) end: u32,
    pub(crate) after: u32,
    pub(crate) num_locals: u32,
}

impl Scope {
    pub(crate) fn new(kind: ScopeKind, start: u32, end: u32, after: u32) -> Self {
        Self {
            kind,
            start,
            end,
            after,
            num_locals: 0,
        }
    }
}

/// One entry of the call trace.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub(crate) function: u32,
    pub(crate) called_from: SourcePos,
}
