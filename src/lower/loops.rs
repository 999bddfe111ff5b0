//! Loop bookkeeping for `break` and `continue`.

use crate::core::error::{CompileError, CompileResult};
use crate::ir::NodeId;
use crate::tree::SourceLoc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopEntry {
    pub label: Option<String>,
    /// Loop head; `continue` jumps here.
    pub start: NodeId,
    /// Node after the loop; `break` jumps here.
    pub next: NodeId,
}

/// Stack of loops enclosing the statement being lowered.
#[derive(Debug, Default)]
pub struct LoopStack {
    entries: Vec<LoopEntry>,
}

impl LoopStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        label: Option<&str>,
        start: NodeId,
        next: NodeId,
        loc: SourceLoc,
    ) -> CompileResult<()> {
        if let Some(label) = label {
            if self.entries.iter().any(|e| e.label.as_deref() == Some(label)) {
                return Err(CompileError::DuplicateLabel { label: label.to_string(), loc });
            }
        }
        self.entries.push(LoopEntry { label: label.map(str::to_string), start, next });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<LoopEntry> {
        self.entries.pop()
    }

    /// Innermost loop when `label` is `None`, otherwise the loop with that exact label.
    pub fn resolve(
        &self,
        label: Option<&str>,
        keyword: &'static str,
        loc: SourceLoc,
    ) -> CompileResult<&LoopEntry> {
        if self.entries.is_empty() {
            return Err(CompileError::LoopControlOutsideLoop { keyword, loc });
        }
        match label {
            None => self
                .entries
                .last()
                .ok_or(CompileError::LoopControlOutsideLoop { keyword, loc }),
            Some(label) => self
                .entries
                .iter()
                .rev()
                .find(|e| e.label.as_deref() == Some(label))
                .ok_or_else(|| CompileError::UnknownLabel { label: label.to_string(), loc }),
        }
    }
}
