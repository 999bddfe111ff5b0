// This module implements the storage allocator that decides, for every logical local slot of a
// lowered function, where its value lives at run time: one of the two scratch registers, or a
// persistent field of the call frame. It is a single pass over the reachable nodes in analyzer
// order. Within a node it remembers which slots were assigned so far; a slot read as an operand
// right after being produced, in the same node, may stay in the register reserved for that
// operand position, and every other access pattern promotes the slot to a dense frame local.
// Call arguments, command template references and switch selectors always force frame
// placement, since register contents do not survive a frame copy or a macro substitution.

//! Storage allocation for logical slots.
//!
//! The allocator trades full liveness analysis for a one-node lookahead. The
//! emitter works one node at a time and never reorders instructions, so a
//! value consumed immediately after it is produced can skip the frame.

use super::analyzer::Analyzer;
use super::register_file::ScratchReg;
use crate::ir::{Cfg, EndInstruction, FunctionStorage, Instruction, Origin, Ref, Rvalue, Slot};
use std::fmt;

/// Index type for local slots within a function.
pub type ValLocalIdx = usize;

/// Physical placement of a logical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Never read.
    None,
    Register(ScratchReg),
    Argument(usize),
    /// Persistent frame local.
    Local(usize),
}

impl Location {
    pub fn is_frame(self) -> bool {
        matches!(self, Location::Argument(_) | Location::Local(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => f.write_str("none"),
            Location::Register(reg) => write!(f, "{reg}"),
            Location::Argument(i) => write!(f, "frame.a{i}"),
            Location::Local(i) => write!(f, "frame.l{i}"),
        }
    }
}

/// Operand position within an instruction.
///
/// Every operator of the language is at most binary, so two positions (one per
/// scratch register) cover every operand read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandPosition {
    First,
    Second,
}

impl OperandPosition {
    /// Register an operand in this position is evaluated into.
    pub fn register(self) -> ScratchReg {
        match self {
            OperandPosition::First => ScratchReg::R0,
            OperandPosition::Second => ScratchReg::R1,
        }
    }
}

/// Allocator output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageAllocation {
    locals: Vec<Location>,
    frame_size: usize,
}

impl StorageAllocation {
    pub fn location(&self, slot: Slot) -> Location {
        match slot.origin {
            Origin::Argument => Location::Argument(slot.index),
            Origin::Local => self.locals.get(slot.index).copied().unwrap_or(Location::None),
        }
    }

    /// Number of persistent frame locals.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn locals(&self) -> &[Location] {
        &self.locals
    }
}

/// Single-pass storage allocator.
pub struct StorageAllocator {
    locs: Vec<Location>,
    /// Destinations assigned so far in the current node, arguments included.
    assignments: Vec<Slot>,
    frame_size: usize,
}

impl StorageAllocator {
    /// Assign a location to every local slot of `storage`.
    pub fn allocate(
        storage: &FunctionStorage,
        cfg: &Cfg,
        analyzer: &Analyzer,
    ) -> StorageAllocation {
        let mut allocator = Self {
            locs: vec![Location::None; storage.locals.len()],
            assignments: Vec::new(),
            frame_size: 0,
        };

        for &node_id in analyzer.order() {
            allocator.assignments.clear();
            let node = cfg.node(node_id);
            for inst in &node.instructions {
                match inst {
                    Instruction::Assign { slot, rvalue } => {
                        allocator.inspect_rvalue(rvalue);
                        allocator.assignments.push(*slot);
                    }
                    Instruction::Execute(template) => {
                        for slot in template.slots() {
                            allocator.force(slot);
                        }
                    }
                }
            }
            match &node.end {
                EndInstruction::SwitchInt { selector, .. } => allocator.force_ref(selector),
                EndInstruction::Return(value) => allocator.inspect(value, OperandPosition::First),
                EndInstruction::Jump(_) | EndInstruction::Unreachable => {}
            }
        }

        log::trace!(
            "allocated {} locals, frame size {}",
            allocator.locs.len(),
            allocator.frame_size
        );
        StorageAllocation { locals: allocator.locs, frame_size: allocator.frame_size }
    }

    fn inspect_rvalue(&mut self, rvalue: &Rvalue) {
        match rvalue {
            Rvalue::Ref(r) | Rvalue::Unary(_, r) => self.inspect(r, OperandPosition::First),
            Rvalue::Binary(_, lhs, rhs) => {
                // The second operand is inspected first; it decides which operand
                // can keep its register when both were just produced.
                self.inspect(rhs, OperandPosition::Second);
                self.inspect(lhs, OperandPosition::First);
            }
            Rvalue::Call { args, .. } => {
                for arg in args {
                    self.force_ref(arg);
                }
            }
            Rvalue::Capture { template, .. } => {
                for slot in template.slots() {
                    self.force(slot);
                }
            }
        }
    }

    fn inspect(&mut self, r: &Ref, position: OperandPosition) {
        let Some(slot) = r.slot() else { return };
        if slot.origin != Origin::Local {
            return;
        }
        let idx = slot.index;
        if self.locs[idx] == Location::None && self.assignments.last() == Some(&slot) {
            self.locs[idx] = Location::Register(position.register());
        } else if !matches!(self.locs[idx], Location::Local(_)) {
            self.promote(idx);
        }
    }

    fn force_ref(&mut self, r: &Ref) {
        if let Some(slot) = r.slot() {
            self.force(slot);
        }
    }

    fn force(&mut self, slot: Slot) {
        if slot.origin == Origin::Local && !matches!(self.locs[slot.index], Location::Local(_)) {
            self.promote(slot.index);
        }
    }

    fn promote(&mut self, idx: ValLocalIdx) {
        self.locs[idx] = Location::Local(self.frame_size);
        self.frame_size += 1;
    }
}
