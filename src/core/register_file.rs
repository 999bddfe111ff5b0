//! Scratch register tracking.
//!
//! The target machine has exactly two scratch registers. During emission the
//! [`RegisterFile`] remembers, per register, which logical slot's current
//! value it holds, so the emitter can skip redundant copies and can refuse to
//! read a register-allocated slot whose value is no longer there.

use crate::ir::Slot;
use std::fmt;

/// Number of scratch registers on the target.
pub const SCRATCH_REGISTERS: usize = 2;

/// Scratch register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScratchReg {
    R0,
    R1,
}

impl ScratchReg {
    pub const ALL: [ScratchReg; SCRATCH_REGISTERS] = [ScratchReg::R0, ScratchReg::R1];

    pub fn index(self) -> usize {
        match self {
            ScratchReg::R0 => 0,
            ScratchReg::R1 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScratchReg::R0 => "r0",
            ScratchReg::R1 => "r1",
        }
    }
}

impl fmt::Display for ScratchReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register-content cache for one emission unit.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    contents: [Option<Slot>; SCRATCH_REGISTERS],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot whose value `reg` currently holds.
    pub fn occupant(&self, reg: ScratchReg) -> Option<Slot> {
        self.contents[reg.index()]
    }

    pub fn holds(&self, reg: ScratchReg, slot: Slot) -> bool {
        self.occupant(reg) == Some(slot)
    }

    /// Find a register holding the current value of `slot`.
    pub fn find_register_for(&self, slot: Slot) -> Option<ScratchReg> {
        ScratchReg::ALL.into_iter().find(|reg| self.holds(*reg, slot))
    }

    /// `reg` was loaded from `slot`; other copies of `slot` stay valid.
    pub fn record_load(&mut self, reg: ScratchReg, slot: Slot) {
        self.contents[reg.index()] = Some(slot);
    }

    /// `slot` was assigned the value in `reg`; older copies of `slot` are stale.
    pub fn record_store(&mut self, reg: ScratchReg, slot: Slot) {
        self.invalidate_slot(slot);
        self.contents[reg.index()] = Some(slot);
    }

    /// `reg` was overwritten with a value no slot holds.
    pub fn invalidate(&mut self, reg: ScratchReg) {
        self.contents[reg.index()] = None;
    }

    pub fn invalidate_slot(&mut self, slot: Slot) {
        for entry in &mut self.contents {
            if *entry == Some(slot) {
                *entry = None;
            }
        }
    }

    /// Forget everything, e.g. after control passed through an opaque callee.
    pub fn reset(&mut self) {
        self.contents = [None; SCRATCH_REGISTERS];
    }
}
