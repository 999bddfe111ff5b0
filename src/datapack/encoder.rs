// This module renders the individual commands the emitter writes. CommandEncoder knows the
// storage root and the scoreboard objective and turns register moves, frame pushes and pops,
// unit calls, conditional dispatch and arithmetic into command lines. Data is addressed by
// paths of the form `storage <ns>:<storage> <nbt path>`; the two scratch registers are the
// fields `r0` and `r1` of that storage. Arithmetic and comparisons run on the fake players
// `$r0`, `$r1` and `$sel` of the objective, with results stored back into `r0` as ints.

//! Command rendering.
//!
//! The encoder is stateless apart from the names it was configured with; every
//! method returns the text of one command.

use super::TargetConfig;
use crate::core::register_file::ScratchReg;
use crate::tree::{BinaryOp, CaptureMode, UnaryOp};

/// Fake player holding the dispatch value of a switch.
pub const SELECTOR_PLAYER: &str = "$sel";

/// Renders commands against one storage root and objective.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    storage: String,
    objective: String,
}

impl CommandEncoder {
    pub fn new(config: &TargetConfig) -> Self {
        Self { storage: config.storage_id(), objective: config.objective().to_string() }
    }

    /// Data path of a storage field.
    pub fn storage_path(&self, path: &str) -> String {
        format!("storage {} {}", self.storage, path)
    }

    pub fn register(&self, reg: ScratchReg) -> String {
        self.storage_path(reg.name())
    }

    /// Field of the current call frame.
    pub fn frame_field(&self, field: &str) -> String {
        self.storage_path(&format!("frames[-1].{field}"))
    }

    /// Field of the frame being built for the next call.
    pub fn next_field(&self, field: &str) -> String {
        self.storage_path(&format!("next.{field}"))
    }

    /// Field of the export result compound.
    pub fn out_field(&self, name: &str) -> String {
        self.storage_path(&format!("out.{}", nbt_key(name)))
    }

    pub fn set_value(&self, dst: &str, snbt: &str) -> String {
        format!("data modify {dst} set value {snbt}")
    }

    pub fn set_from(&self, dst: &str, src: &str) -> String {
        format!("data modify {dst} set from {src}")
    }

    /// Copy a data value into a score.
    pub fn load_score(&self, player: &str, src: &str) -> String {
        format!("execute store result score {player} {} run data get {src}", self.objective)
    }

    pub fn set_score(&self, player: &str, value: i32) -> String {
        format!("scoreboard players set {player} {} {value}", self.objective)
    }

    /// Copy a score back into an int data value.
    pub fn store_score(&self, dst: &str, player: &str) -> String {
        format!(
            "execute store result {dst} int 1 run scoreboard players get {player} {}",
            self.objective
        )
    }

    pub fn call(&self, unit: &str) -> String {
        format!("function {unit}")
    }

    /// Macro call substituting the fields of the current frame.
    pub fn call_with_frame(&self, unit: &str) -> String {
        format!("function {unit} with {}", self.storage_path("frames[-1]"))
    }

    /// Tail call taken when the selector score equals `value`.
    pub fn guarded_call(&self, value: usize, unit: &str) -> String {
        format!(
            "execute if score {SELECTOR_PLAYER} {} matches {value} run return run function {unit}",
            self.objective
        )
    }

    pub fn reset_next(&self) -> String {
        self.set_value(&self.storage_path("next"), "{}")
    }

    pub fn push_next(&self) -> String {
        format!(
            "data modify {} append from {}",
            self.storage_path("frames"),
            self.storage_path("next")
        )
    }

    pub fn push_empty_frame(&self) -> String {
        format!("data modify {} append value {{}}", self.storage_path("frames"))
    }

    pub fn pop_frame(&self) -> String {
        format!("data remove {}", self.storage_path("frames[-1]"))
    }

    /// Store a command's result or success flag into `dst`.
    pub fn capture(&self, mode: CaptureMode, dst: &str, command: &str) -> String {
        let what = match mode {
            CaptureMode::Result => "result",
            CaptureMode::Success => "success",
        };
        format!("execute store {what} {dst} int 1 run {command}")
    }

    pub fn return_data(&self, src: &str) -> String {
        format!("return run data get {src}")
    }

    pub fn create_objective(&self) -> String {
        format!("scoreboard objectives add {} dummy", self.objective)
    }

    pub fn reset_frames(&self) -> String {
        self.set_value(&self.storage_path("frames"), "[]")
    }

    /// Commands computing `op r0` into `r0`.
    pub fn unary(&self, op: UnaryOp) -> Vec<String> {
        let r0 = self.register(ScratchReg::R0);
        match op {
            UnaryOp::Neg => vec![format!("execute store result {r0} int -1 run data get {r0}")],
            UnaryOp::Not => vec![
                self.load_score("$r0", &r0),
                format!(
                    "execute store result {r0} int 1 if score $r0 {} matches 0",
                    self.objective
                ),
            ],
        }
    }

    /// Commands computing `r0 op r1` into `r0`.
    pub fn binary(&self, op: BinaryOp) -> Vec<String> {
        let obj = &self.objective;
        let r0 = self.register(ScratchReg::R0);
        let r1 = self.register(ScratchReg::R1);
        let mut lines = vec![self.load_score("$r0", &r0), self.load_score("$r1", &r1)];
        let condition = match op {
            BinaryOp::Add => return self.arithmetic(lines, "+="),
            BinaryOp::Sub => return self.arithmetic(lines, "-="),
            BinaryOp::Mul => return self.arithmetic(lines, "*="),
            BinaryOp::Div => return self.arithmetic(lines, "/="),
            BinaryOp::Rem => return self.arithmetic(lines, "%="),
            BinaryOp::Lt => format!("if score $r0 {obj} < $r1 {obj}"),
            BinaryOp::Le => format!("if score $r0 {obj} <= $r1 {obj}"),
            BinaryOp::Gt => format!("if score $r0 {obj} > $r1 {obj}"),
            BinaryOp::Ge => format!("if score $r0 {obj} >= $r1 {obj}"),
            BinaryOp::Eq => format!("if score $r0 {obj} = $r1 {obj}"),
            BinaryOp::Ne => format!("unless score $r0 {obj} = $r1 {obj}"),
            BinaryOp::And => {
                format!("unless score $r0 {obj} matches 0 unless score $r1 {obj} matches 0")
            }
            BinaryOp::Or => {
                lines.push(format!(
                    "execute unless score $r1 {obj} matches 0 run scoreboard players set $r0 {obj} 1"
                ));
                format!("unless score $r0 {obj} matches 0")
            }
        };
        lines.push(format!("execute store result {r0} int 1 {condition}"));
        lines
    }

    fn arithmetic(&self, mut lines: Vec<String>, operation: &str) -> Vec<String> {
        let obj = &self.objective;
        lines.push(format!("scoreboard players operation $r0 {obj} {operation} $r1 {obj}"));
        lines.push(self.store_score(&self.register(ScratchReg::R0), "$r0"));
        lines
    }
}

/// Quote `name` as an NBT compound key unless it is a plain identifier.
fn nbt_key(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        crate::tree::quote(name)
    }
}
