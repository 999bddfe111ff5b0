// This module turns one allocated function into datapack units. FunctionCodegen walks the
// control-flow graph starting at the entry node: the function's own unit holds the prologue
// and the entry node, and every other node that is the target of a jump or a switch entry gets
// a unit of its own, named lazily and emitted from a worklist so a node shared by several
// predecessors (loop heads, if/else merges) is written exactly once. The default arm of a
// switch with a single predecessor is inlined after the guarded calls. Templates that read
// slots are moved into macro branch units invoked with the current frame. A register cache
// elides loads of values the scratch registers already hold and turns any read of a register
// whose content is unknown into a hard error. Lines are collected in the session arena and
// handed to the sink one unit at a time; each unit is closed before the next one starts.

//! Code emission for the datapack target.
//!
//! ```text
//! fn f(n) { return n + 1; }
//!
//! packc:__internal/fn_n_n_0:
//!   data modify storage packc:vm r0 set from storage packc:vm frames[-1].a0
//!   data modify storage packc:vm r1 set value 1
//!   execute store result score $r0 packc run data get storage packc:vm r0
//!   execute store result score $r1 packc run data get storage packc:vm r1
//!   scoreboard players operation $r0 packc += $r1 packc
//!   execute store result storage packc:vm r0 int 1 run scoreboard players get $r0 packc
//!   data remove storage packc:vm frames[-1]
//! ```

use super::calling_convention::{self, FrameLayout};
use super::encoder::{CommandEncoder, SELECTOR_PLAYER};
use super::TargetConfig;
use crate::core::analyzer::Analyzer;
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::{RegisterFile, ScratchReg};
use crate::core::session::CompilationSession;
use crate::core::value_assignment::{Location, StorageAllocation};
use crate::ir::{
    Cfg, EndInstruction, Instruction, NodeId, Ref, Rvalue, Slot, Template, TemplatePart,
};
use crate::lower::LoweredFunction;
use crate::sink::Sink;
use crate::tree::{CaptureMode, FuncRef, Kind, Signature, Value};
use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashMap;
use std::collections::VecDeque;

type Lines<'arena> = BumpVec<'arena, &'arena str>;

/// Emits the units of one function.
pub struct FunctionCodegen<'a, 'arena> {
    encoder: CommandEncoder,
    session: &'a CompilationSession<'arena>,
    sink: &'a dyn Sink,
    cfg: &'a Cfg,
    entry: NodeId,
    analyzer: &'a Analyzer,
    allocation: &'a StorageAllocation,
    layout: FrameLayout,
    /// Unit names of every callee the function may call.
    callees: &'a HashMap<FuncRef, String>,
    root: &'arena str,
    node_units: HashMap<NodeId, &'arena str>,
    worklist: VecDeque<(NodeId, &'arena str)>,
    cache: RegisterFile,
    next_branch: usize,
    next_macro: usize,
    lines_written: usize,
}

impl<'a, 'arena> FunctionCodegen<'a, 'arena> {
    pub fn new(
        config: &TargetConfig,
        session: &'a CompilationSession<'arena>,
        sink: &'a dyn Sink,
        lowered: &'a LoweredFunction,
        analyzer: &'a Analyzer,
        allocation: &'a StorageAllocation,
        callees: &'a HashMap<FuncRef, String>,
    ) -> Self {
        Self {
            encoder: CommandEncoder::new(config),
            session,
            sink,
            cfg: &lowered.cfg,
            entry: lowered.entry,
            analyzer,
            allocation,
            layout: FrameLayout::new(lowered.storage.args.len(), allocation.frame_size()),
            callees,
            root: "",
            node_units: HashMap::new(),
            worklist: VecDeque::new(),
            cache: RegisterFile::new(),
            next_branch: 0,
            next_macro: 0,
            lines_written: 0,
        }
    }

    /// Emit the function as unit `unit` plus its branch units. Returns the number of lines written.
    pub fn emit(mut self, unit: &str) -> CompileResult<usize> {
        self.root = self.session.intern_str(unit);

        let mut lines = BumpVec::new_in(self.session.arena());
        self.begin_unit();
        if self.layout.pushes_own_frame() {
            self.push_line(&mut lines, self.encoder.push_empty_frame());
            self.session.record_frame_push();
        }
        if self.analyzer.predecessor_count(self.entry) > 0 {
            // Something jumps back to the entry; the prologue must not run again.
            let target = self.unit_for(self.entry);
            self.push_line(&mut lines, self.encoder.call(target));
        } else {
            self.emit_node(self.entry, &mut lines)?;
        }
        self.write_unit(self.root, &lines)?;

        while let Some((node, name)) = self.worklist.pop_front() {
            let mut lines = BumpVec::new_in(self.session.arena());
            self.begin_unit();
            self.emit_node(node, &mut lines)?;
            self.write_unit(name, &lines)?;
        }

        self.session.record_function_compiled(self.root, self.lines_written);
        log::debug!(
            "emitted {} ({} node units, {} macro units, {} lines)",
            self.root,
            self.next_branch,
            self.next_macro,
            self.lines_written
        );
        Ok(self.lines_written)
    }

    fn begin_unit(&mut self) {
        self.cache.reset();
        self.session.record_unit();
    }

    fn push_line(&self, lines: &mut Lines<'arena>, line: String) {
        lines.push(self.session.alloc_str(&line));
    }

    fn write_unit(&mut self, name: &str, lines: &[&str]) -> CompileResult<()> {
        let mut writer = self.sink.create(name)?;
        for line in lines {
            writer.write(line)?;
        }
        writer.close()?;
        self.session.record_lines(lines.len());
        self.lines_written += lines.len();
        log::trace!("wrote {} ({} lines)", name, lines.len());
        Ok(())
    }

    /// Unit of `node`, queueing it for emission on first use.
    fn unit_for(&mut self, node: NodeId) -> &'arena str {
        if let Some(&name) = self.node_units.get(&node) {
            return name;
        }
        let name = self.session.intern_str(&format!("{}/b{}", self.root, self.next_branch));
        self.next_branch += 1;
        self.node_units.insert(node, name);
        self.worklist.push_back((node, name));
        name
    }

    /// Write a single-line macro unit and return its name.
    fn emit_macro(&mut self, line: String) -> CompileResult<&'arena str> {
        let name = self.session.intern_str(&format!("{}/m{}", self.root, self.next_macro));
        self.next_macro += 1;
        let mut lines = BumpVec::new_in(self.session.arena());
        self.push_line(&mut lines, line);
        self.session.record_branch_unit();
        self.write_unit(name, &lines)?;
        Ok(name)
    }

    fn emit_node(&mut self, node_id: NodeId, lines: &mut Lines<'arena>) -> CompileResult<()> {
        let cfg = self.cfg;
        let node = cfg.node(node_id);
        for inst in &node.instructions {
            self.emit_instruction(inst, lines)?;
        }

        match &node.end {
            EndInstruction::Jump(target) => {
                let unit = self.unit_for(*target);
                self.push_line(lines, self.encoder.call(unit));
            }
            EndInstruction::SwitchInt { selector, table, default } => {
                self.load_selector(selector, lines)?;
                for (value, entry) in table.iter().enumerate() {
                    if let Some(target) = entry {
                        let unit = self.unit_for(*target);
                        self.push_line(lines, self.encoder.guarded_call(value, unit));
                    }
                }
                if self.inlines_default(*default) {
                    self.emit_node(*default, lines)?;
                } else {
                    let unit = self.unit_for(*default);
                    self.push_line(lines, self.encoder.call(unit));
                }
            }
            EndInstruction::Return(value) => {
                if *value != Ref::Const(Value::Empty) {
                    self.load(value, ScratchReg::R0, lines)?;
                }
                if self.layout.needs_frame() {
                    self.push_line(lines, self.encoder.pop_frame());
                    self.session.record_frame_pop();
                }
            }
            EndInstruction::Unreachable => {
                return Err(CompileError::UnreachableEmitted { node: node_id })
            }
        }
        Ok(())
    }

    fn inlines_default(&self, node: NodeId) -> bool {
        node != self.entry
            && self.analyzer.predecessor_count(node) == 1
            && !self.node_units.contains_key(&node)
    }

    fn load_selector(&mut self, selector: &Ref, lines: &mut Lines<'arena>) -> CompileResult<()> {
        let line = match selector {
            Ref::Const(value) => {
                self.encoder.set_score(SELECTOR_PLAYER, value.as_number().unwrap_or(0))
            }
            Ref::Index(slot) => {
                let path = self.frame_path(*slot)?;
                self.encoder.load_score(SELECTOR_PLAYER, &path)
            }
        };
        self.push_line(lines, line);
        Ok(())
    }

    fn emit_instruction(
        &mut self,
        inst: &Instruction,
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        match inst {
            Instruction::Assign { slot, rvalue } => self.emit_assign(*slot, rvalue, lines),
            Instruction::Execute(template) => {
                let text = self.render_template(template)?;
                let line = if template.is_dynamic() {
                    let unit = self.emit_macro(format!("${text}"))?;
                    self.encoder.call_with_frame(unit)
                } else {
                    text
                };
                self.push_line(lines, line);
                Ok(())
            }
        }
    }

    fn emit_assign(
        &mut self,
        slot: Slot,
        rvalue: &Rvalue,
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        let dest = self.allocation.location(slot);
        match rvalue {
            Rvalue::Ref(Ref::Const(value)) if dest.is_frame() => {
                let path = self.frame_path(slot)?;
                self.push_line(lines, self.encoder.set_value(&path, &value.to_snbt()));
                self.cache.invalidate_slot(slot);
                return Ok(());
            }
            Rvalue::Ref(value) => self.load(value, ScratchReg::R0, lines)?,
            Rvalue::Unary(op, operand) => {
                self.load(operand, ScratchReg::R0, lines)?;
                for line in self.encoder.unary(*op) {
                    self.push_line(lines, line);
                }
                self.cache.invalidate(ScratchReg::R0);
            }
            Rvalue::Binary(op, lhs, rhs) => {
                self.load(lhs, ScratchReg::R0, lines)?;
                self.load(rhs, ScratchReg::R1, lines)?;
                for line in self.encoder.binary(*op) {
                    self.push_line(lines, line);
                }
                self.cache.invalidate(ScratchReg::R0);
            }
            Rvalue::Call { callee, args } => self.emit_call(*callee, args, lines)?,
            Rvalue::Capture { mode, template } => self.emit_capture(*mode, template, lines)?,
        }
        self.store_result(slot, dest, lines)
    }

    /// Move the value in `r0` to the location of `slot`.
    fn store_result(
        &mut self,
        slot: Slot,
        dest: Location,
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        match dest {
            Location::None => {
                self.cache.invalidate(ScratchReg::R0);
                self.cache.invalidate_slot(slot);
            }
            Location::Register(ScratchReg::R0) => self.cache.record_store(ScratchReg::R0, slot),
            Location::Register(ScratchReg::R1) => {
                let r0 = self.encoder.register(ScratchReg::R0);
                let line = self.encoder.set_from(&self.encoder.register(ScratchReg::R1), &r0);
                self.push_line(lines, line);
                self.cache.record_store(ScratchReg::R1, slot);
                self.cache.record_load(ScratchReg::R0, slot);
            }
            Location::Argument(_) | Location::Local(_) => {
                let path = self.frame_path(slot)?;
                let line = self.encoder.set_from(&path, &self.encoder.register(ScratchReg::R0));
                self.push_line(lines, line);
                self.cache.record_store(ScratchReg::R0, slot);
            }
        }
        Ok(())
    }

    /// Load `value` into `reg`, skipping the copy when the cache shows it is already there.
    fn load(
        &mut self,
        value: &Ref,
        reg: ScratchReg,
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        let dst = self.encoder.register(reg);
        match value {
            Ref::Const(value) => {
                self.push_line(lines, self.encoder.set_value(&dst, &value.to_snbt()));
                self.cache.invalidate(reg);
            }
            Ref::Index(slot) => {
                let slot = *slot;
                if self.cache.holds(reg, slot) {
                    self.session.record_copy_elided();
                    return Ok(());
                }
                let src = match self.allocation.location(slot) {
                    Location::None => return Err(CompileError::UnplacedSlot { slot }),
                    Location::Register(_) => match self.cache.find_register_for(slot) {
                        Some(held) => self.encoder.register(held),
                        None => return Err(CompileError::RegisterLifetime { slot }),
                    },
                    Location::Argument(_) | Location::Local(_) => self.frame_path(slot)?,
                };
                self.push_line(lines, self.encoder.set_from(&dst, &src));
                self.cache.record_load(reg, slot);
            }
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        callee: FuncRef,
        args: &[Ref],
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        let callees = self.callees;
        let name = callees.get(&callee).ok_or(CompileError::UnresolvedCallee { callee })?;

        if FrameLayout::caller_pushes(args.len()) {
            self.push_line(lines, self.encoder.reset_next());
            for (i, arg) in args.iter().enumerate() {
                let dst = self.encoder.next_field(&calling_convention::argument_field(i));
                let line = match arg {
                    Ref::Const(value) => self.encoder.set_value(&dst, &value.to_snbt()),
                    Ref::Index(slot) => self.encoder.set_from(&dst, &self.frame_path(*slot)?),
                };
                self.push_line(lines, line);
            }
            self.push_line(lines, self.encoder.push_next());
            self.session.record_frame_push();
        }
        self.push_line(lines, self.encoder.call(name));
        self.session.record_call_site(name);
        // The callee leaves its result in r0 and clobbers everything else.
        self.cache.reset();
        Ok(())
    }

    fn emit_capture(
        &mut self,
        mode: CaptureMode,
        template: &Template,
        lines: &mut Lines<'arena>,
    ) -> CompileResult<()> {
        let text = self.render_template(template)?;
        let command = if template.is_dynamic() {
            let unit = self.emit_macro(format!("$return run {text}"))?;
            self.encoder.call_with_frame(unit)
        } else {
            text
        };
        let line = self.encoder.capture(mode, &self.encoder.register(ScratchReg::R0), &command);
        self.push_line(lines, line);
        self.cache.reset();
        Ok(())
    }

    /// Template text with constants spliced in and slots as macro placeholders.
    fn render_template(&self, template: &Template) -> CompileResult<String> {
        let mut text = String::new();
        for part in &template.parts {
            match part {
                TemplatePart::Text(literal) => text.push_str(literal),
                TemplatePart::Ref(Ref::Const(value)) => text.push_str(&value.to_text()),
                TemplatePart::Ref(Ref::Index(slot)) => {
                    let location = self.allocation.location(*slot);
                    let field = calling_convention::frame_field(*slot, location)?;
                    text.push_str(&calling_convention::placeholder(&field));
                }
            }
        }
        Ok(text)
    }

    fn frame_path(&self, slot: Slot) -> CompileResult<String> {
        let field = calling_convention::frame_field(slot, self.allocation.location(slot))?;
        Ok(self.encoder.frame_field(&field))
    }
}

/// Emit the unit callers outside the pack use to invoke `internal`.
pub fn emit_export_wrapper(
    config: &TargetConfig,
    sink: &dyn Sink,
    name: &str,
    internal: &str,
    signature: &Signature,
    params: &[String],
) -> CompileResult<String> {
    let encoder = CommandEncoder::new(config);
    let r0 = encoder.register(ScratchReg::R0);
    let mut lines = Vec::new();
    if !params.is_empty() {
        let literal = calling_convention::export_frame_literal(params, &signature.args);
        lines.push(format!("${}", encoder.set_value(&encoder.storage_path("next"), &literal)));
        lines.push(encoder.push_next());
    }
    lines.push(encoder.call(internal));
    match signature.ret {
        Kind::Number => lines.push(encoder.return_data(&r0)),
        Kind::Empty => {}
        Kind::String | Kind::Compound | Kind::List => {
            lines.push(encoder.set_from(&encoder.out_field(name), &r0))
        }
    }

    let unit = config.export_unit(name);
    let mut writer = sink.create(&unit)?;
    for line in &lines {
        writer.write(line)?;
    }
    writer.close()?;
    log::debug!("exported {} -> {}", unit, internal);
    Ok(unit)
}

/// Emit the unit that prepares the objective and the frame stack.
pub fn emit_runtime_init(config: &TargetConfig, sink: &dyn Sink) -> CompileResult<String> {
    let encoder = CommandEncoder::new(config);
    let unit = config.init_unit();
    let mut writer = sink.create(&unit)?;
    writer.write(&encoder.create_objective())?;
    writer.write(&encoder.reset_frames())?;
    writer.close()?;
    Ok(unit)
}
