// This module defines the control-flow graph IR produced by lowering and consumed by the
// allocator and the emitter. Nodes live in a Cfg arena and are addressed by NodeId handles,
// so loops and shared merge nodes are plain handle edges. Each node holds linear
// instructions (Assign or Execute) and exactly one end instruction that starts out as
// Unreachable and is set once when the node is closed. Values are referenced by logical
// slots (argument or local) that FunctionStorage types; physical placement happens later.

//! Control-flow graph IR.

pub mod print;

use crate::core::error::{CompileError, CompileResult};
use crate::tree::{BinaryOp, CaptureMode, FuncRef, Kind, SourceLoc, UnaryOp, Value};
use std::fmt;

/// Handle of a node in a [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    Argument,
    Local,
}

/// Logical storage slot assigned during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub origin: Origin,
    pub index: usize,
}

impl Slot {
    pub const fn arg(index: usize) -> Self {
        Self { origin: Origin::Argument, index }
    }

    pub const fn local(index: usize) -> Self {
        Self { origin: Origin::Local, index }
    }

    pub fn is_local(self) -> bool {
        self.origin == Origin::Local
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Origin::Argument => write!(f, "a{}", self.index),
            Origin::Local => write!(f, "l{}", self.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ref {
    Const(Value),
    Index(Slot),
}

impl Ref {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Ref::Index(slot) => Some(*slot),
            Ref::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Ref::Const(v) => Some(v),
            Ref::Index(_) => None,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Const(v) => write!(f, "{v}"),
            Ref::Index(slot) => write!(f, "{slot}"),
        }
    }
}

/// Command text with interleaved references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplatePart {
    Text(String),
    Ref(Ref),
}

impl Template {
    /// A template is dynamic when any part reads a slot.
    pub fn is_dynamic(&self) -> bool {
        self.slots().next().is_some()
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Ref(r) => r.slot(),
            TemplatePart::Text(_) => None,
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`")?;
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => f.write_str(text)?,
                TemplatePart::Ref(r) => write!(f, "{{{r}}}")?,
            }
        }
        f.write_str("`")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rvalue {
    Ref(Ref),
    Unary(UnaryOp, Ref),
    Binary(BinaryOp, Ref, Ref),
    Call { callee: FuncRef, args: Vec<Ref> },
    Capture { mode: CaptureMode, template: Template },
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Ref(r) => write!(f, "{r}"),
            Rvalue::Unary(op, r) => write!(f, "{} {r}", op.name()),
            Rvalue::Binary(op, lhs, rhs) => write!(f, "{} {lhs}, {rhs}", op.name()),
            Rvalue::Call { callee, args } => {
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Rvalue::Capture { mode, template } => {
                let mode = match mode {
                    CaptureMode::Result => "result",
                    CaptureMode::Success => "success",
                };
                write!(f, "capture {mode} {template}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    Assign { slot: Slot, rvalue: Rvalue },
    Execute(Template),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Assign { slot, rvalue } => write!(f, "{slot} = {rvalue}"),
            Instruction::Execute(template) => write!(f, "execute {template}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndInstruction {
    Jump(NodeId),
    /// `table[i]` is taken when the selector equals `i`, otherwise `default`.
    SwitchInt {
        selector: Ref,
        table: Vec<Option<NodeId>>,
        default: NodeId,
    },
    Return(Ref),
    Unreachable,
}

impl EndInstruction {
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            EndInstruction::Jump(target) => vec![*target],
            EndInstruction::SwitchInt { table, default, .. } => {
                let mut succs: Vec<NodeId> = table.iter().flatten().copied().collect();
                succs.push(*default);
                succs
            }
            EndInstruction::Return(_) | EndInstruction::Unreachable => Vec::new(),
        }
    }
}

impl fmt::Display for EndInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndInstruction::Jump(target) => write!(f, "jump {target}"),
            EndInstruction::SwitchInt { selector, table, default } => {
                write!(f, "switch {selector} [")?;
                for (i, entry) in table.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match entry {
                        Some(target) => write!(f, "{i} -> {target}")?,
                        None => write!(f, "{i} -> _")?,
                    }
                }
                write!(f, "] else {default}")
            }
            EndInstruction::Return(value) => write!(f, "return {value}"),
            EndInstruction::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Basic block: linear instructions plus one end instruction.
#[derive(Debug, Clone)]
pub struct Node {
    pub instructions: Vec<Instruction>,
    /// Source location of each instruction, parallel to `instructions`.
    pub spans: Vec<SourceLoc>,
    pub end: EndInstruction,
    pub end_span: SourceLoc,
}

impl Node {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            spans: Vec::new(),
            end: EndInstruction::Unreachable,
            end_span: SourceLoc::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.end, EndInstruction::Unreachable)
    }

    /// Open and without instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && !self.is_closed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    pub kind: Kind,
    /// User variable name; temporaries have none.
    pub name: Option<String>,
}

/// Kinds of every argument and local slot of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionStorage {
    pub args: Vec<Kind>,
    pub locals: Vec<LocalInfo>,
}

impl FunctionStorage {
    pub fn new(args: Vec<Kind>) -> Self {
        Self { args, locals: Vec::new() }
    }

    pub fn new_local(&mut self, kind: Kind, name: Option<&str>) -> Slot {
        self.locals.push(LocalInfo { kind, name: name.map(str::to_string) });
        Slot::local(self.locals.len() - 1)
    }

    pub fn kind(&self, slot: Slot) -> Option<Kind> {
        match slot.origin {
            Origin::Argument => self.args.get(slot.index).copied(),
            Origin::Local => self.locals.get(slot.index).map(|info| info.kind),
        }
    }

    /// User name of a slot, if it has one.
    pub fn name(&self, slot: Slot) -> Option<&str> {
        match slot.origin {
            Origin::Local => self.locals.get(slot.index)?.name.as_deref(),
            Origin::Argument => None,
        }
    }
}

/// Node arena.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    nodes: Vec<Node>,
}

impl Cfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_node(&mut self) -> NodeId {
        self.nodes.push(Node::new());
        NodeId((self.nodes.len() - 1) as u32)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).end.successors()
    }

    /// Append an instruction to an open node.
    pub fn push(&mut self, id: NodeId, inst: Instruction, span: SourceLoc) -> CompileResult<()> {
        let node = &mut self.nodes[id.index()];
        if node.is_closed() {
            return Err(CompileError::NodeAlreadyClosed { node: id });
        }
        node.instructions.push(inst);
        node.spans.push(span);
        Ok(())
    }

    /// Set the end instruction of an open node.
    pub fn close(&mut self, id: NodeId, end: EndInstruction, span: SourceLoc) -> CompileResult<()> {
        let node = &mut self.nodes[id.index()];
        if node.is_closed() {
            return Err(CompileError::NodeAlreadyClosed { node: id });
        }
        node.end = end;
        node.end_span = span;
        Ok(())
    }
}
