// This module implements lowering of a typed statement tree into the control-flow graph IR.
// A Lowerer threads a current-node cursor through the statements of a function body: straight
// line statements append instructions to the cursor, if/else closes it with a SwitchInt and
// continues at a shared merge node, loops jump back to their head, and break/continue/return
// close the cursor and move it to a fresh node nothing jumps to. Every local variable gets its
// own storage slot, every callee is recorded as a dependency, and kind mismatches or malformed
// loop control are reported as hard CompileErrors since the tree is expected to be checked.

//! Statement lowering.
//!
//! ```text
//! let x = a + 1;          n0: l0 = add a0, 1
//! if x < 3 { x = 0; }         l1 = lt l0, 3
//! return x;                   switch l1 [0 -> n2] else n1
//!                         n1: l0 = 0
//!                             jump n2
//!                         n2: return l0
//! ```

mod expr;
pub mod loops;

use crate::core::analyzer::Analyzer;
use crate::core::error::{CompileError, CompileResult};
use crate::diagnostics::Diagnostic;
use crate::ir::{Cfg, EndInstruction, FunctionStorage, Instruction, NodeId, Ref, Slot};
use crate::tree::{FuncRef, Function, Kind, Module, SourceLoc, Stmt, StmtNode, Value};
use hashbrown::HashMap;
use loops::LoopStack;
use std::collections::BTreeSet;

/// Output of lowering one function.
#[derive(Debug, Clone)]
pub struct LoweredFunction {
    pub storage: FunctionStorage,
    pub cfg: Cfg,
    pub entry: NodeId,
    /// Distinct callees referenced by the body.
    pub dependencies: BTreeSet<FuncRef>,
    /// Flow diagnostics found while lowering.
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower the body of `func`.
pub fn lower_function(module: &Module, func: FuncRef) -> CompileResult<LoweredFunction> {
    let function = module.get(func).ok_or(CompileError::UnknownFunction { func })?;
    lower_body(module, function)
}

/// Lower a function that does not need to be registered in `module`.
pub fn lower_body(module: &Module, function: &Function) -> CompileResult<LoweredFunction> {
    if function.params.len() != function.signature.args.len() {
        return Err(CompileError::ArityMismatch {
            callee: function.name.clone(),
            expected: function.signature.args.len(),
            found: function.params.len(),
            loc: function.loc,
        });
    }

    let mut lowerer = Lowerer::new(module, function);
    lowerer.lower_block(&function.body)?;
    lowerer.finish(function)
}

pub(crate) struct Lowerer<'m> {
    module: &'m Module,
    ret: Kind,
    storage: FunctionStorage,
    cfg: Cfg,
    entry: NodeId,
    current: NodeId,
    scopes: Vec<HashMap<String, Slot>>,
    loops: LoopStack,
    dependencies: BTreeSet<FuncRef>,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Lowerer<'m> {
    fn new(module: &'m Module, function: &Function) -> Self {
        let mut cfg = Cfg::new();
        let entry = cfg.new_node();
        let params = function
            .params
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), Slot::arg(i)))
            .collect();
        Self {
            module,
            ret: function.signature.ret,
            storage: FunctionStorage::new(function.signature.args.clone()),
            cfg,
            entry,
            current: entry,
            scopes: vec![params],
            loops: LoopStack::new(),
            dependencies: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn finish(mut self, function: &Function) -> CompileResult<LoweredFunction> {
        if !self.cfg.node(self.current).is_closed() {
            let analyzer = Analyzer::new(&self.cfg, self.entry);
            if analyzer.contains(self.current) {
                let loc = function.body.last().map(|s| s.loc).unwrap_or(function.loc);
                if self.ret == Kind::Empty {
                    let end = EndInstruction::Return(Ref::Const(Value::Empty));
                    self.cfg.close(self.current, end, loc)?;
                } else {
                    self.diagnostics.push(Diagnostic::error(
                        format!("missing return on some path in `{}`", function.name),
                        loc,
                    ));
                }
            }
        }

        log::trace!(
            "lowered `{}`:\n{}",
            function.name,
            crate::ir::print::print(&self.storage, &self.cfg, self.entry)
        );
        Ok(LoweredFunction {
            storage: self.storage,
            cfg: self.cfg,
            entry: self.entry,
            dependencies: self.dependencies,
            diagnostics: self.diagnostics,
        })
    }

    fn push(&mut self, inst: Instruction, loc: SourceLoc) -> CompileResult<()> {
        self.cfg.push(self.current, inst, loc)
    }

    /// Close the cursor and continue in a fresh node nothing jumps to.
    fn terminate(&mut self, end: EndInstruction, loc: SourceLoc) -> CompileResult<()> {
        self.cfg.close(self.current, end, loc)?;
        self.current = self.cfg.new_node();
        Ok(())
    }

    fn resolve(&self, name: &str, loc: SourceLoc) -> CompileResult<Slot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| CompileError::UnknownVariable { name: name.to_string(), loc })
    }

    fn bind(&mut self, name: &str, slot: Slot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn expect_kind(expected: Kind, found: Kind, loc: SourceLoc) -> CompileResult<()> {
        if expected != found {
            return Err(CompileError::KindMismatch { expected, found, loc });
        }
        Ok(())
    }

    fn lower_scoped(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        self.scopes.push(HashMap::new());
        let result = self.lower_block(stmts);
        self.scopes.pop();
        result
    }

    fn lower_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        let mut diverged = false;
        for stmt in stmts {
            if diverged {
                self.diagnostics.push(Diagnostic::warning("unreachable statement", stmt.loc));
                diverged = false;
            }
            self.lower_stmt(stmt)?;
            if stmt.diverges() {
                diverged = true;
            }
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let loc = stmt.loc;
        match &stmt.node {
            StmtNode::Block(stmts) => self.lower_scoped(stmts),
            StmtNode::Let { name, kind, init } => {
                let slot = self.storage.new_local(*kind, Some(name));
                if let Some(init) = init {
                    Self::expect_kind(*kind, init.kind, init.loc)?;
                    let rvalue = self.lower_rvalue(init)?;
                    self.push(Instruction::Assign { slot, rvalue }, loc)?;
                }
                self.bind(name, slot);
                Ok(())
            }
            StmtNode::Assign { name, value } => {
                let slot = self.resolve(name, loc)?;
                let kind = self.storage.kind(slot).ok_or_else(|| CompileError::UnknownVariable {
                    name: name.clone(),
                    loc,
                })?;
                Self::expect_kind(kind, value.kind, value.loc)?;
                let rvalue = self.lower_rvalue(value)?;
                self.push(Instruction::Assign { slot, rvalue }, loc)
            }
            StmtNode::If { cond, then_body, else_body } => {
                Self::expect_kind(Kind::Number, cond.kind, cond.loc)?;
                let selector = self.storage.new_local(Kind::Number, None);
                let rvalue = self.lower_rvalue(cond)?;
                self.push(Instruction::Assign { slot: selector, rvalue }, loc)?;

                let then_node = self.cfg.new_node();
                let merge = self.cfg.new_node();
                let else_node = match else_body {
                    Some(_) => self.cfg.new_node(),
                    None => merge,
                };
                self.cfg.close(
                    self.current,
                    EndInstruction::SwitchInt {
                        selector: Ref::Index(selector),
                        table: vec![Some(else_node)],
                        default: then_node,
                    },
                    loc,
                )?;

                self.current = then_node;
                self.lower_scoped(then_body)?;
                self.cfg.close(self.current, EndInstruction::Jump(merge), loc)?;

                if let Some(else_body) = else_body {
                    self.current = else_node;
                    self.lower_scoped(else_body)?;
                    self.cfg.close(self.current, EndInstruction::Jump(merge), loc)?;
                }
                self.current = merge;
                Ok(())
            }
            StmtNode::Loop { label, body } => {
                let head = if self.cfg.node(self.current).is_empty() {
                    self.current
                } else {
                    let head = self.cfg.new_node();
                    self.cfg.close(self.current, EndInstruction::Jump(head), loc)?;
                    head
                };
                let next = self.cfg.new_node();
                self.loops.push(label.as_deref(), head, next, loc)?;

                self.current = head;
                let lowered = self.lower_scoped(body);
                self.loops.pop();
                lowered?;
                self.cfg.close(self.current, EndInstruction::Jump(head), loc)?;
                self.current = next;
                Ok(())
            }
            StmtNode::Break { label } => {
                let target = self.loops.resolve(label.as_deref(), "break", loc)?.next;
                self.terminate(EndInstruction::Jump(target), loc)
            }
            StmtNode::Continue { label } => {
                let target = self.loops.resolve(label.as_deref(), "continue", loc)?.start;
                self.terminate(EndInstruction::Jump(target), loc)
            }
            StmtNode::Return(value) => {
                let value = match value {
                    Some(expr) => {
                        Self::expect_kind(self.ret, expr.kind, expr.loc)?;
                        self.lower_operand(expr)?
                    }
                    None => {
                        Self::expect_kind(self.ret, Kind::Empty, loc)?;
                        Ref::Const(Value::Empty)
                    }
                };
                self.terminate(EndInstruction::Return(value), loc)
            }
            StmtNode::Execute(template) => {
                let template = self.lower_template(template)?;
                self.push(Instruction::Execute(template), loc)
            }
            StmtNode::Expr(expr) => {
                if expr.has_side_effects() {
                    let rvalue = self.lower_rvalue(expr)?;
                    let discard = self.storage.new_local(expr.kind, None);
                    self.push(Instruction::Assign { slot: discard, rvalue }, loc)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Rvalue, TemplatePart};
    use crate::tree::builder::*;
    use crate::tree::{BinaryOp, CaptureMode, Template};

    fn lower(module: &Module, func: FuncRef) -> LoweredFunction {
        let _ = env_logger::builder().is_test(true).try_init();
        lower_function(module, func).unwrap()
    }

    #[test]
    fn test_let_constant_materialized() {
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Number);
        module.define(f, body(|b| {
            b.let_("x", Kind::Number, Some(num(4)));
            b.return_(Some(var("x", Kind::Number)));
        }));

        let lowered = lower(&module, f);
        let entry = lowered.cfg.node(lowered.entry);
        assert_eq!(
            entry.instructions,
            vec![Instruction::Assign {
                slot: Slot::local(0),
                rvalue: Rvalue::Ref(Ref::Const(Value::Number(4))),
            }]
        );
        assert_eq!(entry.end, EndInstruction::Return(Ref::Index(Slot::local(0))));
        assert_eq!(lowered.storage.name(Slot::local(0)), Some("x"));
    }

    #[test]
    fn test_if_without_else_targets_merge() {
        let mut module = Module::new();
        let f = module.declare("f", &[("a", Kind::Number)], Kind::Empty);
        module.define(f, body(|b| {
            b.if_(var("a", Kind::Number), |b| {
                b.execute(Template::new().text("say yes"));
            });
            b.execute(Template::new().text("say done"));
        }));

        let lowered = lower(&module, f);
        let entry = lowered.cfg.node(lowered.entry);
        let EndInstruction::SwitchInt { selector, table, default } = &entry.end else {
            panic!("expected switch");
        };
        assert_eq!(*selector, Ref::Index(Slot::local(0)));
        let merge = table[0].unwrap();
        assert_eq!(lowered.cfg.node(*default).end, EndInstruction::Jump(merge));
        assert_eq!(lowered.cfg.node(merge).instructions.len(), 1);
        assert_eq!(
            lowered.cfg.node(merge).end,
            EndInstruction::Return(Ref::Const(Value::Empty))
        );
    }

    #[test]
    fn test_labeled_break_targets_outer_next() {
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Empty);
        module.define(f, body(|b| {
            b.loop_(Some("outer"), |b| {
                b.execute(Template::new().text("say tick"));
                b.loop_(None, |b| {
                    b.break_(Some("outer"));
                });
                b.execute(Template::new().text("say inner done"));
            });
            b.execute(Template::new().text("say outer done"));
        }));

        let lowered = lower(&module, f);
        // The outer head is the entry node; the inner loop gets its own head.
        let outer_head = lowered.entry;
        let EndInstruction::Jump(inner_head) = lowered.cfg.node(outer_head).end else {
            panic!("expected jump into inner loop");
        };
        let EndInstruction::Jump(target) = lowered.cfg.node(inner_head).end else {
            panic!("expected break jump");
        };
        assert_eq!(lowered.cfg.node(target).instructions.len(), 1);
        assert!(matches!(
            &lowered.cfg.node(target).instructions[0],
            Instruction::Execute(t) if t.parts == vec![TemplatePart::Text("say outer done".into())]
        ));
        // The inner loop's exit node is never reached.
        let analyzer = Analyzer::new(&lowered.cfg, lowered.entry);
        assert!(analyzer.contains(target));
        assert_eq!(analyzer.order(), &[outer_head, inner_head, target]);
        let inner_exit = lowered
            .cfg
            .ids()
            .find(|id| {
                let done = vec![TemplatePart::Text("say inner done".into())];
                matches!(
                    lowered.cfg.node(*id).instructions.first(),
                    Some(Instruction::Execute(t)) if t.parts == done
                )
            })
            .unwrap();
        assert!(!analyzer.contains(inner_exit));
    }

    #[test]
    fn test_loop_control_errors() {
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Empty);
        module.define(f, body(|b| {
            b.break_(None);
        }));
        assert!(matches!(
            lower_function(&module, f),
            Err(CompileError::LoopControlOutsideLoop { keyword: "break", .. })
        ));

        module.define(f, body(|b| {
            b.loop_(Some("a"), |b| {
                b.loop_(Some("a"), |b| {
                    b.break_(None);
                });
            });
        }));
        assert!(matches!(lower_function(&module, f), Err(CompileError::DuplicateLabel { .. })));

        module.define(f, body(|b| {
            b.loop_(None, |b| {
                b.continue_(Some("nowhere"));
            });
        }));
        assert!(matches!(lower_function(&module, f), Err(CompileError::UnknownLabel { .. })));
    }

    #[test]
    fn test_kind_mismatch_is_fatal() {
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Empty);
        module.define(f, body(|b| {
            b.let_("s", Kind::String, Some(num(1)));
        }));
        assert!(matches!(
            lower_function(&module, f),
            Err(CompileError::KindMismatch { expected: Kind::String, found: Kind::Number, .. })
        ));
    }

    #[test]
    fn test_missing_return_and_unreachable_warning() {
        let mut module = Module::new();
        let f = module.declare("f", &[("a", Kind::Number)], Kind::Number);
        module.define(f, body(|b| {
            b.if_(var("a", Kind::Number), |b| {
                b.return_(Some(num(1)));
                b.execute(Template::new().text("say never"));
            });
        }));

        let lowered = lower(&module, f);
        assert_eq!(lowered.diagnostics.len(), 2);
        assert_eq!(lowered.diagnostics[0].severity, crate::diagnostics::Severity::Warning);
        assert!(lowered.diagnostics[1].message.contains("missing return"));
        assert!(lowered.diagnostics[1].is_error());
    }

    #[test]
    fn test_infinite_loop_needs_no_return() {
        let mut module = Module::new();
        let f = module.declare("f", &[], Kind::Number);
        module.define(f, body(|b| {
            b.loop_(None, |b| {
                b.execute(Template::new().text("say spin"));
            });
        }));

        let lowered = lower(&module, f);
        assert!(lowered.diagnostics.is_empty());
    }

    #[test]
    fn test_calls_record_dependencies_and_discard() {
        let mut module = Module::new();
        let g = module.declare("g", &[("n", Kind::Number)], Kind::Number);
        let f = module.declare("f", &[], Kind::Empty);
        module.define(g, body(|b| {
            b.return_(Some(var("n", Kind::Number)));
        }));
        module.define(f, body(|b| {
            b.expr(call(g, Kind::Number, vec![num(2)]));
            b.expr(num(3));
            let killed = capture(CaptureMode::Success, Template::new().text("kill @e"));
            b.let_("ok", Kind::Number, Some(killed));
            let sum = binary(BinaryOp::Add, call(g, Kind::Number, vec![num(1)]), num(1));
            b.let_("d", Kind::Number, Some(sum));
        }));

        let lowered = lower(&module, f);
        assert_eq!(lowered.dependencies.iter().copied().collect::<Vec<_>>(), vec![g]);
        let insts = &lowered.cfg.node(lowered.entry).instructions;
        assert_eq!(insts.len(), 4);
        let two = vec![Ref::Const(Value::Number(2))];
        assert!(matches!(
            &insts[0],
            Instruction::Assign { rvalue: Rvalue::Call { args, .. }, .. } if args == &two
        ));
        assert!(matches!(
            &insts[1],
            Instruction::Assign { rvalue: Rvalue::Capture { mode: CaptureMode::Success, .. }, .. }
        ));
        assert!(matches!(
            &insts[3],
            Instruction::Assign { rvalue: Rvalue::Binary(BinaryOp::Add, Ref::Index(_), _), .. }
        ));
    }
}
