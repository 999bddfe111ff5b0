//! Expression lowering.
//!
//! [`Lowerer::lower_rvalue`] produces the rvalue of an assignment;
//! [`Lowerer::lower_operand`] produces a [`Ref`], materializing anything that
//! is not a constant or a variable into a fresh temporary first.

use super::Lowerer;
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{self, Instruction, Ref, Rvalue};
use crate::tree::{Expr, ExprNode, Kind, Template, TemplatePart};

impl Lowerer<'_> {
    pub(super) fn lower_rvalue(&mut self, expr: &Expr) -> CompileResult<Rvalue> {
        match &expr.node {
            ExprNode::Const(value) => {
                Self::expect_kind(expr.kind, value.kind(), expr.loc)?;
                Ok(Rvalue::Ref(Ref::Const(value.clone())))
            }
            ExprNode::Var(_) => Ok(Rvalue::Ref(self.lower_operand(expr)?)),
            ExprNode::Unary(op, operand) => {
                Self::expect_kind(Kind::Number, operand.kind, operand.loc)?;
                let operand = self.lower_operand(operand)?;
                Ok(Rvalue::Unary(*op, operand))
            }
            ExprNode::Binary(op, lhs, rhs) => {
                Self::expect_kind(Kind::Number, lhs.kind, lhs.loc)?;
                Self::expect_kind(Kind::Number, rhs.kind, rhs.loc)?;
                let lhs = self.lower_operand(lhs)?;
                let rhs = self.lower_operand(rhs)?;
                Ok(Rvalue::Binary(*op, lhs, rhs))
            }
            ExprNode::Call(callee, args) => {
                let module = self.module;
                let function = module
                    .get(*callee)
                    .ok_or(CompileError::UnknownFunction { func: *callee })?;
                let signature = &function.signature;
                if signature.args.len() != args.len() {
                    return Err(CompileError::ArityMismatch {
                        callee: function.name.clone(),
                        expected: signature.args.len(),
                        found: args.len(),
                        loc: expr.loc,
                    });
                }
                Self::expect_kind(signature.ret, expr.kind, expr.loc)?;
                let mut lowered = Vec::with_capacity(args.len());
                for (arg, kind) in args.iter().zip(&signature.args) {
                    Self::expect_kind(*kind, arg.kind, arg.loc)?;
                    // Constants are packed into the callee frame literally.
                    lowered.push(self.lower_operand(arg)?);
                }
                self.dependencies.insert(*callee);
                Ok(Rvalue::Call { callee: *callee, args: lowered })
            }
            ExprNode::Capture(mode, template) => {
                Self::expect_kind(Kind::Number, expr.kind, expr.loc)?;
                let template = self.lower_template(template)?;
                Ok(Rvalue::Capture { mode: *mode, template })
            }
        }
    }

    pub(super) fn lower_operand(&mut self, expr: &Expr) -> CompileResult<Ref> {
        match &expr.node {
            ExprNode::Const(value) => {
                Self::expect_kind(expr.kind, value.kind(), expr.loc)?;
                Ok(Ref::Const(value.clone()))
            }
            ExprNode::Var(name) => {
                let slot = self.resolve(name, expr.loc)?;
                let kind = self.storage.kind(slot).ok_or_else(|| CompileError::UnknownVariable {
                    name: name.clone(),
                    loc: expr.loc,
                })?;
                Self::expect_kind(kind, expr.kind, expr.loc)?;
                Ok(Ref::Index(slot))
            }
            _ => {
                let rvalue = self.lower_rvalue(expr)?;
                let temp = self.storage.new_local(expr.kind, None);
                self.push(Instruction::Assign { slot: temp, rvalue }, expr.loc)?;
                Ok(Ref::Index(temp))
            }
        }
    }

    pub(super) fn lower_template(&mut self, template: &Template) -> CompileResult<ir::Template> {
        let mut parts = Vec::with_capacity(template.parts.len());
        for part in &template.parts {
            parts.push(match part {
                TemplatePart::Text(text) => ir::TemplatePart::Text(text.clone()),
                TemplatePart::Expr(expr) => ir::TemplatePart::Ref(self.lower_operand(expr)?),
            });
        }
        Ok(ir::Template { parts })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Instruction, Ref, Rvalue, Slot, TemplatePart};
    use crate::lower::lower_function;
    use crate::tree::builder::*;
    use crate::tree::{BinaryOp, Kind, Module, Template, Value};

    #[test]
    fn test_nested_binary_materializes_operands_left_first() {
        let mut module = Module::new();
        let f = module.declare("f", &[("a", Kind::Number), ("b", Kind::Number)], Kind::Number);
        module.define(f, body(|b| {
            b.return_(Some(sub(
                mul(var("a", Kind::Number), num(2)),
                mul(var("b", Kind::Number), num(3)),
            )));
        }));

        let lowered = lower_function(&module, f).unwrap();
        let insts = &lowered.cfg.node(lowered.entry).instructions;
        let arg = |i| Ref::Index(Slot::arg(i));
        let local = |i| Ref::Index(Slot::local(i));
        let n = |v| Ref::Const(Value::Number(v));
        assert_eq!(
            insts,
            &vec![
                Instruction::Assign {
                    slot: Slot::local(0),
                    rvalue: Rvalue::Binary(BinaryOp::Mul, arg(0), n(2)),
                },
                Instruction::Assign {
                    slot: Slot::local(1),
                    rvalue: Rvalue::Binary(BinaryOp::Mul, arg(1), n(3)),
                },
                Instruction::Assign {
                    slot: Slot::local(2),
                    rvalue: Rvalue::Binary(BinaryOp::Sub, local(0), local(1)),
                },
            ]
        );
    }

    #[test]
    fn test_template_refs() {
        let mut module = Module::new();
        let f = module.declare("f", &[("who", Kind::String)], Kind::Empty);
        module.define(f, body(|b| {
            b.execute(
                Template::new()
                    .text("tellraw ")
                    .expr(var("who", Kind::String))
                    .text(" ")
                    .expr(string("hi")),
            );
        }));

        let lowered = lower_function(&module, f).unwrap();
        let Instruction::Execute(template) = &lowered.cfg.node(lowered.entry).instructions[0] else {
            panic!("expected execute");
        };
        assert_eq!(template.parts[1], TemplatePart::Ref(Ref::Index(Slot::arg(0))));
        assert_eq!(template.parts[3], TemplatePart::Ref(Ref::Const(Value::String("hi".into()))));
        assert!(template.is_dynamic());
    }
}
