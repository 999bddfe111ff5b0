//! Constant folding over the statement tree.
//!
//! Operators whose operands are all number constants are replaced by a single
//! constant, recursively, so `2 + 3 * 4` lowers to `Const(14)` with no
//! assignments. Arithmetic follows the target's scoreboard semantics:
//! wrapping 32-bit math, floor division and floor modulo. Division or modulo
//! by zero is left unfolded for the machine to handle at run time.

use crate::tree::{
    BinaryOp, Expr, ExprNode, Function, Stmt, StmtNode, Template, TemplatePart, UnaryOp, Value,
};

/// Fold every expression of `function`, returning the folded copy.
pub fn fold_function(function: &Function) -> Function {
    let mut folded = function.clone();
    let mut counter = 0;
    for stmt in &mut folded.body {
        fold_stmt(stmt, &mut counter);
    }
    if counter > 0 {
        log::debug!("folded {} expressions in `{}`", counter, function.name);
    }
    folded
}

fn fold_stmt(stmt: &mut Stmt, counter: &mut usize) {
    match &mut stmt.node {
        StmtNode::Block(stmts) | StmtNode::Loop { body: stmts, .. } => {
            stmts.iter_mut().for_each(|s| fold_stmt(s, counter));
        }
        StmtNode::Let { init: Some(expr), .. }
        | StmtNode::Assign { value: expr, .. }
        | StmtNode::Return(Some(expr))
        | StmtNode::Expr(expr) => fold_expr(expr, counter),
        StmtNode::If { cond, then_body, else_body } => {
            fold_expr(cond, counter);
            then_body.iter_mut().for_each(|s| fold_stmt(s, counter));
            if let Some(else_body) = else_body {
                else_body.iter_mut().for_each(|s| fold_stmt(s, counter));
            }
        }
        StmtNode::Execute(template) => fold_template(template, counter),
        StmtNode::Let { init: None, .. }
        | StmtNode::Return(None)
        | StmtNode::Break { .. }
        | StmtNode::Continue { .. } => {}
    }
}

fn fold_template(template: &mut Template, counter: &mut usize) {
    for part in &mut template.parts {
        if let TemplatePart::Expr(expr) = part {
            fold_expr(expr, counter);
        }
    }
}

fn fold_expr(expr: &mut Expr, counter: &mut usize) {
    let folded = match &mut expr.node {
        ExprNode::Const(_) | ExprNode::Var(_) => None,
        ExprNode::Unary(op, operand) => {
            fold_expr(operand, counter);
            operand.as_const().and_then(Value::as_number).map(|v| eval_unary(*op, v))
        }
        ExprNode::Binary(op, lhs, rhs) => {
            fold_expr(lhs, counter);
            fold_expr(rhs, counter);
            match (
                lhs.as_const().and_then(Value::as_number),
                rhs.as_const().and_then(Value::as_number),
            ) {
                (Some(a), Some(b)) => eval_binary(*op, a, b),
                _ => None,
            }
        }
        ExprNode::Call(_, args) => {
            args.iter_mut().for_each(|a| fold_expr(a, counter));
            None
        }
        ExprNode::Capture(_, template) => {
            fold_template(template, counter);
            None
        }
    };
    if let Some(value) = folded {
        *counter += 1;
        expr.node = ExprNode::Const(Value::Number(value));
    }
}

pub fn eval_unary(op: UnaryOp, v: i32) -> i32 {
    match op {
        UnaryOp::Neg => v.wrapping_neg(),
        UnaryOp::Not => (v == 0) as i32,
    }
}

/// Evaluate a binary operator; `None` when the machine result is not a plain constant.
pub fn eval_binary(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => floor_div(a, b)?,
        BinaryOp::Rem => floor_mod(a, b)?,
        BinaryOp::Lt => (a < b) as i32,
        BinaryOp::Le => (a <= b) as i32,
        BinaryOp::Gt => (a > b) as i32,
        BinaryOp::Ge => (a >= b) as i32,
        BinaryOp::Eq => (a == b) as i32,
        BinaryOp::Ne => (a != b) as i32,
        BinaryOp::And => (a != 0 && b != 0) as i32,
        BinaryOp::Or => (a != 0 || b != 0) as i32,
    })
}

fn floor_div(a: i32, b: i32) -> Option<i32> {
    if b == 0 {
        return None;
    }
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        Some(q.wrapping_sub(1))
    } else {
        Some(q)
    }
}

fn floor_mod(a: i32, b: i32) -> Option<i32> {
    if b == 0 {
        return None;
    }
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r.wrapping_add(b))
    } else {
        Some(r)
    }
}
