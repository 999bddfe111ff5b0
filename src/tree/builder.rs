//! Explicit-context builders for statement trees.
//!
//! Every builder call receives the block it appends to; nested bodies are built
//! through closures handed a child [`BlockBuilder`]. Statements are stamped with
//! consecutive line numbers so diagnostics produced later point somewhere useful.

use super::{
    BinaryOp, CaptureMode, Expr, ExprNode, FuncRef, Kind, SourceLoc, Stmt, StmtNode, Template,
    TemplatePart, UnaryOp, Value,
};

/// Build a function body starting at line 1.
pub fn body(build: impl FnOnce(&mut BlockBuilder)) -> Vec<Stmt> {
    let mut block = BlockBuilder::new(1);
    build(&mut block);
    block.finish()
}

pub struct BlockBuilder {
    stmts: Vec<Stmt>,
    line: u32,
}

impl BlockBuilder {
    pub fn new(first_line: u32) -> Self {
        Self { stmts: Vec::new(), line: first_line }
    }

    fn next_loc(&mut self) -> SourceLoc {
        let loc = SourceLoc::new(self.line, 1);
        self.line += 1;
        loc
    }

    fn nested(&mut self, build: impl FnOnce(&mut BlockBuilder)) -> Vec<Stmt> {
        let mut child = BlockBuilder::new(self.line);
        build(&mut child);
        self.line = child.line;
        child.stmts
    }

    fn push(&mut self, loc: SourceLoc, mut node: StmtNode) -> &mut Self {
        stamp_stmt(&mut node, loc);
        self.stmts.push(Stmt::new(node, loc));
        self
    }

    pub fn let_(&mut self, name: &str, kind: Kind, init: Option<Expr>) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Let { name: name.to_string(), kind, init })
    }

    pub fn assign(&mut self, name: &str, value: Expr) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Assign { name: name.to_string(), value })
    }

    pub fn if_(&mut self, cond: Expr, then: impl FnOnce(&mut BlockBuilder)) -> &mut Self {
        let loc = self.next_loc();
        let then_body = self.nested(then);
        self.push(loc, StmtNode::If { cond, then_body, else_body: None })
    }

    pub fn if_else(
        &mut self,
        cond: Expr,
        then: impl FnOnce(&mut BlockBuilder),
        otherwise: impl FnOnce(&mut BlockBuilder),
    ) -> &mut Self {
        let loc = self.next_loc();
        let then_body = self.nested(then);
        let else_body = self.nested(otherwise);
        self.push(loc, StmtNode::If { cond, then_body, else_body: Some(else_body) })
    }

    pub fn loop_(
        &mut self,
        label: Option<&str>,
        body: impl FnOnce(&mut BlockBuilder),
    ) -> &mut Self {
        let loc = self.next_loc();
        let body = self.nested(body);
        self.push(loc, StmtNode::Loop { label: label.map(str::to_string), body })
    }

    /// `while cond { body }` as `loop { if !cond { break; } body }`.
    pub fn while_(
        &mut self,
        label: Option<&str>,
        cond: Expr,
        body: impl FnOnce(&mut BlockBuilder),
    ) -> &mut Self {
        let loc = self.next_loc();
        let exit_loc = SourceLoc::new(loc.line, loc.column + 1);
        let mut stmts = vec![Stmt::new(
            StmtNode::If {
                cond: not(cond),
                then_body: vec![Stmt::new(StmtNode::Break { label: None }, exit_loc)],
                else_body: None,
            },
            exit_loc,
        )];
        stmts.extend(self.nested(body));
        self.push(loc, StmtNode::Loop { label: label.map(str::to_string), body: stmts })
    }

    pub fn break_(&mut self, label: Option<&str>) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Break { label: label.map(str::to_string) })
    }

    pub fn continue_(&mut self, label: Option<&str>) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Continue { label: label.map(str::to_string) })
    }

    pub fn return_(&mut self, value: Option<Expr>) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Return(value))
    }

    pub fn execute(&mut self, template: Template) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Execute(template))
    }

    pub fn expr(&mut self, expr: Expr) -> &mut Self {
        let loc = self.next_loc();
        self.push(loc, StmtNode::Expr(expr))
    }

    pub fn block(&mut self, body: impl FnOnce(&mut BlockBuilder)) -> &mut Self {
        let loc = self.next_loc();
        let stmts = self.nested(body);
        self.push(loc, StmtNode::Block(stmts))
    }

    pub fn finish(self) -> Vec<Stmt> {
        self.stmts
    }
}

// Expressions built without a location inherit the one of their statement.

fn stamp_stmt(node: &mut StmtNode, loc: SourceLoc) {
    match node {
        StmtNode::Let { init: Some(e), .. } => stamp(e, loc),
        StmtNode::Assign { value, .. } => stamp(value, loc),
        StmtNode::If { cond, .. } => stamp(cond, loc),
        StmtNode::Return(Some(e)) | StmtNode::Expr(e) => stamp(e, loc),
        StmtNode::Execute(template) => stamp_template(template, loc),
        _ => {}
    }
}

fn stamp_template(template: &mut Template, loc: SourceLoc) {
    for part in &mut template.parts {
        if let TemplatePart::Expr(e) = part {
            stamp(e, loc);
        }
    }
}

fn stamp(expr: &mut Expr, loc: SourceLoc) {
    if expr.loc == SourceLoc::default() {
        expr.loc = loc;
    }
    match &mut expr.node {
        ExprNode::Unary(_, inner) => stamp(inner, loc),
        ExprNode::Binary(_, lhs, rhs) => {
            stamp(lhs, loc);
            stamp(rhs, loc);
        }
        ExprNode::Call(_, args) => args.iter_mut().for_each(|a| stamp(a, loc)),
        ExprNode::Capture(_, template) => stamp_template(template, loc),
        ExprNode::Const(_) | ExprNode::Var(_) => {}
    }
}

fn unlocated(kind: Kind, node: ExprNode) -> Expr {
    Expr::new(kind, node, SourceLoc::default())
}

pub fn num(n: i32) -> Expr {
    unlocated(Kind::Number, ExprNode::Const(Value::Number(n)))
}

pub fn string(s: &str) -> Expr {
    unlocated(Kind::String, ExprNode::Const(Value::String(s.to_string())))
}

pub fn nbt(kind: Kind, snbt: &str) -> Expr {
    unlocated(kind, ExprNode::Const(Value::Nbt { kind, snbt: snbt.to_string() }))
}

pub fn var(name: &str, kind: Kind) -> Expr {
    unlocated(kind, ExprNode::Var(name.to_string()))
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    unlocated(Kind::Number, ExprNode::Unary(op, Box::new(operand)))
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn neg(operand: Expr) -> Expr {
    unary(UnaryOp::Neg, operand)
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    unlocated(Kind::Number, ExprNode::Binary(op, Box::new(lhs), Box::new(rhs)))
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Mul, lhs, rhs)
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Lt, lhs, rhs)
}

pub fn call(callee: FuncRef, ret: Kind, args: Vec<Expr>) -> Expr {
    unlocated(ret, ExprNode::Call(callee, args))
}

pub fn capture(mode: CaptureMode, template: Template) -> Expr {
    unlocated(Kind::Number, ExprNode::Capture(mode, template))
}
