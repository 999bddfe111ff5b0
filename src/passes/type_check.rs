//! Kind checking over the statement tree.
//!
//! Reports every problem lowering would otherwise reject with a hard error, as
//! located diagnostics, so user mistakes never reach the core.

use crate::diagnostics::Diagnostic;
use crate::tree::{
    Expr, ExprNode, Function, Kind, Module, SourceLoc, Stmt, StmtNode, Template, TemplatePart,
};
use hashbrown::HashMap;

/// Check `function` against the signatures in `module`.
pub fn check_function(module: &Module, function: &Function) -> Vec<Diagnostic> {
    let mut checker = TypeChecker {
        module,
        ret: function.signature.ret,
        scopes: vec![HashMap::new()],
        labels: Vec::new(),
        diagnostics: Vec::new(),
    };
    if function.params.len() != function.signature.args.len() {
        checker.error(
            format!(
                "`{}` declares {} parameter names for {} arguments",
                function.name,
                function.params.len(),
                function.signature.args.len()
            ),
            function.loc,
        );
    }
    for (name, kind) in function.params.iter().zip(&function.signature.args) {
        checker.declare(name, *kind);
    }
    checker.check_block(&function.body);
    checker.diagnostics
}

struct TypeChecker<'m> {
    module: &'m Module,
    ret: Kind,
    scopes: Vec<HashMap<String, Kind>>,
    labels: Vec<Option<String>>,
    diagnostics: Vec<Diagnostic>,
}

impl TypeChecker<'_> {
    fn error(&mut self, message: String, loc: SourceLoc) {
        self.diagnostics.push(Diagnostic::error(message, loc));
    }

    fn declare(&mut self, name: &str, kind: Kind) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), kind);
        }
    }

    fn lookup(&self, name: &str) -> Option<Kind> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn expect(&mut self, expected: Kind, found: Kind, what: &str, loc: SourceLoc) {
        if expected != found {
            self.error(format!("{what}: expected {expected}, found {found}"), loc);
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.scopes.push(HashMap::new());
        for stmt in stmts {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        let loc = stmt.loc;
        match &stmt.node {
            StmtNode::Block(stmts) => self.check_block(stmts),
            StmtNode::Let { name, kind, init } => {
                if let Some(init) = init {
                    self.check_expr(init);
                    self.expect(*kind, init.kind, &format!("initializer of `{name}`"), init.loc);
                }
                self.declare(name, *kind);
            }
            StmtNode::Assign { name, value } => {
                self.check_expr(value);
                match self.lookup(name) {
                    Some(kind) => {
                        let what = format!("assignment to `{name}`");
                        self.expect(kind, value.kind, &what, value.loc)
                    }
                    None => self.error(format!("unknown variable `{name}`"), loc),
                }
            }
            StmtNode::If { cond, then_body, else_body } => {
                self.check_expr(cond);
                self.expect(Kind::Number, cond.kind, "condition", cond.loc);
                self.check_block(then_body);
                if let Some(else_body) = else_body {
                    self.check_block(else_body);
                }
            }
            StmtNode::Loop { label, body } => {
                if let Some(label) = label {
                    if self.labels.iter().any(|l| l.as_deref() == Some(label.as_str())) {
                        self.error(format!("duplicate loop label `{label}`"), loc);
                    }
                }
                self.labels.push(label.clone());
                self.check_block(body);
                self.labels.pop();
            }
            StmtNode::Break { label } => self.check_loop_control("break", label.as_deref(), loc),
            StmtNode::Continue { label } => {
                self.check_loop_control("continue", label.as_deref(), loc)
            }
            StmtNode::Return(value) => match value {
                Some(expr) => {
                    self.check_expr(expr);
                    self.expect(self.ret, expr.kind, "return value", expr.loc);
                }
                None if self.ret != Kind::Empty => {
                    let message =
                        format!("return without a value in a function returning {}", self.ret);
                    self.error(message, loc);
                }
                None => {}
            },
            StmtNode::Execute(template) => self.check_template(template),
            StmtNode::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_loop_control(&mut self, keyword: &str, label: Option<&str>, loc: SourceLoc) {
        if self.labels.is_empty() {
            self.error(format!("`{keyword}` outside of a loop"), loc);
            return;
        }
        if let Some(label) = label {
            if !self.labels.iter().any(|l| l.as_deref() == Some(label)) {
                self.error(format!("unknown loop label `{label}`"), loc);
            }
        }
    }

    fn check_template(&mut self, template: &Template) {
        for part in &template.parts {
            if let TemplatePart::Expr(expr) = part {
                self.check_expr(expr);
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        let loc = expr.loc;
        match &expr.node {
            ExprNode::Const(value) => self.expect(expr.kind, value.kind(), "constant", loc),
            ExprNode::Var(name) => match self.lookup(name) {
                Some(kind) => self.expect(kind, expr.kind, &format!("use of `{name}`"), loc),
                None => self.error(format!("unknown variable `{name}`"), loc),
            },
            ExprNode::Unary(op, operand) => {
                self.check_expr(operand);
                let what = format!("operand of `{}`", op.name());
                self.expect(Kind::Number, operand.kind, &what, operand.loc);
                self.expect(Kind::Number, expr.kind, &format!("result of `{}`", op.name()), loc);
            }
            ExprNode::Binary(op, lhs, rhs) => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                let what = format!("operand of `{}`", op.name());
                self.expect(Kind::Number, lhs.kind, &what, lhs.loc);
                self.expect(Kind::Number, rhs.kind, &what, rhs.loc);
                self.expect(Kind::Number, expr.kind, &format!("result of `{}`", op.name()), loc);
            }
            ExprNode::Call(callee, args) => {
                for arg in args {
                    self.check_expr(arg);
                }
                let module = self.module;
                let Some(function) = module.get(*callee) else {
                    self.error(format!("call to unknown function {callee}"), loc);
                    return;
                };
                let signature = &function.signature;
                if signature.args.len() != args.len() {
                    self.error(
                        format!(
                            "`{}` takes {} arguments but {} were given",
                            function.name,
                            signature.args.len(),
                            args.len()
                        ),
                        loc,
                    );
                    return;
                }
                let name = &function.name;
                for (i, (arg, kind)) in args.iter().zip(&signature.args).enumerate() {
                    let what = format!("argument {} of `{name}`", i + 1);
                    self.expect(*kind, arg.kind, &what, arg.loc);
                }
                self.expect(signature.ret, expr.kind, &format!("result of `{name}`"), loc);
            }
            ExprNode::Capture(_, template) => {
                self.check_template(template);
                self.expect(Kind::Number, expr.kind, "command capture", loc);
            }
        }
    }
}
