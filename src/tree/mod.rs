//! Typed statement/expression tree consumed by the compiler core.
//!
//! The tree arrives already validated by a front end: every expression carries
//! its [`Kind`], every statement its [`SourceLoc`]. Functions live in a
//! [`Module`] table and are referred to by [`FuncRef`], which is also the
//! identity the orchestrator memoizes on. Declaring a function before defining
//! its body lets bodies call themselves or each other.
//!
//! ```text
//! fn fact(n: number) -> number {
//!     if n < 2 { return 1; }
//!     return n * fact(n - 1);
//! }
//! ```

pub mod builder;

use std::fmt;

/// Line/column position in the original source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Value kind carried by every expression and signature slot.
///
/// Kinds are compared by tag; there is no coercion between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Number,
    String,
    Compound,
    List,
    Empty,
}

impl Kind {
    /// Single-letter tag used when mangling signatures.
    pub fn tag(self) -> char {
        match self {
            Kind::Number => 'n',
            Kind::String => 's',
            Kind::Compound => 'c',
            Kind::List => 'l',
            Kind::Empty => 'e',
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Compound => "compound",
            Kind::List => "list",
            Kind::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Number(i32),
    String(String),
    /// Structured constant kept as its literal text.
    Nbt { kind: Kind, snbt: String },
    Empty,
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Nbt { kind, .. } => *kind,
            Value::Empty => Kind::Empty,
        }
    }

    pub fn as_number(&self) -> Option<i32> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Literal form used when storing the value into the machine.
    pub fn to_snbt(&self) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote(s),
            Value::Nbt { snbt, .. } => snbt.clone(),
            Value::Empty => "{}".to_string(),
        }
    }

    /// Raw form used when splicing the value into command text.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_snbt(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_snbt())
    }
}

/// Quote a string as an SNBT string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            Eq => "eq",
            Ne => "ne",
            And => "and",
            Or => "or",
        }
    }
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }
}

/// What a command output capture stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    Result,
    Success,
}

/// Function identity within a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(pub u32);

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub args: Vec<Kind>,
    pub ret: Kind,
}

impl Signature {
    pub fn new(args: Vec<Kind>, ret: Kind) -> Self {
        Self { args, ret }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: Kind,
    pub node: ExprNode,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    Const(Value),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(FuncRef, Vec<Expr>),
    /// Run a command and capture its result or success flag.
    Capture(CaptureMode, Template),
}

impl Expr {
    pub fn new(kind: Kind, node: ExprNode, loc: SourceLoc) -> Self {
        Self { kind, node, loc }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match &self.node {
            ExprNode::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Whether evaluating the expression can be observed outside of it.
    pub fn has_side_effects(&self) -> bool {
        match &self.node {
            ExprNode::Const(_) | ExprNode::Var(_) => false,
            ExprNode::Unary(_, inner) => inner.has_side_effects(),
            ExprNode::Binary(_, lhs, rhs) => lhs.has_side_effects() || rhs.has_side_effects(),
            ExprNode::Call(..) | ExprNode::Capture(..) => true,
        }
    }
}

/// Inline command text with embedded expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(TemplatePart::Text(text.into()));
        self
    }

    pub fn expr(mut self, expr: Expr) -> Self {
        self.parts.push(TemplatePart::Expr(expr));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub node: StmtNode,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtNode {
    Block(Vec<Stmt>),
    Let {
        name: String,
        kind: Kind,
        init: Option<Expr>,
    },
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    /// Unconditional loop; `while` is desugared into this before lowering.
    Loop {
        label: Option<String>,
        body: Vec<Stmt>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return(Option<Expr>),
    Execute(Template),
    Expr(Expr),
}

impl Stmt {
    pub fn new(node: StmtNode, loc: SourceLoc) -> Self {
        Self { node, loc }
    }

    /// Whether control never falls through to the next statement.
    pub fn diverges(&self) -> bool {
        matches!(
            self.node,
            StmtNode::Return(_) | StmtNode::Break { .. } | StmtNode::Continue { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub loc: SourceLoc,
}

/// Function table. Indices are stable for the lifetime of the module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function with an empty body.
    pub fn declare(&mut self, name: &str, params: &[(&str, Kind)], ret: Kind) -> FuncRef {
        let func = FuncRef(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_string(),
            signature: Signature::new(params.iter().map(|(_, kind)| *kind).collect(), ret),
            params: params.iter().map(|(name, _)| name.to_string()).collect(),
            body: Vec::new(),
            loc: SourceLoc::default(),
        });
        func
    }

    /// Set the body of a declared function.
    pub fn define(&mut self, func: FuncRef, body: Vec<Stmt>) {
        if let Some(function) = self.functions.get_mut(func.0 as usize) {
            function.body = body;
        }
    }

    pub fn set_loc(&mut self, func: FuncRef, loc: SourceLoc) {
        if let Some(function) = self.functions.get_mut(func.0 as usize) {
            function.loc = loc;
        }
    }

    pub fn get(&self, func: FuncRef) -> Option<&Function> {
        self.functions.get(func.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<FuncRef> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| FuncRef(idx as u32))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncRef, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(idx, f)| (FuncRef(idx as u32), f))
    }
}
