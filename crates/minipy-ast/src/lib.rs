//! Tree definitions for minipy, a statically-typed Python-like language.
//!
//! The parser produces a [`Program`]; expressions and statements live in
//! arenas on the program and are referenced by [`ExprId`] / [`StmtId`]
//! everywhere else, so later stages can attach information in side tables
//! instead of copying the tree.

use la_arena::{Arena, Idx};
use smol_str::SmolStr;

mod ty;

pub use ty::Ty;

pub type ExprId = Idx<Expr>;
pub type StmtId = Idx<Stmt>;

/// Byte-offset range of a node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }
}

// ── Program ─────────────────────────────────────────────────────────────────

/// A whole compilation unit: declarations, then a top-level statement block.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub typevars: Vec<TypeVarInit>,
    pub inits: Vec<VarInit>,
    pub funs: Vec<FunDef>,
    pub classes: Vec<ClassDef>,
    pub body: Vec<StmtId>,
    pub stmts: Arena<Stmt>,
    pub exprs: Arena<Expr>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.alloc(stmt)
    }
}

/// `T: TypeVar = TypeVar('T')`.
#[derive(Debug, Clone)]
pub struct TypeVarInit {
    pub name: SmolStr,
    /// The name passed to the `TypeVar(...)` constructor.
    pub canonical_name: SmolStr,
    pub span: Span,
}

/// `x: ty = literal`.
#[derive(Debug, Clone)]
pub struct VarInit {
    pub name: SmolStr,
    pub ty: Ty,
    pub value: Literal,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: SmolStr,
    pub ty: Ty,
}

/// A function or method definition.
#[derive(Debug, Clone)]
pub struct FunDef {
    pub name: SmolStr,
    pub params: Vec<Param>,
    pub ret: Ty,
    /// Local variable declarations at the top of the body.
    pub inits: Vec<VarInit>,
    pub nonlocals: Vec<SmolStr>,
    /// Nested function definitions.
    pub children: Vec<FunDef>,
    pub body: Vec<StmtId>,
    pub span: Span,
}

/// One entry in a class's superclass list, as written: a class name and raw
/// type-argument names (`int` and `bool` are recognized, anything else is a
/// class or type-variable name).
#[derive(Debug, Clone)]
pub struct SuperRef {
    pub name: SmolStr,
    pub args: Vec<SmolStr>,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: SmolStr,
    /// Generic parameter names, empty for a plain class.
    pub type_params: Vec<SmolStr>,
    pub supers: Vec<SuperRef>,
    pub fields: Vec<VarInit>,
    pub methods: Vec<FunDef>,
    pub span: Span,
}

// ── Statements and expressions ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Num(i64),
    Bool(bool),
    None,
    /// `__ZERO__`, the placeholder initializer for typevar-typed variables.
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    IDiv,
    Mod,
    Eq,
    Neq,
    Lte,
    Gte,
    Lt,
    Gt,
    And,
    Or,
    Is,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lte => "<=",
            BinOp::Gte => ">=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Is => "is",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// One target of an assignment's left-hand side.
#[derive(Debug, Clone)]
pub struct AssignTarget {
    pub target: ExprId,
    /// `*x` in a destructuring pattern.
    pub star: bool,
    /// `_`, which discards the value.
    pub ignorable: bool,
}

/// The left-hand side of an assignment. `is_simple` means a single plain
/// target rather than a destructuring pattern.
#[derive(Debug, Clone)]
pub struct Destructure {
    pub is_simple: bool,
    pub targets: Vec<AssignTarget>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        destruct: Destructure,
        value: ExprId,
        span: Span,
    },
    Expr {
        expr: ExprId,
        span: Span,
    },
    If {
        cond: ExprId,
        then_body: Vec<StmtId>,
        else_body: Vec<StmtId>,
        span: Span,
    },
    While {
        cond: ExprId,
        body: Vec<StmtId>,
        span: Span,
    },
    For {
        var: SmolStr,
        iter: ExprId,
        body: Vec<StmtId>,
        span: Span,
    },
    Return {
        value: ExprId,
        span: Span,
    },
    Pass {
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    FieldAssign {
        obj: ExprId,
        field: SmolStr,
        value: ExprId,
        span: Span,
    },
    IndexAssign {
        obj: ExprId,
        index: ExprId,
        value: ExprId,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Pass { span }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::FieldAssign { span, .. }
            | Stmt::IndexAssign { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    Id {
        name: SmolStr,
        span: Span,
    },
    BinOp {
        op: BinOp,
        left: ExprId,
        right: ExprId,
        span: Span,
    },
    UnOp {
        op: UnOp,
        operand: ExprId,
        span: Span,
    },
    IfExpr {
        cond: ExprId,
        then: ExprId,
        els: ExprId,
        span: Span,
    },
    Lambda {
        params: Vec<SmolStr>,
        /// The annotated `callable` type of the whole lambda.
        ty: Ty,
        body: ExprId,
        span: Span,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
        span: Span,
    },
    MethodCall {
        obj: ExprId,
        method: SmolStr,
        args: Vec<ExprId>,
        span: Span,
    },
    Lookup {
        obj: ExprId,
        field: SmolStr,
        span: Span,
    },
    Index {
        obj: ExprId,
        index: ExprId,
        span: Span,
    },
    Slice {
        obj: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
        span: Span,
    },
    ListLit {
        items: Vec<ExprId>,
        span: Span,
    },
    Tuple {
        items: Vec<ExprId>,
        span: Span,
    },
    Builtin1 {
        name: SmolStr,
        arg: ExprId,
        span: Span,
    },
    Builtin2 {
        name: SmolStr,
        left: ExprId,
        right: ExprId,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Id { span, .. }
            | Expr::BinOp { span, .. }
            | Expr::UnOp { span, .. }
            | Expr::IfExpr { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::Call { span, .. }
            | Expr::MethodCall { span, .. }
            | Expr::Lookup { span, .. }
            | Expr::Index { span, .. }
            | Expr::Slice { span, .. }
            | Expr::ListLit { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Builtin1 { span, .. }
            | Expr::Builtin2 { span, .. } => *span,
        }
    }
}
