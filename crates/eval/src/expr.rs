//! The parsed expression tree.
//!
//! The external parser produces one `Expr` per expression string.
//! Each node owns its children; the evaluator recurses on the tree,
//! so skipping a subexpression is simply not descending into it with
//! effects (see [`crate::EvalMode`]).

use symtab::TypeId;

/// Binary operators with C semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BinOp {
    /// The `operator<op>` member name used for aggregate operands.
    pub fn member_operator(self) -> &'static str {
        match self {
            BinOp::Add => "operator+",
            BinOp::Sub => "operator-",
            BinOp::Mul => "operator*",
            BinOp::Div => "operator/",
            BinOp::Rem => "operator%",
            BinOp::LShift => "operator<<",
            BinOp::RShift => "operator>>",
            BinOp::BitAnd => "operator&",
            BinOp::BitOr => "operator|",
            BinOp::BitXor => "operator^",
            BinOp::Eq => "operator==",
            BinOp::NotEq => "operator!=",
            BinOp::Less => "operator<",
            BinOp::LessEq => "operator<=",
            BinOp::Greater => "operator>",
            BinOp::GreaterEq => "operator>=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    LogicalNot,
    BitNot,
}

/// One expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Integer literal; `ty` overrides the default (int) when the
    /// parser saw a suffix.
    IntLit { value: i64, ty: Option<TypeId> },
    FloatLit { value: f64 },
    /// A name resolved against the current scope at evaluation time
    Ident(String),
    /// `$pc`, `$x0`, ... a machine register by name
    Register(String),
    /// `$foo` - a debugger convenience variable
    InternalVar(String),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    LogicalAnd { lhs: Box<Expr>, rhs: Box<Expr> },
    LogicalOr { lhs: Box<Expr>, rhs: Box<Expr> },
    Ternary { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `a += b` and friends
    AssignOp { op: BinOp, target: Box<Expr>, value: Box<Expr> },
    Deref(Box<Expr>),
    AddrOf(Box<Expr>),
    /// `base.name` or, with `through_pointer`, `base->name`
    Member { base: Box<Expr>, name: String, through_pointer: bool },
    Subscript { base: Box<Expr>, index: Box<Expr> },
    Cast { ty: TypeId, operand: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `x@n` - treat `x` as the first of `n` array elements
    Repeat { base: Box<Expr>, count: Box<Expr> },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::IntLit { value, ty: None }
    }

    pub fn ident(name: &str) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn member(base: Expr, name: &str, through_pointer: bool) -> Self {
        Expr::Member { base: Box::new(base), name: name.into(), through_pointer }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign { target: Box::new(target), value: Box::new(value) }
    }
}
