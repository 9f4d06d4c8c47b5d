//! Abstract syntax tree produced by the [`Parser`](crate::parser::Parser).
//!
//! Nodes own their data, so a tree outlives the source buffer and token slice
//! it was parsed from.  Function bodies are shared behind `Rc` because every
//! closure created from a declaration points at the same body.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of a variable‑reference node (`Variable`, `Assign`, `This`,
/// `Super`).  The resolver keys scope distances by this, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

impl ExprId {
    /// A process‑unique id.  Ids are never reused, so resolution tables from
    /// separate REPL lines can be merged safely.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A **literal constant** that appears directly in the source code.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    /// The boolean constant `true`.
    True,

    /// The boolean constant `false`.
    False,

    /// The `nil` literal.
    Nil,
}

/// An identifier (or keyword) occurrence: its text and the line it sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub lexeme: String,
    pub line: usize,
}

impl Name {
    pub fn new<S: Into<String>>(lexeme: S, line: usize) -> Self {
        Self {
            lexeme: lexeme.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
        }
    }
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

/// A variable read, also used for a class's superclass clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: ExprId,
    pub name: Name,
}

/// **Abstract‑Syntax‑Tree node** representing every kind of *expression*.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Prefix unary operator expression.  *Example:* `!isReady` or `-42`
    Unary {
        operator: UnaryOp,
        line: usize,
        right: Box<Expr>,
    },

    /// Infix binary operator expression.  *Example:* `a + b`, `x <= y`
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        line: usize,
        right: Box<Expr>,
    },

    /// Short‑circuiting logical operators `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
    },

    /// Variable access.
    Variable(Variable),

    /// Assignment expression: `identifier "=" expression`
    Assign {
        id: ExprId,
        name: Name,
        value: Box<Expr>,
    },

    /// Function‑, method‑ or constructor‑call expression.
    Call {
        callee: Box<Expr>,
        /// Line of the closing `)`, for error reporting.
        line: usize,
        arguments: Vec<Expr>,
    },

    /// `object.name`
    Get { object: Box<Expr>, name: Name },

    /// `object.name = value`
    Set {
        object: Box<Expr>,
        name: Name,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { id: ExprId, keyword: Name },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Name,
        method: Name,
    },
}

impl Expr {
    /// Best‑effort source line of the expression.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,
            Expr::Grouping(expr) => expr.line(),
            Expr::Unary { line, .. } | Expr::Binary { line, .. } | Expr::Call { line, .. } => {
                *line
            }
            Expr::Logical { left, .. } => left.line(),
            Expr::Variable(var) => var.name.line,
            Expr::Assign { name, .. } | Expr::Get { name, .. } | Expr::Set { name, .. } => {
                name.line
            }
            Expr::This { keyword, .. } | Expr::Super { keyword, .. } => keyword.line,
        }
    }
}

/// A named function or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Name,

    /// Parameter names (arity ≤ 255).
    pub params: Vec<Name>,

    /// Body executed when the function is called.
    pub body: Vec<Stmt>,
}

/// **Abstract‑Syntax‑Tree node** for *statements*.  A program is a sequence
/// of these nodes returned by [`Parser::parse`](crate::parser::Parser::parse).
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    /// `print` statement used for output.
    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Name,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    /// `if` / `else` conditional.
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop; `for` loops are desugared into this.
    While { condition: Expr, body: Box<Stmt> },

    /// Function declaration ‑ becomes a first‑class callable value.
    Function(Rc<FunctionDecl>),

    /// `return` statement inside a function body.  Absent value ⇒ `nil`.
    Return { keyword: Name, value: Option<Expr> },

    /// `class Name (< Superclass)? { method* }`
    Class {
        name: Name,
        superclass: Option<Variable>,
        methods: Vec<Rc<FunctionDecl>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = ExprId::fresh();
        let b = ExprId::fresh();

        assert_ne!(a, b);
    }

    #[test]
    fn binary_line_comes_from_operator() {
        let expr = Expr::Binary {
            left: Box::new(Expr::Literal(LiteralValue::Number(1.0))),
            operator: BinaryOp::Add,
            line: 4,
            right: Box::new(Expr::Literal(LiteralValue::Number(2.0))),
        };

        assert_eq!(expr.line(), 4);
    }
}
