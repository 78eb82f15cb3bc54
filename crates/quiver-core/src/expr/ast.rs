/// Binary operators, loosest-binding first in the parser's precedence
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `||` / `or`
    Or,
    /// `&&` / `and`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in` membership test
    In,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Numeric negation
    Neg,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Lit(serde_json::Value),
    /// Environment name lookup
    Ident(String),
    /// Unary application
    Unary(UnOp, Box<Expr>),
    /// Binary application
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Member access `a.b`
    Member(Box<Expr>, String),
    /// Index access `a['b']` / `a[0]`
    Index(Box<Expr>, Box<Expr>),
    /// Call of a built-in
    Call(Box<Expr>, Vec<Expr>),
}
