use serde::Serialize;

/// A parsed Monkey program: a flat list of top-level statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    /// `let <name> = <value>;`
    Let { name: String, value: Expression },

    /// `return <value>;`
    Return(Expression),

    /// An expression evaluated for its value (or side effect).
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    Identifier(String),
    Integer(i64),
    String(String),
    Boolean(bool),

    /// `!x`, `-x`
    Prefix {
        operator: String,
        right: Box<Expression>,
    },

    /// `a + b`, `a < b`, ...
    Infix {
        left: Box<Expression>,
        operator: String,
        right: Box<Expression>,
    },

    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },

    Function(FunctionLiteral),

    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },

    Array(Vec<Expression>),

    /// Key/value pairs in source order.
    Hash(Vec<(Expression, Expression)>),

    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

/// `fn(<parameters>) { <body> }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionLiteral {
    /// Set by the parser when the literal is the value of a `let`, so the
    /// function can refer to itself.
    pub name: Option<String>,
    pub parameters: Vec<String>,
    pub body: BlockStatement,
}

impl Expression {
    pub fn infix(left: Expression, operator: &str, right: Expression) -> Self {
        Expression::Infix {
            left: Box::new(left),
            operator: operator.to_string(),
            right: Box::new(right),
        }
    }

    pub fn prefix(operator: &str, right: Expression) -> Self {
        Expression::Prefix {
            operator: operator.to_string(),
            right: Box::new(right),
        }
    }

    pub fn ident(name: &str) -> Self {
        Expression::Identifier(name.to_string())
    }
}
