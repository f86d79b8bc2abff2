use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::node::{BlockStatement, Expression, FunctionLiteral, Program, Statement};

/// Binding power of infix positions, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,      // ==
    LessGreater, // > or <
    Sum,         // +
    Product,     // *
    Prefix,      // -x or !x
    Call,        // f(x)
    Index,       // a[i]
}

/// Deepest expression tree the parser builds. Parsing, compiling and
/// dropping the AST all recurse once per level.
pub const MAX_NESTING_DEPTH: usize = 256;

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Asterisk | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Pratt parser for Monkey.
///
/// Consumes the lexer's `Spanned` tokens and produces a `Program`. The first
/// error aborts parsing.
///
/// Notes:
/// - Semicolons after statements are optional.
/// - A function literal bound by `let` records the binding name so the
///   compiler can resolve self references without a global lookup.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Creates a new parser from lexer output.
    ///
    /// A trailing `Token::Eof` is appended if the input lacks one, so the
    /// parser can always peek.
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last(), Some(Spanned { token: Token::Eof, .. })) {
            let span = tokens
                .last()
                .map(|s| s.span)
                .unwrap_or(Span { line: 1, col: 1 });
            tokens.push(Spanned {
                token: Token::Eof,
                span,
            });
        }
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Returns the next unconsumed token.
    fn current(&self) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    /// Consumes one token and returns it. Never moves past `Eof`.
    fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        spanned
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ParserError {
        ParserError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Constructs a `ParserError` at the next unconsumed token.
    fn error(&self, message: impl Into<String>) -> ParserError {
        self.error_at(self.current().span, message)
    }

    fn expect(&mut self, expected: Token) -> Result<Spanned, ParserError> {
        if *self.peek() == expected {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected '{}', got '{}'", expected, self.peek())))
        }
    }

    fn skip_semicolon(&mut self) {
        if *self.peek() == Token::Semicolon {
            self.advance();
        }
    }

    /// Parses a complete program. Stops at `Token::Eof`.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();

        while *self.peek() != Token::Eof {
            statements.push(self.parse_statement()?);
        }

        Ok(Program { statements })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.peek() {
            Token::Let => self.parse_let(),
            Token::Return => self.parse_return(),
            _ => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.skip_semicolon();
                Ok(Statement::Expression(expression))
            }
        }
    }

    /// ```text
    /// let <ident> = <expression>;
    /// ```
    fn parse_let(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // consume 'let'

        let name = match self.peek() {
            Token::Ident(name) => name.clone(),
            other => {
                return Err(self.error(format!("expected identifier after 'let', got '{}'", other)));
            }
        };
        self.advance();

        self.expect(Token::Assign)?;

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expression::Function(literal) = &mut value {
            literal.name = Some(name.clone());
        }

        self.skip_semicolon();
        Ok(Statement::Let { name, value })
    }

    fn parse_return(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // consume 'return'

        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Ok(Statement::Return(value))
    }

    /// ```text
    /// { <statement>* }
    /// ```
    fn parse_block(&mut self) -> Result<BlockStatement, ParserError> {
        self.expect(Token::LBrace)?;

        let mut statements = Vec::new();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            statements.push(self.parse_statement()?);
        }

        self.expect(Token::RBrace)?;
        Ok(BlockStatement { statements })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let entry_depth = self.depth;
        let result = self.parse_expression_nested(precedence);
        self.depth = entry_depth;
        result
    }

    /// Every prefix and every infix/call/index wrap adds one level to the
    /// tree under construction.
    fn descend(&mut self) -> Result<(), ParserError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        Ok(())
    }

    fn parse_expression_nested(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        self.descend()?;
        let mut left = self.parse_prefix()?;

        while *self.peek() != Token::Semicolon && precedence < precedence_of(self.peek()) {
            self.descend()?;
            left = match self.peek() {
                Token::LParen => self.parse_call(left)?,
                Token::LBracket => self.parse_index(left)?,
                _ => self.parse_infix(left)?,
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParserError> {
        let Spanned { token, span } = self.advance();

        let expression = match token {
            Token::Ident(name) => Expression::Identifier(name),
            Token::Int(value) => Expression::Integer(value),
            Token::String(value) => Expression::String(value),
            Token::True => Expression::Boolean(true),
            Token::False => Expression::Boolean(false),
            Token::Bang | Token::Minus => {
                let right = self.parse_expression(Precedence::Prefix)?;
                Expression::prefix(&token.to_string(), right)
            }
            Token::LParen => {
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::If => self.parse_if()?,
            Token::Function => self.parse_function()?,
            Token::LBracket => Expression::Array(self.parse_expression_list(Token::RBracket)?),
            Token::LBrace => self.parse_hash()?,
            Token::Eof => return Err(self.error_at(span, "unexpected end of input")),
            other => return Err(self.error_at(span, format!("unexpected token '{}'", other))),
        };

        Ok(expression)
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression, ParserError> {
        let operator = self.advance().token;
        let right = self.parse_expression(precedence_of(&operator))?;
        Ok(Expression::infix(left, &operator.to_string(), right))
    }

    fn parse_call(&mut self, function: Expression) -> Result<Expression, ParserError> {
        self.advance(); // consume '('
        let arguments = self.parse_expression_list(Token::RParen)?;
        Ok(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index(&mut self, left: Expression) -> Result<Expression, ParserError> {
        self.advance(); // consume '['
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RBracket)?;
        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    /// ```text
    /// if (<condition>) { ... } else { ... }
    /// ```
    fn parse_if(&mut self) -> Result<Expression, ParserError> {
        self.expect(Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RParen)?;

        let consequence = self.parse_block()?;

        let alternative = if *self.peek() == Token::Else {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// ```text
    /// fn(<ident>, ...) { ... }
    /// ```
    fn parse_function(&mut self) -> Result<Expression, ParserError> {
        self.expect(Token::LParen)?;

        let mut parameters = Vec::new();
        if *self.peek() != Token::RParen {
            loop {
                match self.advance() {
                    Spanned {
                        token: Token::Ident(name),
                        ..
                    } => parameters.push(name),
                    Spanned { token, span } => {
                        return Err(
                            self.error_at(span, format!("expected parameter name, got '{}'", token))
                        );
                    }
                }

                if *self.peek() != Token::Comma {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen)?;

        let body = self.parse_block()?;

        Ok(Expression::Function(FunctionLiteral {
            name: None,
            parameters,
            body,
        }))
    }

    /// Comma-separated expressions up to and including `end`.
    fn parse_expression_list(&mut self, end: Token) -> Result<Vec<Expression>, ParserError> {
        let mut list = Vec::new();

        if *self.peek() == end {
            self.advance();
            return Ok(list);
        }

        list.push(self.parse_expression(Precedence::Lowest)?);
        while *self.peek() == Token::Comma {
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        self.expect(end)?;
        Ok(list)
    }

    /// ```text
    /// { <key>: <value>, ... }
    /// ```
    fn parse_hash(&mut self) -> Result<Expression, ParserError> {
        let mut pairs = Vec::new();

        while *self.peek() != Token::RBrace {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if *self.peek() != Token::RBrace {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::RBrace)?;

        Ok(Expression::Hash(pairs))
    }
}

/// Lexes and parses `source` in one go.
pub fn parse_source(source: &str) -> Result<Program, crate::MonkeyError> {
    let tokens = crate::frontend::lexer::Lexer::new(source).tokenize()?;
    Ok(Parser::new(tokens).parse()?)
}
