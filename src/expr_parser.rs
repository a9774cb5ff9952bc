//! Expression Parser
//!
//! Converts the token stream from the lexer into an AST. Precedence, from
//! loosest to tightest: `OR`/`||`, `AND`/`&&`, `NOT`/`!`, comparisons,
//! `+ -`, `* / %`, unary minus, postfix `[index]`.

use crate::expr_ast::*;
use crate::expr_lexer::{Lexer, Token};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    /// Parse a complete expression string
    pub fn parse(source: &str) -> Result<Expression, String> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        let mut parser = Parser::new(tokens);
        let expression = parser.parse_expression()?;
        if parser.current() != &Token::Eof {
            return Err(format!("Unexpected trailing token {}", parser.current()));
        }
        Ok(expression)
    }

    pub fn parse_expression(&mut self) -> Result<Expression, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_and()?;

        while matches!(self.current(), Token::Or | Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_not()?;

        while matches!(self.current(), Token::And | Token::AndAnd) {
            self.advance();
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, String> {
        if matches!(self.current(), Token::Not | Token::Bang) {
            self.advance();
            Ok(Expression::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_additive()?;

        loop {
            let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.current() {
                Token::Equal => Expression::Equal,
                Token::NotEqual => Expression::NotEqual,
                Token::LessThan => Expression::LessThan,
                Token::LessThanEq => Expression::LessThanEq,
                Token::GreaterThan => Expression::GreaterThan,
                Token::GreaterThanEq => Expression::GreaterThanEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = build(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.current() {
                Token::Plus => Expression::Add,
                Token::Minus => Expression::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = build(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_unary()?;

        loop {
            let build: fn(Box<Expression>, Box<Expression>) -> Expression = match self.current() {
                Token::Star => Expression::Multiply,
                Token::Slash => Expression::Divide,
                Token::Percent => Expression::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = build(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, String> {
        if self.current() == &Token::Minus {
            self.advance();
            // fold negative literals so `-1` stays a literal
            return Ok(match self.parse_unary()? {
                Expression::Literal(Literal::Integer(n)) => Expression::integer(-n),
                Expression::Literal(Literal::Float(f)) => Expression::Literal(Literal::Float(-f)),
                other => Expression::Negate(Box::new(other)),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, String> {
        let mut expr = self.parse_primary()?;

        while self.current() == &Token::LeftBracket {
            self.advance();
            let index = self.parse_expression()?;
            self.expect(&Token::RightBracket)?;
            expr = Expression::Index(Box::new(expr), Box::new(index));
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();

                if self.current() == &Token::LeftParen {
                    return self.parse_call(&name);
                }

                // Dotted path: record.owner.name, items.0
                let mut path = vec![name];
                while self.current() == &Token::Dot {
                    self.advance();
                    path.push(self.parse_path_segment()?);
                }
                Ok(Expression::Variable(path))
            }
            Token::Placeholder(path) => {
                self.advance();
                Ok(Expression::Placeholder(path))
            }
            Token::Integer(n) => {
                self.advance();
                Ok(Expression::Literal(Literal::Integer(n)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(f)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }
            _ => Err(format!("Unexpected token in expression: {}", self.current())),
        }
    }

    /// Parse function call arguments: `name(arg, ...)`
    fn parse_call(&mut self, name: &str) -> Result<Expression, String> {
        let function =
            Function::from_name(name).ok_or_else(|| format!("Unknown function '{}'", name))?;
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();
        if self.current() != &Token::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RightParen)?;

        let (min, max) = function.arity();
        if args.len() < min || max.map_or(false, |max| args.len() > max) {
            return Err(format!(
                "Function {} takes {} argument(s), got {}",
                function.name(),
                match max {
                    Some(max) if max == min => min.to_string(),
                    Some(max) => format!("{}..{}", min, max),
                    None => format!("at least {}", min),
                },
                args.len()
            ));
        }

        Ok(Expression::Call(function, args))
    }

    fn parse_path_segment(&mut self) -> Result<String, String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            Token::Integer(n) if n >= 0 => {
                self.advance();
                Ok(n.to_string())
            }
            other => Err(format!("Expected path segment after '.', got {}", other)),
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if std::mem::discriminant(self.current()) == std::mem::discriminant(expected) {
            self.advance();
            Ok(())
        } else {
            Err(format!("Expected {:?}, got {}", expected, self.current()))
        }
    }
}
