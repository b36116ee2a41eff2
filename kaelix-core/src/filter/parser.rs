//! Recursive-descent parser producing the filter AST.

use super::lexer::{tokenize, Token};
use crate::{Error, Result};

/// Literal value in a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Boolean.
    Bool(bool),
    /// Exact numeric.
    Int(i64),
    /// Approximate numeric.
    Float(f64),
    /// String.
    Str(String),
    /// NULL.
    Null,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// Filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Literal),
    /// Property or header reference.
    Identifier(String),
    /// Logical negation.
    Not(Box<Expr>),
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Comparison.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// Arithmetic.
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// Unary minus.
    Negate(Box<Expr>),
    /// `IS [NOT] NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// `[NOT] IN (...)`.
    In { expr: Box<Expr>, list: Vec<Literal>, negated: bool },
    /// `[NOT] LIKE pattern [ESCAPE c]`.
    Like { expr: Box<Expr>, pattern: String, escape: Option<char>, negated: bool },
    /// `[NOT] BETWEEN low AND high`.
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr>, negated: bool },
}

/// Parse an expression into its tree.
///
/// # Errors
/// Returns `InvalidFilter` for a lexical or syntax error.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(token) = parser.peek() {
        return Err(Error::invalid_filter(format!("unexpected trailing token {token:?}")));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(Error::invalid_filter(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(&Token::And) {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.additive()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }

        if self.eat(&Token::Is) {
            let negated = self.eat(&Token::Not);
            self.expect(&Token::Null)?;
            return Ok(Expr::IsNull { expr: Box::new(left), negated });
        }

        let negated = self.eat(&Token::Not);
        match self.peek() {
            Some(Token::In) => {
                self.pos += 1;
                let list = self.in_list()?;
                Ok(Expr::In { expr: Box::new(left), list, negated })
            },
            Some(Token::Like) => {
                self.pos += 1;
                let pattern = self.string_literal()?;
                let escape = if self.eat(&Token::Escape) { Some(self.escape_char()?) } else { None };
                Ok(Expr::Like { expr: Box::new(left), pattern, escape, negated })
            },
            Some(Token::Between) => {
                self.pos += 1;
                let low = self.additive()?;
                self.expect(&Token::And)?;
                let high = self.additive()?;
                Ok(Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                })
            },
            _ if negated => Err(Error::invalid_filter("NOT must be followed by IN, LIKE or BETWEEN")),
            _ => Ok(left),
        }
    }

    fn escape_char(&mut self) -> Result<char> {
        let text = self.string_literal()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::invalid_filter("ESCAPE must be a single character")),
        }
    }

    fn in_list(&mut self) -> Result<Vec<Literal>> {
        self.expect(&Token::LParen)?;
        let mut list = vec![self.literal()?];
        while self.eat(&Token::Comma) {
            list.push(self.literal()?);
        }
        self.expect(&Token::RParen)?;
        Ok(list)
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Int(i)) => Ok(Literal::Int(i)),
            Some(Token::Float(f)) => Ok(Literal::Float(f)),
            Some(Token::True) => Ok(Literal::Bool(true)),
            Some(Token::False) => Ok(Literal::Bool(false)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(i)) => Ok(Literal::Int(-i)),
                Some(Token::Float(f)) => Ok(Literal::Float(-f)),
                other => Err(Error::invalid_filter(format!("expected number, found {other:?}"))),
            },
            other => Err(Error::invalid_filter(format!("expected literal, found {other:?}"))),
        }
    }

    fn string_literal(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(Error::invalid_filter(format!("expected string, found {other:?}"))),
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            },
            Some(Token::Ident(name)) => Ok(Expr::Identifier(name)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::Int(i)) => Ok(Expr::Literal(Literal::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Literal::Float(f))),
            Some(Token::True) => Ok(Expr::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Literal::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Literal::Null)),
            other => Err(Error::invalid_filter(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("unexpected {other:?}"),
        }

        let expr = parse("x + 2 * 3 > 10").unwrap();
        match expr {
            Expr::Compare(CompareOp::Gt, left, _) => {
                assert!(matches!(*left, Expr::Arith(ArithOp::Add, _, _)));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_suffix_forms() {
        assert_eq!(
            parse("x IS NOT NULL").unwrap(),
            Expr::IsNull { expr: ident("x"), negated: true }
        );
        assert_eq!(
            parse("c NOT IN ('a', 'b')").unwrap(),
            Expr::In {
                expr: ident("c"),
                list: vec![Literal::Str("a".to_string()), Literal::Str("b".to_string())],
                negated: true
            }
        );
        assert_eq!(
            parse("n LIKE 'a\\_%' ESCAPE '\\'").unwrap(),
            Expr::Like { expr: ident("n"), pattern: "a\\_%".to_string(), escape: Some('\\'), negated: false }
        );
        assert!(matches!(parse("v BETWEEN 1 AND 5").unwrap(), Expr::Between { negated: false, .. }));
    }

    #[test]
    fn test_bare_identifier_and_boolean_literal() {
        assert_eq!(parse("flag").unwrap(), Expr::Identifier("flag".to_string()));
        assert_eq!(parse("TRUE").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert!(matches!(parse("NOT flag").unwrap(), Expr::Not(_)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("a =").is_err());
        assert!(parse("(a = 1").is_err());
        assert!(parse("a = 1 b").is_err());
        assert!(parse("a NOT 3").is_err());
        assert!(parse("a LIKE 'x' ESCAPE 'ab'").is_err());
    }
}
