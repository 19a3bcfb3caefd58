//! Recursive descent parser for interpolation expressions
//!
//! Precedence from lowest to highest:
//! `?:`, `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`, unary `! -`, then attribute/index access
use super::lexer::{Lexer, Spanned, SyntaxError, Token};
use super::template::{escape_markers, escape_quoted, Template};
use crate::value::{Number, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal data, including quoted strings without interpolation
    Literal(Value),

    /// Quoted string with interpolation
    Template(Template),

    /// `var.region`, `local.tags.env`, `aws_instance.web.id`
    Reference(Reference),

    List(Vec<Expr>),

    /// Object constructor. Bare identifier keys are parsed as literal text.
    Map(Vec<(Expr, Expr)>),

    /// Attribute access on something that is not a plain reference: `local.items[0].name`
    GetAttr { object: Box<Expr>, name: String },

    Index { object: Box<Expr>, index: Box<Expr> },

    Unary { op: UnaryOp, expr: Box<Expr> },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    Call { name: String, args: Vec<Expr> },
}

/// Root identifier followed by attribute names
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Reference {
    pub root: String,
    pub path: Vec<String>,
}

impl Reference {
    /// `true` if the reference starts with `root.first`
    pub fn starts_with(&self, root: &str, first: &str) -> bool {
        self.root == root && self.path.first().is_some_and(|attr| attr == first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Mod => write!(f, "%"),
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::Ne => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
            BinaryOp::And => write!(f, "&&"),
            BinaryOp::Or => write!(f, "||"),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for attr in &self.path {
            write!(f, ".{attr}")?;
        }
        Ok(())
    }
}

/// Renders source text that parses back into the same expression
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write_value(f, value),
            Expr::Template(template) => write!(f, "\"{}\"", template.render(true)),
            Expr::Reference(reference) => write!(f, "{reference}"),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Map(entries) if entries.is_empty() => write!(f, "{{}}"),
            Expr::Map(entries) => {
                write!(f, "{{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match key {
                        Expr::Literal(_) | Expr::Template(_) => write!(f, "{key} = {value}")?,
                        _ => write!(f, "({key}) = {value}")?,
                    }
                }
                write!(f, " }}")
            }
            Expr::GetAttr { object, name } => {
                write_operand(f, object)?;
                write!(f, ".{name}")
            }
            Expr::Index { object, index } => {
                write_operand(f, object)?;
                write!(f, "[{index}]")
            }
            Expr::Unary { op, expr } => {
                write!(f, "{op}")?;
                write_operand(f, expr)
            }
            Expr::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                write_operand(f, condition)?;
                write!(f, " ? ")?;
                write_operand(f, then_expr)?;
                write!(f, " : ")?;
                write_operand(f, else_expr)
            }
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Operators bind tighter than anything they contain once parenthesized
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Binary { .. } | Expr::Conditional { .. } | Expr::Unary { .. } => {
            write!(f, "({expr})")
        }
        Expr::Literal(Value::Number(number)) if number.as_f64() < 0.0 => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(value) => write!(f, "{value}"),
        Value::Number(Number::Integer(int)) => write!(f, "{int}"),
        Value::Number(Number::Decimal(float)) => write!(f, "{float:?}"),
        Value::Text(text) => write!(f, "\"{}\"", escape_markers(&escape_quoted(text))),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, item)?;
            }
            write!(f, "]")
        }
        Value::Map(map) if map.is_empty() => write!(f, "{{}}"),
        Value::Map(map) => {
            write!(f, "{{ ")?;
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "\"{}\" = ", escape_markers(&escape_quoted(key)))?;
                write_value(f, value)?;
            }
            write!(f, " }}")
        }
    }
}

pub struct ExprParser {
    tokens: Vec<Spanned>,
    position: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parses the complete input as one expression
    pub fn parse_str(input: &str) -> Result<Expr, SyntaxError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self::new(tokens);
        let expr = parser.parse_conditional()?;

        if !parser.check(&Token::Eof) {
            return Err(parser.unexpected("end of expression"));
        }

        Ok(expr)
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|spanned| &spanned.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.position + 1)
            .map(|spanned| &spanned.token)
            .unwrap_or(&Token::Eof)
    }

    fn current_position(&self) -> usize {
        self.tokens
            .get(self.position)
            .or(self.tokens.last())
            .map(|spanned| spanned.position)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, token: &Token) -> Result<(), SyntaxError> {
        if self.eat(token) {
            return Ok(());
        }
        Err(self.unexpected(&format!("`{token}`")))
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!("expected {expected}, found `{}`", self.peek()),
            self.current_position(),
        )
    }

    fn unsupported(&self, what: &str) -> SyntaxError {
        SyntaxError::new(format!("{what} are not supported"), self.current_position())
    }

    fn parse_conditional(&mut self) -> Result<Expr, SyntaxError> {
        let condition = self.parse_or()?;

        if !self.eat(&Token::Question) {
            return Ok(condition);
        }

        let then_expr = self.parse_conditional()?;
        self.expect(&Token::Colon)?;
        let else_expr = self.parse_conditional()?;

        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// Left-associative binary operators of one precedence level
    fn parse_binary(
        &mut self,
        operators: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let mut left = next(self)?;

        while let Some(op) = operators
            .iter()
            .find(|(token, _)| self.check(token))
            .map(|(_, op)| *op)
        {
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(&[(Token::Or, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(&[(Token::And, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(
            &[(Token::EqEq, BinaryOp::Eq), (Token::NotEq, BinaryOp::Ne)],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance();

        let expr = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(&Token::Dot) {
                expr = match self.advance() {
                    Token::Identifier(name) => Expr::GetAttr {
                        object: Box::new(expr),
                        name,
                    },
                    // legacy index syntax: `list.0`
                    Token::Number(raw) => Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(Expr::Literal(self.number(&raw)?)),
                    },
                    Token::Star => return Err(self.unsupported("splat expressions")),
                    _ => {
                        self.position -= 1;
                        return Err(self.unexpected("attribute name"));
                    }
                };
            } else if self.eat(&Token::LBracket) {
                if self.check(&Token::Star) {
                    return Err(self.unsupported("splat expressions"));
                }
                let index = self.parse_conditional()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let position = self.current_position();

        match self.advance() {
            Token::Number(raw) => Ok(Expr::Literal(self.number(&raw)?)),
            Token::Text(text) => Ok(Expr::Literal(Value::Text(text))),
            Token::Template(raw) => {
                let template = Template::parse(&raw, true).map_err(|error| {
                    SyntaxError::new(error.message, position + 1 + error.position)
                })?;
                Ok(match template.literal_text() {
                    Some(text) => Expr::Literal(Value::Text(text)),
                    None => Expr::Template(template),
                })
            }
            Token::Identifier(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.check(&Token::LParen) => self.parse_call(name),
                _ => Ok(self.parse_reference(name)),
            },
            Token::LParen => {
                let inner = self.parse_conditional()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_map(),
            _ => {
                self.position -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn number(&self, raw: &str) -> Result<Value, SyntaxError> {
        Number::parse(raw).map(Value::Number).ok_or_else(|| {
            SyntaxError::new(format!("invalid number `{raw}`"), self.current_position())
        })
    }

    fn parse_reference(&mut self, root: String) -> Expr {
        let mut path = vec![];
        while self.check(&Token::Dot) {
            let Token::Identifier(attr) = self.peek_next().clone() else {
                break;
            };
            self.advance();
            self.advance();
            path.push(attr);
        }
        Expr::Reference(Reference::new(root, path))
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, SyntaxError> {
        self.expect(&Token::LParen)?;

        let mut args = vec![];
        while !self.check(&Token::RParen) {
            args.push(self.parse_conditional()?);
            if self.check(&Token::Ellipsis) {
                return Err(self.unsupported("argument expansions"));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        Ok(Expr::Call { name, args })
    }

    fn parse_list(&mut self) -> Result<Expr, SyntaxError> {
        if matches!(self.peek(), Token::Identifier(keyword) if keyword == "for") {
            return Err(self.unsupported("for expressions"));
        }

        let mut items = vec![];
        while !self.check(&Token::RBracket) {
            items.push(self.parse_conditional()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket)?;

        Ok(Expr::List(items))
    }

    fn parse_map(&mut self) -> Result<Expr, SyntaxError> {
        if matches!(self.peek(), Token::Identifier(keyword) if keyword == "for") {
            return Err(self.unsupported("for expressions"));
        }

        let mut entries = vec![];
        while !self.check(&Token::RBrace) {
            let bare_key = match (self.peek(), self.peek_next()) {
                (Token::Identifier(name), Token::Assign | Token::Colon) => Some(name.clone()),
                _ => None,
            };
            let key = match bare_key {
                Some(name) => {
                    self.advance();
                    Expr::Literal(Value::Text(name))
                }
                None => self.parse_conditional()?,
            };

            if !self.eat(&Token::Assign) {
                self.expect(&Token::Colon)?;
            }

            let value = self.parse_conditional()?;
            entries.push((key, value));
            self.eat(&Token::Comma);
        }
        self.expect(&Token::RBrace)?;

        Ok(Expr::Map(entries))
    }
}
