//! Tokenizer for the expression language found inside `${ ... }`
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal as written
    Number(String),
    /// Double-quoted string: raw content between the quotes, may contain interpolation
    Template(String),
    /// Single-quoted string with escapes already processed
    Text(String),
    Identifier(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Bang,
    Dot,
    Comma,
    Colon,
    Question,
    Assign,
    Ellipsis,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Template(s) => write!(f, "\"{s}\""),
            Token::Text(s) => write!(f, "'{s}'"),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::EqEq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Bang => f.write_str("!"),
            Token::Dot => f.write_str("."),
            Token::Comma => f.write_str(","),
            Token::Colon => f.write_str(":"),
            Token::Question => f.write_str("?"),
            Token::Assign => f.write_str("="),
            Token::Ellipsis => f.write_str("..."),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::Eof => f.write_str("end of expression"),
        }
    }
}

/// A token and the byte offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, derive_new::new)]
#[error("{message} at position {position}")]
pub struct SyntaxError {
    pub message: String,
    pub position: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Tokenize the entire input. The last token is always [Token::Eof].
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, SyntaxError> {
        let mut tokens = Vec::new();

        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        self.skip_whitespace();

        let position = self.position;
        let Some(ch) = self.peek() else {
            return Ok(Spanned {
                token: Token::Eof,
                position,
            });
        };

        let token = match ch {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '?' => self.single(Token::Question),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            '.' if self.rest().starts_with("...") => {
                self.position += 3;
                Token::Ellipsis
            }
            '.' => self.single(Token::Dot),
            '=' => self.one_or_two('=', Token::Assign, Token::EqEq),
            '!' => self.one_or_two('=', Token::Bang, Token::NotEq),
            '<' => self.one_or_two('=', Token::Lt, Token::Le),
            '>' => self.one_or_two('=', Token::Gt, Token::Ge),
            '&' if self.rest().starts_with("&&") => {
                self.position += 2;
                Token::And
            }
            '|' if self.rest().starts_with("||") => {
                self.position += 2;
                Token::Or
            }
            '"' => Token::Template(self.double_quoted()?),
            '\'' => Token::Text(self.single_quoted()?),
            c if c.is_ascii_digit() => Token::Number(self.number()),
            c if c.is_alphabetic() || c == '_' => Token::Identifier(self.identifier()),
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character `{other}`"),
                    position,
                ))
            }
        };

        Ok(Spanned { token, position })
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.position += ch.len_utf8();
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn one_or_two(&mut self, second: char, one: Token, two: Token) -> Token {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            return two;
        }
        one
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&predicate) {
            self.bump();
        }
    }

    fn number(&mut self) -> String {
        let start = self.position;
        self.consume_while(|c| c.is_ascii_digit());

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.consume_while(|c| c.is_ascii_digit());
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_digit = match self.peek_at(1) {
                Some('+' | '-') => self.peek_at(2),
                other => other,
            };
            if exponent_digit.is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.consume_while(|c| c.is_ascii_digit());
            }
        }

        self.input[start..self.position].to_string()
    }

    /// Identifiers may contain dashes after the first character, as in HCL
    fn identifier(&mut self) -> String {
        let start = self.position;
        self.consume_while(|c| c.is_alphanumeric() || c == '_' || c == '-');
        self.input[start..self.position].to_string()
    }

    fn double_quoted(&mut self) -> Result<String, SyntaxError> {
        let start = self.position;
        let content_start = start + 1;
        let end = super::template::quoted_end(self.input, content_start)
            .ok_or_else(|| SyntaxError::new("unterminated string".to_string(), start))?;

        self.position = end + 1;
        Ok(self.input[content_start..end].to_string())
    }

    fn single_quoted(&mut self) -> Result<String, SyntaxError> {
        let start = self.position;
        self.bump();

        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(SyntaxError::new("unterminated string".to_string(), start)),
                Some('\'') => {
                    self.bump();
                    return Ok(text);
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some(escaped @ ('\'' | '\\')) => text.push(escaped),
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => {
                            text.push('\\');
                            text.push(other);
                        }
                        None => {
                            return Err(SyntaxError::new("unterminated string".to_string(), start))
                        }
                    }
                    self.bump();
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .expect("must tokenize")
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokens("a >= 1 && !b || c != 2"),
            vec![
                Token::Identifier("a".into()),
                Token::Ge,
                Token::Number("1".into()),
                Token::And,
                Token::Bang,
                Token::Identifier("b".into()),
                Token::Or,
                Token::Identifier("c".into()),
                Token::NotEq,
                Token::Number("2".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn negative_number_is_unary_minus() {
        assert_eq!(
            tokens("max(-1,2)*3"),
            vec![
                Token::Identifier("max".into()),
                Token::LParen,
                Token::Minus,
                Token::Number("1".into()),
                Token::Comma,
                Token::Number("2".into()),
                Token::RParen,
                Token::Star,
                Token::Number("3".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("1.5 2e3 7"),
            vec![
                Token::Number("1.5".into()),
                Token::Number("2e3".into()),
                Token::Number("7".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn nested_template_string() {
        assert_eq!(
            tokens(r#"var.a ? "x-${var.b ? "y" : "z"}" : 'q'"#),
            vec![
                Token::Identifier("var".into()),
                Token::Dot,
                Token::Identifier("a".into()),
                Token::Question,
                Token::Template(r#"x-${var.b ? "y" : "z"}"#.into()),
                Token::Colon,
                Token::Text("q".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        let error = Lexer::new("\"abc").tokenize().expect_err("must fail");
        assert_eq!(error.position, 0);
    }

    #[test]
    fn unexpected_character() {
        assert!(Lexer::new("a & b").tokenize().is_err());
    }
}
