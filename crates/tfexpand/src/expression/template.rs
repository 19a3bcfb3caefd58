//! string templates: literal text with `${ ... }` interpolation sequences
//!
//! Two flavours exist:
//! - attribute text as produced by the document parser. Only the markers are escaped (`$${`, `%%{`)
//! - quoted strings inside an interpolation. Backslash escapes apply in addition to the markers
//!
//! Template directives (`%{ if }`, `%{ for }`) are not supported.
use super::lexer::SyntaxError;
use super::parser::{Expr, ExprParser};

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
}

impl Template {
    /// Parses template text. `quoted` enables backslash escapes.
    pub fn parse(text: &str, quoted: bool) -> Result<Self, SyntaxError> {
        let bytes = text.as_bytes();
        let mut parts = vec![];
        let mut literal = String::new();
        let mut i = 0;

        while i < bytes.len() {
            let rest = &text[i..];

            if rest.starts_with("$${") {
                literal.push_str("${");
                i += 3;
            } else if rest.starts_with("%%{") {
                literal.push_str("%{");
                i += 3;
            } else if rest.starts_with("${") {
                let end = interpolation_end(text, i + 2)
                    .ok_or_else(|| SyntaxError::new("unterminated interpolation".into(), i))?;
                let expr = ExprParser::parse_str(&text[i + 2..end]).map_err(|error| {
                    SyntaxError::new(error.message, i + 2 + error.position)
                })?;

                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(TemplatePart::Interpolation(expr));
                i = end + 1;
            } else if rest.starts_with("%{") {
                return Err(SyntaxError::new(
                    "template directives are not supported".into(),
                    i,
                ));
            } else if quoted && bytes[i] == b'\\' {
                let consumed = unescape(rest, &mut literal)
                    .map_err(|message| SyntaxError::new(message, i))?;
                i += consumed;
            } else if let Some(ch) = rest.chars().next() {
                literal.push(ch);
                i += ch.len_utf8();
            }
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        Ok(Self { parts })
    }

    pub fn has_interpolation(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, TemplatePart::Interpolation(_)))
    }

    /// The expression of a template that consists of exactly one interpolation and nothing else
    pub fn single_interpolation(&self) -> Option<&Expr> {
        match self.parts.as_slice() {
            [TemplatePart::Interpolation(expr)] => Some(expr),
            _ => None,
        }
    }

    /// The text of a template without interpolation
    pub fn literal_text(&self) -> Option<String> {
        let mut text = String::new();
        for part in &self.parts {
            let TemplatePart::Literal(literal) = part else {
                return None;
            };
            text.push_str(literal);
        }
        Some(text)
    }

    /// Renders the template back to source text that [Template::parse] accepts with the same `quoted` flag
    pub fn render(&self, quoted: bool) -> String {
        let mut text = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(literal) if quoted => {
                    text.push_str(&escape_markers(&escape_quoted(literal)))
                }
                TemplatePart::Literal(literal) => text.push_str(&escape_markers(literal)),
                TemplatePart::Interpolation(expr) => {
                    text.push_str("${");
                    text.push_str(&expr.to_string());
                    text.push('}');
                }
            }
        }
        text
    }
}

/// Escapes interpolation and directive markers so the text is taken literally
pub fn escape_markers(text: &str) -> String {
    text.replace("${", "$${").replace("%{", "%%{")
}

pub(crate) fn escape_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Processes one backslash escape at the start of `rest`. Returns the consumed byte count.
fn unescape(rest: &str, out: &mut String) -> Result<usize, String> {
    let mut chars = rest.chars().skip(1);
    let consumed = match chars.next() {
        Some('n') => {
            out.push('\n');
            2
        }
        Some('r') => {
            out.push('\r');
            2
        }
        Some('t') => {
            out.push('\t');
            2
        }
        Some('"') => {
            out.push('"');
            2
        }
        Some('\\') => {
            out.push('\\');
            2
        }
        Some(kind @ ('u' | 'U')) => {
            let digits = if kind == 'u' { 4 } else { 8 };
            let hex = rest
                .get(2..2 + digits)
                .ok_or_else(|| format!("incomplete `\\{kind}` escape"))?;
            let ch = u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| format!("invalid unicode escape `\\{kind}{hex}`"))?;
            out.push(ch);
            2 + digits
        }
        Some(other) => return Err(format!("invalid escape sequence `\\{other}`")),
        None => return Err("unterminated escape sequence".into()),
    };
    Ok(consumed)
}

/// Byte index of the `"` closing a quoted string whose content starts at `start`
pub(crate) fn quoted_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            b'$' | b'%'
                if bytes.get(i + 1) == Some(&bytes[i]) && bytes.get(i + 2) == Some(&b'{') =>
            {
                i += 3
            }
            b'$' | b'%' if bytes.get(i + 1) == Some(&b'{') => {
                i = interpolation_end(source, i + 2)? + 1
            }
            _ => i += 1,
        }
    }

    None
}

/// Byte index of the `}` closing an interpolation whose content starts at `start`
pub(crate) fn interpolation_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = quoted_end(source, i + 1)? + 1,
            b'\'' => i = single_quoted_end(source, i + 1)? + 1,
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => {
                depth -= 1;
                i += 1;
            }
            _ => i += 1,
        }
    }

    None
}

fn single_quoted_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return Some(i),
            _ => i += 1,
        }
    }
    None
}
