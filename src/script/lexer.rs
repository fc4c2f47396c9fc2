//! Tokenizer with Python-style significant indentation.
//!
//! Newlines inside brackets are ignored, as are blank and comment-only lines.
//! Indentation changes at the start of a logical line produce `Indent` and
//! `Dedent` tokens.

use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Operators, longest first so that greedy matching works.
const OPERATORS: &[&str] = &[
    "**=", "//=", "->", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "(",
    ")", "[", "]", "{", "}", ",", ":", ".", ";", "+", "-", "*", "/", "%", "<", ">", "=", "@",
    "&", "|", "^", "~",
];

const TAB_WIDTH: usize = 8;

pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Open brackets with the position they were opened at.
    brackets: Vec<(char, usize, usize)>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, SyntaxError> {
        Err(SyntaxError::new(message, self.line, self.column))
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.brackets.is_empty() {
                if !self.handle_indentation()? {
                    break;
                }
                at_line_start = false;
            }

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.bump();
                    }
                }
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.peek() != Some('\n') {
                        return self.error("unexpected character after line continuation character");
                    }
                    self.bump();
                }
                '\n' => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    if self.brackets.is_empty() {
                        self.push(TokenKind::Newline, line, column);
                        at_line_start = true;
                    }
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.number()?;
                }
                c if c == '_' || c.is_alphabetic() => {
                    if self.string_prefix_len().is_some() {
                        self.string()?;
                    } else {
                        self.name();
                    }
                }
                '"' | '\'' => self.string()?,
                _ => self.operator()?,
            }
        }

        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(SyntaxError::new(format!("'{open}' was never closed"), line, column));
        }
        let (line, column) = (self.line, self.column);
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            self.push(TokenKind::Newline, line, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, line, column);
        }
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    /// Measure the indentation of the next non-blank line and emit
    /// `Indent`/`Dedent` tokens. Returns false at end of input.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        loop {
            let mut width = 0;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\x0c' | '\r' => {}
                    _ => break,
                }
                self.bump();
            }
            match self.peek() {
                None => return Ok(false),
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('#') => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.bump();
                    }
                    continue;
                }
                Some(_) => {}
            }

            let current = self.indents.last().copied().unwrap_or(0);
            let (line, column) = (self.line, self.column);
            if width > current {
                if self.tokens.is_empty() {
                    return self.error("unexpected indent");
                }
                self.indents.push(width);
                self.push(TokenKind::Indent, line, column);
            } else if width < current {
                while self.indents.last().is_some_and(|&w| w > width) {
                    self.indents.pop();
                    self.push(TokenKind::Dedent, line, column);
                }
                if self.indents.last().copied().unwrap_or(0) != width {
                    return self.error("unindent does not match any outer indentation level");
                }
            }
            return Ok(true);
        }
    }

    fn name(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::Name(ident), line, column);
    }

    /// Length of a string prefix (`r`, `u`, `f`, `b`, ...) directly followed by a quote.
    fn string_prefix_len(&self) -> Option<usize> {
        let mut len = 0;
        while let Some(c) = self.peek_at(len) {
            if len < 2 && matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'f' | 'b') {
                len += 1;
            } else {
                break;
            }
        }
        if len > 0 && matches!(self.peek_at(len), Some('"' | '\'')) {
            Some(len)
        } else {
            None
        }
    }

    fn string(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        let mut raw = false;
        while let Some(c) = self.peek() {
            match c.to_ascii_lowercase() {
                'r' => raw = true,
                'u' => {}
                'f' => return self.error("f-strings are not supported"),
                'b' => return self.error("bytes literals are not supported"),
                _ => break,
            }
            self.bump();
        }

        let quote = self.bump().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    "unterminated triple-quoted string literal".to_string()
                } else {
                    format!("unterminated string literal (detected at line {})", self.line)
                };
                return Err(SyntaxError::new(message, line, column));
            };
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(SyntaxError::new(
                    format!("unterminated string literal (detected at line {})", self.line),
                    line,
                    column,
                ));
            }
            self.bump();
            if c == '\\' {
                let Some(next) = self.bump() else { continue };
                if raw {
                    value.push('\\');
                    value.push(next);
                    continue;
                }
                match next {
                    '\n' => {}
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    'x' => value.push(self.hex_escape(2)?),
                    'u' => value.push(self.hex_escape(4)?),
                    'U' => value.push(self.hex_escape(8)?),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            } else {
                value.push(c);
            }
        }

        // Adjacent literals concatenate, as in "a" "b".
        if let Some(Token {
            kind: TokenKind::Str(prev),
            ..
        }) = self.tokens.last_mut()
        {
            prev.push_str(&value);
            return Ok(());
        }
        self.push(TokenKind::Str(value), line, column);
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let Some(d) = self.peek().and_then(|c| c.to_digit(16)) else {
                return self.error("truncated escape sequence");
            };
            self.bump();
            code = code * 16 + d;
        }
        match char::from_u32(code) {
            Some(c) => Ok(c),
            None => self.error("invalid unicode escape"),
        }
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1).map(|c| c.to_ascii_lowercase()) {
                Some('x') => Some(16),
                Some('o') => Some(8),
                Some('b') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c == '_' {
                        self.bump();
                    } else if c.is_digit(radix) {
                        digits.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                return match i64::from_str_radix(&digits, radix) {
                    Ok(v) => {
                        self.push(TokenKind::Int(v), line, column);
                        Ok(())
                    }
                    Err(_) => Err(SyntaxError::new("invalid integer literal", line, column)),
                };
            }
        }

        let mut text = String::new();
        let mut is_float = false;
        self.digits(&mut text);
        if text.is_empty() {
            text.push('0');
        }
        if self.peek() == Some('.') && !matches!(self.peek_at(1), Some(c) if c == '_' || c.is_alphabetic()) {
            is_float = true;
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.bump();
                if sign {
                    text.push(self.bump().unwrap_or('+'));
                }
                self.digits(&mut text);
            }
        }
        if self.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
            return self.error("invalid decimal literal");
        }

        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => return Err(SyntaxError::new("invalid float literal", line, column)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => {
                    return Err(SyntaxError::new(
                        "integer literal is too large",
                        line,
                        column,
                    ))
                }
            }
        };
        self.push(kind, line, column);
        Ok(())
    }

    fn digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else if c == '_' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn operator(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        let op = OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c))
        });
        let Some(op) = op else {
            let c = self.peek().unwrap_or(' ');
            return self.error(format!("invalid character '{c}'"));
        };

        match op {
            "(" | "[" | "{" => {
                let open = op.chars().next().unwrap_or('(');
                self.brackets.push((open, line, column));
            }
            ")" | "]" | "}" => {
                let close = op.chars().next().unwrap_or(')');
                let expected = match close {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    None => return self.error(format!("unmatched '{close}'")),
                    Some((open, _, _)) if open != expected => {
                        return self.error(format!(
                            "closing parenthesis '{close}' does not match opening parenthesis '{open}'"
                        ));
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }

        for _ in 0..op.len() {
            self.bump();
        }
        self.push(TokenKind::Op(op), line, column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("result = 1 + 2.5"),
            vec![
                TokenKind::Name("result".into()),
                TokenKind::Op("="),
                TokenKind::Int(1),
                TokenKind::Op("+"),
                TokenKind::Float(2.5),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if x:\n    y = 1\n\n    # comment\nz = 2\n");
        let indents = tokens.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn test_newlines_inside_brackets_are_ignored() {
        let tokens = kinds("x = [\n  1,\n  2,\n]\n");
        assert_eq!(
            tokens.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn test_string_escapes_and_concatenation() {
        assert_eq!(
            kinds(r#"s = "a\tb" 'c'"#)[2],
            TokenKind::Str("a\tbc".into())
        );
        assert_eq!(kinds(r#"s = r"a\n""#)[2], TokenKind::Str("a\\n".into()));
        assert_eq!(
            kinds("s = '''one\ntwo'''")[2],
            TokenKind::Str("one\ntwo".into())
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds("0x1f")[0], TokenKind::Int(31));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
    }

    #[test]
    fn test_unclosed_paren_reports_open_position() {
        let err = tokenize("x = (1 + 2\ny = 3").unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn test_unmatched_close() {
        let err = tokenize("x = 1)").unwrap_err();
        assert_eq!(err.message, "unmatched ')'");
    }

    #[test]
    fn test_mismatched_close() {
        let err = tokenize("x = [1)").unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").unwrap_err();
        assert_eq!(err.message, "unindent does not match any outer indentation level");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc").unwrap_err();
        assert!(err.message.starts_with("unterminated string literal"));
    }

    #[test]
    fn test_fstring_rejected() {
        let err = tokenize("x = f'{y}'").unwrap_err();
        assert_eq!(err.message, "f-strings are not supported");
    }
}
