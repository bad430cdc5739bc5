//! Template parsing.
//!
//! A template is literal text with `{{ <expr> }}` placeholders. An
//! expression is one of:
//! - a string literal, `"..."` or `'...'`
//! - a number literal, `42` or `-1.5`
//! - a context variable, `build_time`
//! - a call, `env("USER")` or `cmd("git rev-parse HEAD")`
//!
//! The whole template is parsed up front so that a syntax error anywhere is
//! reported before any expression is evaluated.

use crate::error::{RenderError, RenderResult};

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Str(String),
    Number(String),
    Var(String),
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    /// `offset` is the byte position of the opening `{{`.
    Placeholder { offset: usize, expr: Expr },
}

/// A parsed template, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text.
    pub fn parse(source: &str) -> RenderResult<Self> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while let Some(found) = source[pos..].find("{{") {
            let open = pos + found;
            if open > pos {
                segments.push(Segment::Text(source[pos..open].to_string()));
            }
            let mut parser = Parser::new(source, open + 2, open);
            let expr = parser.expression()?;
            parser.expect_close()?;
            segments.push(Segment::Placeholder { offset: open, expr });
            pos = parser.lexer.pos;
        }

        if pos < source.len() {
            segments.push(Segment::Text(source[pos..].to_string()));
        }

        Ok(Self { segments })
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of `{{ }}` placeholders.
    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder { .. }))
            .count()
    }

    /// Context variable names referenced anywhere in the template, in order of
    /// first appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder { expr, .. } = segment {
                collect_vars(expr, &mut names);
            }
        }
        names
    }
}

fn collect_vars<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Var(name) => {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_vars(arg, names);
            }
        }
        Expr::Str(_) | Expr::Number(_) => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Close,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{name}`"),
            Token::Str(_) => "string literal".to_string(),
            Token::Number(n) => format!("number `{n}`"),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Close => "`}}`".to_string(),
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Offset of the `{{` that opened this expression.
    open: usize,
}

impl<'a> Lexer<'a> {
    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn malformed(&self, offset: usize, message: impl Into<String>) -> RenderError {
        RenderError::MalformedExpression {
            offset,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Next token and the byte offset it starts at.
    fn next_token(&mut self) -> RenderResult<(usize, Token)> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Err(self.malformed(self.open, "unterminated `{{`"));
        };

        match c {
            '}' if self.src[self.pos..].starts_with("}}") => {
                self.pos += 2;
                Ok((start, Token::Close))
            }
            '(' => {
                self.bump();
                Ok((start, Token::LParen))
            }
            ')' => {
                self.bump();
                Ok((start, Token::RParen))
            }
            ',' => {
                self.bump();
                Ok((start, Token::Comma))
            }
            '"' | '\'' => self.string(c).map(|s| (start, Token::Str(s))),
            c if c.is_ascii_digit() || c == '-' => self.number().map(|n| (start, Token::Number(n))),
            c if c.is_ascii_alphabetic() || c == '_' => {
                while self
                    .peek_char()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    self.bump();
                }
                Ok((start, Token::Ident(self.src[start..self.pos].to_string())))
            }
            other => Err(self.malformed(start, format!("unexpected character `{other}`"))),
        }
    }

    fn string(&mut self, quote: char) -> RenderResult<String> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.malformed(start, "unterminated string literal")),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(c @ ('\\' | '"' | '\'')) => c,
                        Some(other) => {
                            return Err(self.malformed(
                                self.pos - other.len_utf8() - 1,
                                format!("unknown escape `\\{other}`"),
                            ));
                        }
                        None => return Err(self.malformed(start, "unterminated string literal")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self) -> RenderResult<String> {
        let start = self.pos;
        if self.peek_char() == Some('-') {
            self.bump();
        }
        let digits_start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == digits_start {
            return Err(self.malformed(start, "expected digits after `-`"));
        }
        if self.peek_char() == Some('.') {
            self.bump();
            let fraction_start = self.pos;
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            if self.pos == fraction_start {
                return Err(self.malformed(start, "expected digits after `.`"));
            }
        }
        Ok(self.src[start..self.pos].to_string())
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(usize, Token)>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, pos: usize, open: usize) -> Self {
        Self {
            lexer: Lexer { src, pos, open },
            peeked: None,
        }
    }

    fn next(&mut self) -> RenderResult<(usize, Token)> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> RenderResult<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let (_, token) = self.peeked.insert(token);
        Ok(token)
    }

    fn expression(&mut self) -> RenderResult<Expr> {
        let (offset, token) = self.next()?;
        match token {
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(name) => {
                if *self.peek()? == Token::LParen {
                    self.next()?;
                    let args = self.arguments()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::Close if self.is_blank_before(offset) => {
                Err(self.lexer.malformed(self.lexer.open, "empty expression"))
            }
            other => Err(self
                .lexer
                .malformed(offset, format!("expected an expression, found {}", other.describe()))),
        }
    }

    fn is_blank_before(&self, offset: usize) -> bool {
        self.lexer.src[self.lexer.open + 2..offset]
            .chars()
            .all(char::is_whitespace)
    }

    /// Arguments after the opening `(`, through the closing `)`.
    fn arguments(&mut self) -> RenderResult<Vec<Expr>> {
        let mut args = Vec::new();
        if *self.peek()? == Token::RParen {
            self.next()?;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            let (offset, token) = self.next()?;
            match token {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    return Err(self.lexer.malformed(
                        offset,
                        format!("expected `,` or `)`, found {}", other.describe()),
                    ));
                }
            }
        }
    }

    fn expect_close(&mut self) -> RenderResult<()> {
        let (offset, token) = self.next()?;
        match token {
            Token::Close => Ok(()),
            other => Err(self
                .lexer
                .malformed(offset, format!("expected `}}}}`, found {}", other.describe()))),
        }
    }
}
