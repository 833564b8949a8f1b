//! Tokenizer for the agent scripting surface
//!
//! Produces an indentation-aware token stream: `Newline` ends a logical
//! line, `Indent`/`Dedent` bracket blocks. Newlines inside brackets and
//! after a trailing backslash are joined.

use crate::error::ScriptError;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Kw(Kw),
    Sym(Sym),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kw {
    Def,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Is,
    Pass,
    Break,
    Continue,
    Import,
    From,
    As,
    True,
    False,
    None,
    Global,
    Try,
    Except,
    Finally,
    /// Reserved words the surface does not support
    Unsupported(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sym {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Arrow,
    At,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    DoubleSlashEq,
    PercentEq,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

fn keyword(word: &str) -> Option<Kw> {
    let kw = match word {
        "def" => Kw::Def,
        "return" => Kw::Return,
        "if" => Kw::If,
        "elif" => Kw::Elif,
        "else" => Kw::Else,
        "while" => Kw::While,
        "for" => Kw::For,
        "in" => Kw::In,
        "not" => Kw::Not,
        "and" => Kw::And,
        "or" => Kw::Or,
        "is" => Kw::Is,
        "pass" => Kw::Pass,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "import" => Kw::Import,
        "from" => Kw::From,
        "as" => Kw::As,
        "True" => Kw::True,
        "False" => Kw::False,
        "None" => Kw::None,
        "global" => Kw::Global,
        "try" => Kw::Try,
        "except" => Kw::Except,
        "finally" => Kw::Finally,
        "class" | "with" | "lambda" | "yield" | "async" | "await" | "del" | "nonlocal"
        | "raise" | "assert" => Kw::Unsupported(match word {
            "class" => "class",
            "with" => "with",
            "lambda" => "lambda",
            "yield" => "yield",
            "async" => "async",
            "await" => "await",
            "del" => "del",
            "nonlocal" => "nonlocal",
            "raise" => "raise",
            _ => "assert",
        }),
        _ => return None,
    };
    Some(kw)
}

/// Tokenize a whole source text
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    out: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            out: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.out.push(Token {
            tok,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                // Stay at line start while skipping blank lines
                at_line_start = self.handle_indentation()?;
                if at_line_start {
                    continue;
                }
            }

            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push_newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.number()?
                }
                c if c == '"' || c == '\'' => self.string(false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.symbol()?,
            }
        }

        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.out)
    }

    fn push_newline(&mut self) {
        if !matches!(self.out.last().map(|t| &t.tok), None | Some(Tok::Newline)) {
            self.push(Tok::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Measure leading whitespace; returns true if the line was blank
    fn handle_indentation(&mut self) -> Result<bool, ScriptError> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 4 + 1) * 4,
                '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            _ => {}
        }

        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if width != *self.indents.last().unwrap_or(&0) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn number(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|d| d.is_ascii_digit() || d == '-' || d == '+')
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid number literal '{}'", text)))?;
            self.push(Tok::Float(value));
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| self.error(format!("integer literal '{}' is too large", text)))?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }

    fn word(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        // String prefixes: r"..", f"..", u"..", rb, ...
        if matches!(self.peek(), Some('"') | Some('\''))
            && word.len() <= 2
            && word.chars().all(|c| "rRfFuUbB".contains(c))
        {
            let raw = word.chars().any(|c| c == 'r' || c == 'R');
            return self.string(raw);
        }

        match keyword(&word) {
            Some(kw) => self.push(Tok::Kw(kw)),
            None => self.push(Tok::Name(word)),
        }
        Ok(())
    }

    fn string(&mut self, raw: bool) -> Result<(), ScriptError> {
        let quote = self.peek().ok_or_else(|| self.error("unexpected end of input"))?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let start_line = self.line;

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ScriptError::Syntax {
                    line: start_line,
                    message: "unterminated string literal".to_string(),
                });
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            if c == '\n' {
                if !triple {
                    return Err(ScriptError::Syntax {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    });
                }
                self.line += 1;
            }

            if c == '\\' && !raw {
                let escaped = self.peek_at(1).ok_or_else(|| self.error("unterminated escape"))?;
                self.pos += 2;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\n' => self.line += 1,
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }

            value.push(c);
            self.pos += 1;
        }

        // Lines consumed inside the literal are attributed to its first line
        let end_line = self.line;
        self.line = start_line;
        self.push(Tok::Str(value));
        self.line = end_line;
        Ok(())
    }

    fn symbol(&mut self) -> Result<(), ScriptError> {
        let c = self.peek().ok_or_else(|| self.error("unexpected end of input"))?;
        let next = self.peek_at(1);
        let next2 = self.peek_at(2);

        let (sym, len) = match (c, next, next2) {
            ('/', Some('/'), Some('=')) => (Sym::DoubleSlashEq, 3),
            ('*', Some('*'), _) => (Sym::DoubleStar, 2),
            ('/', Some('/'), _) => (Sym::DoubleSlash, 2),
            ('=', Some('='), _) => (Sym::EqEq, 2),
            ('!', Some('='), _) => (Sym::NotEq, 2),
            ('<', Some('='), _) => (Sym::Le, 2),
            ('>', Some('='), _) => (Sym::Ge, 2),
            ('+', Some('='), _) => (Sym::PlusEq, 2),
            ('-', Some('='), _) => (Sym::MinusEq, 2),
            ('*', Some('='), _) => (Sym::StarEq, 2),
            ('/', Some('='), _) => (Sym::SlashEq, 2),
            ('%', Some('='), _) => (Sym::PercentEq, 2),
            ('-', Some('>'), _) => (Sym::Arrow, 2),
            ('(', _, _) => (Sym::LParen, 1),
            (')', _, _) => (Sym::RParen, 1),
            ('[', _, _) => (Sym::LBracket, 1),
            (']', _, _) => (Sym::RBracket, 1),
            ('{', _, _) => (Sym::LBrace, 1),
            ('}', _, _) => (Sym::RBrace, 1),
            (',', _, _) => (Sym::Comma, 1),
            (':', _, _) => (Sym::Colon, 1),
            ('.', _, _) => (Sym::Dot, 1),
            (';', _, _) => (Sym::Semicolon, 1),
            ('@', _, _) => (Sym::At, 1),
            ('+', _, _) => (Sym::Plus, 1),
            ('-', _, _) => (Sym::Minus, 1),
            ('*', _, _) => (Sym::Star, 1),
            ('/', _, _) => (Sym::Slash, 1),
            ('%', _, _) => (Sym::Percent, 1),
            ('=', _, _) => (Sym::Assign, 1),
            ('<', _, _) => (Sym::Lt, 1),
            ('>', _, _) => (Sym::Gt, 1),
            (other, _, _) => return Err(self.error(format!("unexpected character '{}'", other))),
        };

        match sym {
            Sym::LParen | Sym::LBracket | Sym::LBrace => self.depth += 1,
            Sym::RParen | Sym::RBracket | Sym::RBrace => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| self.error("unmatched closing bracket"))?;
            }
            _ => {}
        }

        self.pos += len;
        self.push(Tok::Sym(sym));
        Ok(())
    }
}
