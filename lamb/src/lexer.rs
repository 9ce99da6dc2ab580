//! Tokenizer for lamb source text.
//!
//! The [`Lexer`] walks a borrowed `&str` and implements [`Iterator`] over
//! [`Token`]s, tracking line and column for each one. Newlines and `;` are
//! significant: both end a top-level form and come out as
//! [`TokenKind::Terminator`]. The iterator yields exactly one
//! [`TokenKind::End`] before finishing.

use std::fmt;

/// A position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based, in bytes).
    pub column: usize,
}

impl Pos {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub const fn origin() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Ident,

    If,
    Then,
    Else,
    Fn,
    Let,
    And,
    Or,

    LParen,
    RParen,
    Colon,
    Caret,
    Asterisk,
    Slash,
    Percent,
    Plus,
    Minus,
    Gt,
    Lt,
    Eq,

    /// `;` or a newline.
    Terminator,
    End,
    /// A character that starts no token.
    Error,
}

impl TokenKind {
    /// Upper-case name used by the token dump.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Number => "NUMBER",
            TokenKind::Ident => "ID",
            TokenKind::If => "IF",
            TokenKind::Then => "THEN",
            TokenKind::Else => "ELSE",
            TokenKind::Fn => "FN",
            TokenKind::Let => "LET",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::Colon => "COLON",
            TokenKind::Caret => "CARET",
            TokenKind::Asterisk => "ASTERISK",
            TokenKind::Slash => "SLASH",
            TokenKind::Percent => "PERCENT",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Gt => "GT",
            TokenKind::Lt => "LT",
            TokenKind::Eq => "EQ",
            TokenKind::Terminator => "TERMINATOR",
            TokenKind::End => "END",
            TokenKind::Error => "ERROR",
        }
    }

    fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "fn" => TokenKind::Fn,
            "let" => TokenKind::Let,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            _ => return None,
        })
    }

    fn punctuation(c: u8) -> Option<Self> {
        Some(match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b':' => TokenKind::Colon,
            b'^' => TokenKind::Caret,
            b'*' => TokenKind::Asterisk,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'>' => TokenKind::Gt,
            b'<' => TokenKind::Lt,
            b'=' => TokenKind::Eq,
            b';' | b'\n' => TokenKind::Terminator,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Source text of the token, empty for [`TokenKind::End`].
    pub text: &'a str,
    pub pos: Pos,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, pos: Pos) -> Self {
        Self { kind, text, pos }
    }

    /// Text shown in diagnostics: the lexeme, or `END` at end of form.
    pub fn describe(&self) -> &'a str {
        match self.kind {
            TokenKind::End => "END",
            TokenKind::Terminator if self.text == "\n" => "END",
            _ => self.text,
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.offset).copied()
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.offset += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn advance_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }

    fn skip_blanks(&mut self) {
        self.advance_while(|c| matches!(c, b' ' | b'\t' | b'\r'));
    }

    // [0-9]+ ('.' [0-9]+)?
    fn number(&mut self) -> TokenKind {
        self.advance_while(|c| c.is_ascii_digit());
        let bytes = self.source.as_bytes();
        let fraction = bytes.get(self.offset) == Some(&b'.')
            && bytes.get(self.offset + 1).is_some_and(u8::is_ascii_digit);
        if fraction {
            self.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }
        TokenKind::Number
    }

    fn word(&mut self, start: usize) -> TokenKind {
        self.advance_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        TokenKind::keyword(&self.source[start..self.offset]).unwrap_or(TokenKind::Ident)
    }

    fn unknown(&mut self) -> TokenKind {
        // consume a whole UTF-8 scalar so the token text stays a valid slice
        self.advance();
        while self.peek().is_some_and(|c| c & 0xC0 == 0x80) {
            self.advance();
        }
        TokenKind::Error
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.finished {
            return None;
        }
        self.skip_blanks();
        let start = self.offset;
        let pos = self.pos();
        let Some(c) = self.peek() else {
            self.finished = true;
            return Some(Token::new(TokenKind::End, "", pos));
        };

        let kind = if c.is_ascii_digit() {
            self.number()
        } else if c.is_ascii_alphabetic() || c == b'_' {
            self.word(start)
        } else if let Some(kind) = TokenKind::punctuation(c) {
            self.advance();
            kind
        } else {
            self.unknown()
        };
        Some(Token::new(kind, &self.source[start..self.offset], pos))
    }
}

/// Tokenizes the whole of `source`, ending with [`TokenKind::End`].
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).collect()
}
