//! Recursive-descent parser producing [`Node`] trees.
//!
//! A program is a sequence of forms separated by `;` or newlines. A form is
//! either a `let` binding or an expression. Binary operators are parsed by
//! precedence climbing over [`LEVELS`], and juxtaposition (application) binds
//! tighter than any operator.

use std::{fmt, rc::Rc};

use crate::{
    BinaryOp, Node,
    lexer::{Pos, Token, TokenKind, tokenize},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// The offending token as it appeared in the source, `END` at end of form.
    pub token: String,
    pub pos: Pos,
}

impl ParseError {
    pub fn new(message: impl Into<String>, token: &Token<'_>) -> Self {
        Self {
            message: message.into(),
            token: token.describe().to_string(),
            pos: token.pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parsing error: {} (while parsing '{}') at {}",
            self.message, self.token, self.pos
        )
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
    None,
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Or,
    And,
    Arith(BinaryOp),
}

/// Operator levels in order of increasing precedence.
const LEVELS: [Assoc; 6] = [
    Assoc::Left,  // or
    Assoc::Left,  // and
    Assoc::None,  // > < =
    Assoc::Left,  // + -
    Assoc::Left,  // * / %
    Assoc::Right, // ^
];

fn infix(level: usize, kind: TokenKind) -> Option<Infix> {
    let op = match (level, kind) {
        (0, TokenKind::Or) => return Some(Infix::Or),
        (1, TokenKind::And) => return Some(Infix::And),
        (2, TokenKind::Gt) => BinaryOp::Gt,
        (2, TokenKind::Lt) => BinaryOp::Lt,
        (2, TokenKind::Eq) => BinaryOp::Eq,
        (3, TokenKind::Plus) => BinaryOp::Add,
        (3, TokenKind::Minus) => BinaryOp::Sub,
        (4, TokenKind::Asterisk) => BinaryOp::Mul,
        (4, TokenKind::Slash) => BinaryOp::Div,
        (4, TokenKind::Percent) => BinaryOp::Mod,
        (5, TokenKind::Caret) => BinaryOp::Pow,
        _ => return None,
    };
    Some(Infix::Arith(op))
}

impl Infix {
    fn build(self, left: Node, right: Node) -> Node {
        match self {
            Infix::Or => Node::or(left, right),
            Infix::And => Node::and(left, right),
            Infix::Arith(op) => Node::binary(op, left, right),
        }
    }
}

// TERM_TOKEN <- '(' | NUMBER | ID
fn starts_term(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::LParen | TokenKind::Number | TokenKind::Ident
    )
}

/// Parser over the tokens of a single form. The slice must end with a
/// [`TokenKind::End`] token.
pub struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    cursor: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    pub fn new(tokens: &'t [Token<'a>]) -> Self {
        debug_assert!(
            tokens.last().is_some_and(|t| t.kind == TokenKind::End),
            "token stream must be END-terminated"
        );
        Self { tokens, cursor: 0 }
    }

    fn peek(&self) -> &Token<'a> {
        &self.tokens[self.cursor]
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.tokens[self.cursor];
        if token.kind != TokenKind::End {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token<'a>, ParseError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::new(message, &token))
        }
    }

    // VALID ::= (LET | EXPRESSION) END
    pub fn parse_form(&mut self) -> Result<Node, ParseError> {
        let form = if self.peek().kind == TokenKind::Let {
            self.parse_let()?
        } else {
            self.parse_expression()?
        };
        let next = self.advance();
        if next.kind != TokenKind::End {
            return Err(ParseError::new(
                "unexpected token after the expression",
                &next,
            ));
        }
        Ok(form)
    }

    // LET ::= 'let' ID LET_VALUE
    fn parse_let(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::Let, "expected 'let'")?;
        let name = self.expect(TokenKind::Ident, "expected identifier")?;
        let value = self.parse_let_value()?;
        Ok(Node::let_binding(name.text, value))
    }

    // LET_VALUE ::= '=' EXPRESSION | ID LET_VALUE
    fn parse_let_value(&mut self) -> Result<Node, ParseError> {
        let next = self.advance();
        match next.kind {
            TokenKind::Eq => self.parse_expression(),
            TokenKind::Ident => Ok(Node::func(next.text, self.parse_let_value()?)),
            _ => Err(ParseError::new("expected '=' or an identifier", &next)),
        }
    }

    // EXPRESSION ::= IF | FN | OP
    pub fn parse_expression(&mut self) -> Result<Node, ParseError> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::Fn => self.parse_fn(),
            _ => self.parse_op(0),
        }
    }

    // IF ::= 'if' OP 'then' EXPRESSION 'else' EXPRESSION
    fn parse_if(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::If, "expected 'if'")?;
        let cond = self.parse_op(0)?;
        self.expect(TokenKind::Then, "expected 'then'")?;
        let then = self.parse_expression()?;
        self.expect(TokenKind::Else, "expected 'else'")?;
        let otherwise = self.parse_expression()?;
        Ok(Node::if_else(cond, then, otherwise))
    }

    // FN ::= 'fn' ID FN_BODY
    fn parse_fn(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::Fn, "expected 'fn'")?;
        let param = self.expect(TokenKind::Ident, "expected identifier")?;
        let body = self.parse_fn_body()?;
        Ok(Node::func(param.text, body))
    }

    // FN_BODY ::= ':' EXPRESSION | ID FN_BODY
    fn parse_fn_body(&mut self) -> Result<Node, ParseError> {
        let next = self.advance();
        match next.kind {
            TokenKind::Colon => self.parse_expression(),
            TokenKind::Ident => Ok(Node::func(next.text, self.parse_fn_body()?)),
            _ => Err(ParseError::new("expected ':' or an identifier", &next)),
        }
    }

    fn parse_op(&mut self, level: usize) -> Result<Node, ParseError> {
        let Some(&assoc) = LEVELS.get(level) else {
            return self.parse_application();
        };
        let mut left = self.parse_op(level + 1)?;
        match assoc {
            Assoc::Left => {
                while let Some(op) = infix(level, self.peek().kind) {
                    self.advance();
                    let right = self.parse_op(level + 1)?;
                    left = op.build(left, right);
                }
                Ok(left)
            }
            Assoc::Right | Assoc::None => {
                let Some(op) = infix(level, self.peek().kind) else {
                    return Ok(left);
                };
                self.advance();
                let right = if assoc == Assoc::Right {
                    self.parse_op(level)?
                } else {
                    self.parse_op(level + 1)?
                };
                Ok(op.build(left, right))
            }
        }
    }

    // APPLICATION ::= TERM | APPLICATION TERM
    fn parse_application(&mut self) -> Result<Node, ParseError> {
        let mut callee = self.parse_term()?;
        while starts_term(self.peek().kind) {
            let arg = self.parse_term()?;
            callee = Node::apply(callee, arg);
        }
        Ok(callee)
    }

    // TERM ::= '(' EXPRESSION ')' | NUMBER | ID | '-' TERM
    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let next = self.advance();
        match next.kind {
            TokenKind::Minus => Ok(Node::neg(self.parse_term()?)),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(expr)
            }
            TokenKind::Number => next
                .text
                .parse()
                .map(Node::number)
                .map_err(|_| ParseError::new("invalid number literal", &next)),
            TokenKind::Ident => Ok(Node::Ident(Rc::from(next.text))),
            _ => Err(ParseError::new(
                "expected '(', '-', a number or an identifier",
                &next,
            )),
        }
    }
}

/// Splits a token stream into per-form slices, each ending with an END
/// token. Empty forms are dropped.
fn split_forms<'a>(tokens: &[Token<'a>]) -> Vec<Vec<Token<'a>>> {
    let mut forms = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::Terminator | TokenKind::End => {
                if !current.is_empty() {
                    let end = Token::new(TokenKind::End, token.text, token.pos);
                    current.push(end);
                    forms.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(*token),
        }
    }
    forms
}

/// Parses every form of `source` in order. A malformed form yields an error
/// and parsing resumes with the next form.
pub fn parse_program(source: &str) -> Vec<Result<Node, ParseError>> {
    split_forms(&tokenize(source))
        .iter()
        .map(|form| Parser::new(form).parse_form())
        .collect()
}

/// Parses `source` as exactly one form. Trailing terminators are allowed.
pub fn parse_form(source: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(source);
    let mut forms = split_forms(&tokens).into_iter();
    let Some(first) = forms.next() else {
        let end = tokens
            .last()
            .copied()
            .unwrap_or(Token::new(TokenKind::End, "", Pos::origin()));
        return Err(ParseError::new("expected an expression", &end));
    };
    if let Some(extra) = forms.next() {
        return Err(ParseError::new(
            "unexpected token after the expression",
            &extra[0],
        ));
    }
    Parser::new(&first).parse_form()
}
