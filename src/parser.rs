use crate::Span;
use crate::lexer::{LexerError, Token, TokenKind};
use crate::number::Number;
use crate::types::{Node, Sexpr};
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(
        "Parse Error [at {}..{}]: Unexpected token '{}', expected {}",
        .found.span.start,
        .found.span.end,
        .found.kind,
        .expected
    )]
    UnexpectedToken { found: Token, expected: String },
    #[error("Parse Error: Unexpected end of input during parsing. Expected {0}")]
    UnexpectedEof(String),
    #[error("Lexer Error during parse: {0}")]
    LexerError(#[from] LexerError),
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    // We iterate over owned Tokens, consuming them from the front.
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    /// Reads one expression, consuming exactly the tokens that make it up.
    pub fn read_from_tokens(&mut self) -> ParseResult<Node> {
        match self.tokens.next() {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => self.read_list(span),
            Some(
                found @ Token {
                    kind: TokenKind::RParen,
                    ..
                },
            ) => Err(ParseError::UnexpectedToken {
                found,
                expected: "an atom or '('".to_string(),
            }),
            Some(Token {
                kind: TokenKind::Atom(text),
                span,
            }) => Ok(Node::new(atom(&text), span)),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())),
        }
    }

    /// Reads list elements after an already consumed `(` up to and including
    /// the matching `)`.
    fn read_list(&mut self, lparen_span: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.tokens.peek() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span,
                }) => {
                    let span = lparen_span.merge(*span);
                    self.tokens.next(); // pop off ')'
                    return Ok(Node::new_list(elements, span));
                }
                Some(_) => elements.push(self.read_from_tokens()?),
                None => return Err(ParseError::UnexpectedEof("')'".to_string())),
            }
        }
    }

    /// Reads a single top-level form. Any tokens after it are ignored.
    pub fn parse(mut self) -> ParseResult<Node> {
        self.read_from_tokens()
    }

    /// Reads forms until the token stream is exhausted.
    pub fn parse_all(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while !self.is_empty() {
            expressions.push(self.read_from_tokens()?);
        }
        Ok(expressions)
    }
}

/// Classifies an atom token: integer, then float, otherwise a symbol holding
/// the text verbatim.
pub fn atom(token: &str) -> Sexpr {
    if let Ok(i) = token.parse::<i64>() {
        Sexpr::Number(Number::Int(i))
    } else if let Ok(f) = token.parse::<f64>() {
        Sexpr::Number(Number::Float(f))
    } else {
        Sexpr::Symbol(token.to_string())
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Node> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse()
}

pub fn parse_all_str(input: &str) -> ParseResult<Vec<Node>> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse_all()
}
