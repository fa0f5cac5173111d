// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod types;

pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, evaluate};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use number::{Number, NumberError};
pub use parser::{ParseError, Parser, parse_all_str, parse_str};
pub use source::Span;
pub use types::{Node, Procedure, Sexpr};
