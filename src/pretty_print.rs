use std::io;
use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

use crate::environment::EnvError;
use crate::evaluator::EvalError;
use crate::parser::ParseError;
use crate::source::Span;

const SOURCE_ID: &str = "REPL";

type DiagnosticReport = Report<'static, (&'static str, Range<usize>)>;

fn build(span: Span, message: String, label: String, config: Config) -> DiagnosticReport {
    Report::build(ReportKind::Error, (SOURCE_ID, span.to_range()))
        .with_config(config)
        .with_message(message)
        .with_label(Label::new((SOURCE_ID, span.to_range())).with_message(label))
        .finish()
}

impl EvalError {
    fn report(&self, config: Config) -> DiagnosticReport {
        let span = self.span();
        let (message, label) = match self {
            EvalError::EnvError(EnvError::UnboundVariable(symbol, _)) => (
                format!("Unbound symbol `{}`", symbol),
                "This symbol is not defined in the current scope".to_string(),
            ),
            EvalError::NotAProcedure(sexpr, _) => (
                format!("Not a procedure: {}", sexpr),
                "This expression cannot be called as a procedure".to_string(),
            ),
            EvalError::InvalidArguments(message, _) => {
                ("Invalid arguments".to_string(), message.clone())
            }
            EvalError::TypeMismatch {
                expected, found, ..
            } => (
                "Type mismatch".to_string(),
                format!("Expected {}, found {} {}", expected, found.type_name(), found),
            ),
            EvalError::IndexError(message, _) => {
                ("Index out of range".to_string(), message.clone())
            }
            EvalError::NotASymbol(sexpr, _) => (
                format!("Not a symbol: {}", sexpr),
                format!("Expected a symbol but found a {}", sexpr.type_name()),
            ),
            EvalError::InvalidSpecialForm(message, _) => (
                format!("Invalid special form: {}", message),
                "This special form is malformed or incomplete".to_string(),
            ),
            EvalError::Arithmetic { source, .. } => (
                format!("Arithmetic error: {}", source),
                "Raised while evaluating this call".to_string(),
            ),
            EvalError::StackOverflow { limit, .. } => (
                "Stack overflow".to_string(),
                format!("Recursion went deeper than {} levels here", limit),
            ),
        };
        build(span, message, label, config)
    }

    /// Writes an annotated report of this error against `input` to stderr.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        self.report(Config::default())
            .eprint((SOURCE_ID, Source::from(input)))
    }
}

impl ParseError {
    fn report(&self, input: &str, config: Config) -> DiagnosticReport {
        match self {
            ParseError::UnexpectedToken { found, expected } => build(
                found.span,
                format!("Unexpected token: {}", found.kind),
                format!("Expected {expected}"),
                config,
            ),
            ParseError::UnexpectedEof(expected) => {
                // Point at the last character of the input
                let end = input.len();
                let start = input
                    .char_indices()
                    .next_back()
                    .map_or(end, |(idx, _)| idx);
                build(
                    Span::new(start, end),
                    "Unexpected end of input".to_string(),
                    format!("Expected {expected}"),
                    config,
                )
            }
            ParseError::LexerError(lex_err) => build(
                lex_err.span,
                "Lexer Error".to_string(),
                lex_err.error.to_string(),
                config,
            ),
        }
    }

    /// Writes an annotated report of this error against `input` to stderr.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        self.report(input, Config::default())
            .eprint((SOURCE_ID, Source::from(input)))
    }
}
