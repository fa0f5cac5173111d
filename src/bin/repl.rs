use std::borrow::Cow;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::thread;

use clap::Parser;
use minilisp::evaluator::{set_max_depth, special_form_identifiers};
use minilisp::{Environment, Sexpr, TokenKind, evaluate, parse_str, tokenize};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{EditMode, Helper, Highlighter, Hinter, Validator};

// The interpreter thread gets a large stack, so it can nest deeper than the
// library default.
const REPL_MAX_DEPTH: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "minilisp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interactive interpreter for a small Lisp", long_about = None)]
struct Args {
    /// Text shown before each input line
    #[arg(long, value_name = "TEXT", default_value = "lisp> ")]
    prompt: String,

    /// File the input history is loaded from and saved to
    #[arg(long, value_name = "FILE", default_value = ".minilisp_history")]
    history: PathBuf,

    #[arg(long = "no-history")]
    no_history: bool,

    /// Use vi key bindings instead of emacs
    #[arg(long)]
    vi: bool,

    /// How deeply evaluation may nest before reporting a stack overflow
    #[arg(long = "max-depth", value_name = "N", default_value_t = REPL_MAX_DEPTH)]
    max_depth: usize,

    /// Stack size of the interpreter thread, in MiB
    #[arg(long = "stack-size", value_name = "MIB", default_value_t = 256)]
    stack_size: usize,
}

struct LispCompleter {
    env: Rc<RefCell<Environment>>,
}

impl LispCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        LispCompleter { env }
    }
}

impl rustyline::completion::Completer for LispCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        // Only complete when the cursor sits right after an atom
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last() {
                Some(token) if token.span.end == pos => match &token.kind {
                    TokenKind::Atom(prefix) => prefix.clone(),
                    _ => return Ok((pos, vec![])),
                },
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter_map(|id| id.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|suffix| !suffix.is_empty())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Validator)]
    validator: ParenValidator,
    #[rustyline(Highlighter)]
    highlighter: ParenHighlighter,
    #[rustyline(Completer)]
    completer: LispCompleter,
}

/// Byte offset of the first `)` that closes nothing, or the nesting depth
/// left open at the end of `input`.
fn paren_balance(input: &str) -> Result<usize, usize> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return Err(i),
            },
            _ => {}
        }
    }
    Ok(depth)
}

struct ParenValidator;

impl Validator for ParenValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        match paren_balance(ctx.input()) {
            Err(i) => Ok(ValidationResult::Invalid(Some(format!(
                "  - Unmatched ')' at position {}",
                i
            )))),
            Ok(0) => Ok(ValidationResult::Valid(None)),
            Ok(_) => Ok(ValidationResult::Incomplete),
        }
    }
}

/// Pairs every `(` with its `)` by byte offset. Unmatched `)` offsets are
/// returned separately.
fn paren_pairs(line: &str) -> (Vec<(usize, usize)>, Vec<usize>) {
    let mut open = Vec::new();
    let mut pairs = Vec::new();
    let mut stray = Vec::new();
    for (i, c) in line.char_indices() {
        match c {
            '(' => open.push(i),
            ')' => match open.pop() {
                Some(start) => pairs.push((start, i)),
                None => stray.push(i),
            },
            _ => {}
        }
    }
    stray.extend(open);
    (pairs, stray)
}

struct ParenHighlighter;

impl Highlighter for ParenHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let (pairs, stray) = paren_pairs(line);
        if pairs.is_empty() && stray.is_empty() {
            return Cow::Borrowed(line);
        }
        // The pair touching the cursor is shown in blue
        let active = pairs
            .iter()
            .find(|(open, close)| {
                [*open, *close]
                    .iter()
                    .any(|&p| p == pos || p + 1 == pos)
            })
            .copied();

        let mut highlighted = String::with_capacity(line.len() + 16);
        for (i, c) in line.char_indices() {
            if stray.contains(&i) {
                highlighted.push_str(&format!("\x1b[1;31m{}\x1b[0m", c)); // Red for unmatched
            } else if active.is_some_and(|(open, close)| i == open || i == close) {
                highlighted.push_str(&format!("\x1b[1;34m{}\x1b[0m", c)); // Blue for matching
            } else {
                highlighted.push(c);
            }
        }
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn evaluate_line(line: &str, env: &Rc<RefCell<Environment>>) {
    match parse_str(line) {
        Ok(node) => match evaluate(node, env.clone()) {
            Ok(result_node) => {
                if result_node.kind != Sexpr::Void {
                    println!("{}", result_node);
                }
            }
            Err(e) => {
                if e.pretty_print(line).is_err() {
                    eprintln!("{}", e);
                }
            }
        },
        Err(parse_err) => {
            if parse_err.pretty_print(line).is_err() {
                eprintln!("{}", parse_err);
            }
        }
    }
}

fn run(args: Args) -> rustyline::Result<()> {
    println!("minilisp v{}", env!("CARGO_PKG_VERSION"));
    println!("Press Ctrl-D to quit.");

    set_max_depth(args.max_depth);
    let global_env = Environment::new_global_populated();
    let h = ReplHelper {
        highlighter: ParenHighlighter,
        validator: ParenValidator,
        completer: LispCompleter::new(global_env.clone()),
    };
    let edit_mode = if args.vi { EditMode::Vi } else { EditMode::Emacs };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .auto_add_history(false)
        .build();
    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if !args.no_history && rl.load_history(&args.history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline(&args.prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str())?;
                evaluate_line(&line, &global_env);
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C drops the current line
                println!("Interrupted. Press Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!();
                break;
            }
            Err(err) => return Err(err),
        }
    }
    if args.no_history {
        Ok(())
    } else {
        rl.save_history(&args.history)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let stack_size = args.stack_size.saturating_mul(1024 * 1024);
    let repl = thread::Builder::new()
        .name("repl".to_string())
        .stack_size(stack_size)
        .spawn(move || run(args));

    match repl.map(|handle| handle.join()) {
        Ok(Ok(Ok(()))) => ExitCode::SUCCESS,
        Ok(Ok(Err(err))) => {
            eprintln!("Readline Error: {:?}", err);
            ExitCode::FAILURE
        }
        Ok(Err(_)) => ExitCode::FAILURE, // The thread panicked and already reported it
        Err(err) => {
            eprintln!("Could not start the interpreter thread: {}", err);
            ExitCode::FAILURE
        }
    }
}
