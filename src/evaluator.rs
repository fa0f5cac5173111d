use crate::environment::{EnvError, Environment};
use crate::number::NumberError;
use crate::source::Span;
use crate::types::{Lambda, Node, Procedure, Sexpr};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    EnvError(#[from] EnvError), // Errors from environment lookup
    #[error("Evaluation Error: Expected a procedure, but got: {0}")]
    NotAProcedure(Sexpr, Span), // Tried to call something that isn't a procedure
    #[error("Evaluation Error: Invalid arguments - {0}")]
    InvalidArguments(String, Span), // Wrong number of arguments or bad argument value
    #[error("Evaluation Error: Expected {expected}, found {}", .found.type_name())]
    TypeMismatch {
        expected: String,
        found: Sexpr,
        span: Span,
    },
    #[error("Evaluation Error: Index out of range - {0}")]
    IndexError(String, Span), // car/cdr of (), begin with no arguments
    #[error("Evaluation Error: Expected a symbol, but got: {0}")]
    NotASymbol(Sexpr, Span), // Expected a symbol (e.g., for define/set!)
    #[error("Evaluation Error: Invalid special form - {0}")]
    InvalidSpecialForm(String, Span), // Malformed special form (e.g., (if cond))
    #[error("Arithmetic Error: {source}")]
    Arithmetic { source: NumberError, span: Span },
    #[error("Stack overflow: evaluation nested deeper than {limit} levels")]
    StackOverflow { limit: usize, span: Span },
}

impl EvalError {
    /// The source location the error refers to.
    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(EnvError::UnboundVariable(_, span))
            | EvalError::NotAProcedure(_, span)
            | EvalError::InvalidArguments(_, span)
            | EvalError::TypeMismatch { span, .. }
            | EvalError::IndexError(_, span)
            | EvalError::NotASymbol(_, span)
            | EvalError::InvalidSpecialForm(_, span)
            | EvalError::Arithmetic { span, .. }
            | EvalError::StackOverflow { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Node> = Result<T, EvalError>;

pub const SPECIAL_FORMS: [&str; 5] = ["quote", "if", "define", "set!", "lambda"];

pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|s| s.to_string()).collect()
}

// --- Recursion depth limit ---

// Small enough that hitting the limit fails cleanly on an 8 MiB main thread
// stack in an unoptimized build.
pub const DEFAULT_MAX_DEPTH: usize = 1_000;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static MAX_DEPTH: Cell<usize> = const { Cell::new(DEFAULT_MAX_DEPTH) };
}

/// Sets how deeply `evaluate` may nest on the current thread before failing
/// with `EvalError::StackOverflow`.
pub fn set_max_depth(limit: usize) {
    MAX_DEPTH.with(|max| max.set(limit));
}

pub fn max_depth() -> usize {
    MAX_DEPTH.with(Cell::get)
}

// Counts one level of evaluation for as long as it is alive.
struct DepthGuard;

impl DepthGuard {
    fn enter(span: Span) -> EvalResult<DepthGuard> {
        let limit = max_depth();
        DEPTH.with(|depth| {
            if depth.get() >= limit {
                Err(EvalError::StackOverflow { limit, span })
            } else {
                depth.set(depth.get() + 1);
                Ok(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

// --- Evaluate Function ---

/// Evaluates a given AST Node within the specified environment.
pub fn evaluate(node: Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    let _depth = DepthGuard::enter(node.span)?;

    match &node.kind {
        // 1. Symbols: Look up in the environment
        Sexpr::Symbol(name) => Ok(env.borrow().get(name, node.span)?),

        // 2. Lists: special forms or procedure calls
        Sexpr::List(elements) => {
            let elements = Rc::clone(elements);
            match elements.split_first() {
                // The empty list evaluates to itself
                None => Ok(node),
                Some((first, rest)) => match &first.kind {
                    Sexpr::Symbol(sym_name) if sym_name == "quote" => {
                        evaluate_quote(rest, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "if" => {
                        evaluate_if(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "define" => {
                        evaluate_define(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "set!" => {
                        evaluate_set(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "lambda" => {
                        evaluate_lambda(rest, env, node.span)
                    }
                    _ => evaluate_procedure(first, rest, env, node.span),
                },
            }
        }

        // 3. Everything else is self-evaluating
        Sexpr::Number(_) | Sexpr::Bool(_) | Sexpr::Procedure(_) | Sexpr::Void => Ok(node),
    }
}

fn evaluate_procedure(
    operator: &Node,
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    // 1. Evaluate the operator, then the operands left to right
    let operator_result_node = evaluate(operator.clone(), env.clone())?;

    let mut evaluated_args: Vec<Node> = Vec::with_capacity(operands.len());
    for operand_node in operands {
        evaluated_args.push(evaluate(operand_node.clone(), env.clone())?);
    }

    // 2. Check that the operator is a procedure
    match operator_result_node.kind {
        Sexpr::Procedure(procedure) => apply_procedure(&procedure, evaluated_args, span),
        other => Err(EvalError::NotAProcedure(other, operator.span)),
    }
}

/// Calls `procedure` with already evaluated arguments. `span` is the span of
/// the call, used for errors raised by primitives.
pub fn apply_procedure(procedure: &Procedure, args: Vec<Node>, span: Span) -> EvalResult {
    match procedure {
        Procedure::Primitive(func, _) => func(args, span),
        Procedure::Lambda(lambda) => {
            let call_env = Environment::with_bindings(&lambda.params, args, lambda.env.clone());
            evaluate(lambda.body.clone(), call_env)
        }
    }
}

fn evaluate_quote(operands: &[Node], span: Span) -> EvalResult {
    if let [node] = operands {
        Ok(node.clone())
    } else {
        Err(EvalError::InvalidSpecialForm(
            "quote expects exactly one argument".to_string(),
            span, // Use the span of the whole (quote ...) form
        ))
    }
}

fn evaluate_if(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [condition, consequent, alternate] = operands {
        let condition_result = evaluate(condition.clone(), env.clone())?;
        if condition_result.kind.is_truthy() {
            evaluate(consequent.clone(), env)
        } else {
            evaluate(alternate.clone(), env)
        }
    } else {
        Err(EvalError::InvalidSpecialForm(
            "if expects a condition, a consequent and an alternate".to_string(),
            span,
        ))
    }
}

fn expect_symbol(node: &Node) -> EvalResult<&String> {
    match &node.kind {
        Sexpr::Symbol(name) => Ok(name),
        other => Err(EvalError::NotASymbol(other.clone(), node.span)),
    }
}

fn evaluate_define(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value.clone(), env.clone())?;
        env.borrow_mut().define(name.clone(), value);
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "define expects a symbol and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_set(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value.clone(), env.clone())?;
        Environment::set(&env, name, value, target.span)?;
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "set! expects a symbol and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_lambda(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [params, body] = operands {
        let params = match &params.kind {
            Sexpr::List(params) => params
                .iter()
                .map(|param| expect_symbol(param).cloned())
                .collect::<EvalResult<Vec<String>>>()?,
            _ => {
                return Err(EvalError::InvalidSpecialForm(
                    "lambda parameters must be a list of symbols".to_string(),
                    params.span,
                ));
            }
        };
        let lambda = Lambda {
            params,
            body: body.clone(),
            env,
        };
        Ok(Node::new(Sexpr::Procedure(Procedure::Lambda(Rc::new(lambda))), span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "lambda expects a parameter list and a single body expression".to_string(),
            span,
        ))
    }
}
