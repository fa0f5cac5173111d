use crate::environment::Environment;
use crate::number::Number;
use crate::{evaluator::EvalResult, source::Span};
use std::cell::RefCell;
use std::fmt; // For custom display formatting
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Sexpr, // The actual S-expression data
    pub span: Span,  // The source span it covers
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_symbol(name: String, span: Span) -> Self {
        Node::new(Sexpr::Symbol(name), span)
    }

    pub fn new_number(n: impl Into<Number>, span: Span) -> Self {
        Node::new(Sexpr::Number(n.into()), span)
    }

    pub fn new_bool(b: bool, span: Span) -> Self {
        Node::new(Sexpr::Bool(b), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::List(Rc::new(elements)), span)
    }

    pub fn new_nil(span: Span) -> Self {
        Node::new_list(Vec::new(), span)
    }

    pub fn new_void(span: Span) -> Self {
        Node::new(Sexpr::Void, span)
    }

    pub fn new_primitive<F>(func: F, name: &str, span: Span) -> Self
    where
        F: Fn(Vec<Node>, Span) -> EvalResult + 'static,
    {
        Node::new(
            Sexpr::Procedure(Procedure::Primitive(Rc::new(func), name.to_string())),
            span,
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Sexpr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// A value of the language. Parsed source and runtime data share this type:
/// a `List` is a call form when evaluated and plain data when quoted.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Symbol(String),        // e.g., +, variable-name, quote
    Number(Number),        // 42, -1.5
    Bool(bool),            // result of comparisons and predicates
    List(Rc<Vec<Node>>),   // e.g., (+ 1 2), (define x 10), () when empty
    Procedure(Procedure),  // primitives and lambdas
    Void,                  // result of define, set! and print
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Symbol(_) => "symbol",
            Sexpr::Number(Number::Int(_)) => "integer",
            Sexpr::Number(Number::Float(_)) => "float",
            Sexpr::Bool(_) => "boolean",
            Sexpr::List(list) if list.is_empty() => "empty list",
            Sexpr::List(_) => "list",
            Sexpr::Procedure(_) => "procedure",
            Sexpr::Void => "void",
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Sexpr::Symbol(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Sexpr::Number(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Sexpr::List(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Sexpr::Procedure(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Sexpr::List(list) if list.is_empty())
    }

    /// `#f`, zero, the empty list and void are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Sexpr::Bool(b) => *b,
            Sexpr::Number(n) => n.is_truthy(),
            Sexpr::List(list) => !list.is_empty(),
            Sexpr::Void => false,
            Sexpr::Symbol(_) | Sexpr::Procedure(_) => true,
        }
    }

    /// Structural equality, ignoring source spans. Numbers compare by value
    /// regardless of exactness; procedures compare by identity.
    pub fn equal(&self, other: &Sexpr) -> bool {
        match (self, other) {
            (Sexpr::Symbol(a), Sexpr::Symbol(b)) => a == b,
            (Sexpr::Number(a), Sexpr::Number(b)) => a == b,
            (Sexpr::Bool(a), Sexpr::Bool(b)) => a == b,
            (Sexpr::List(a), Sexpr::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.kind.equal(&y.kind))
            }
            (Sexpr::Procedure(a), Sexpr::Procedure(b)) => a == b,
            (Sexpr::Void, Sexpr::Void) => true,
            _ => false,
        }
    }

    /// Identity comparison. Atoms are identical when they have the same
    /// value (and, for numbers, the same exactness); non-empty lists and
    /// procedures only when they are the same object.
    pub fn eqv(&self, other: &Sexpr) -> bool {
        match (self, other) {
            (Sexpr::Symbol(a), Sexpr::Symbol(b)) => a == b,
            (Sexpr::Number(a), Sexpr::Number(b)) => a.identical(*b),
            (Sexpr::Bool(a), Sexpr::Bool(b)) => a == b,
            (Sexpr::List(a), Sexpr::List(b)) => {
                (a.is_empty() && b.is_empty()) || Rc::ptr_eq(a, b)
            }
            (Sexpr::Procedure(a), Sexpr::Procedure(b)) => a == b,
            (Sexpr::Void, Sexpr::Void) => true,
            _ => false,
        }
    }
}

// Implement Display trait for printing values back as source text
impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(n) => write!(f, "{}", n),
            Sexpr::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexpr::List(list) => {
                write!(f, "(")?;
                let mut first = true;
                for expr in list.iter() {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", expr)?;
                    first = false;
                }
                write!(f, ")")
            }
            Sexpr::Procedure(procedure) => write!(f, "{}", procedure),
            Sexpr::Void => write!(f, "#<void>"),
        }
    }
}

pub type PrimitiveFunc = Rc<dyn Fn(Vec<Node>, Span) -> EvalResult>;

/// A user-defined procedure: parameter names, a single body expression and
/// the environment it was created in.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Clone)] // Need Clone for Sexpr::Procedure
pub enum Procedure {
    Primitive(PrimitiveFunc, String), // The host closure and its name (for display/debug)
    Lambda(Rc<Lambda>),
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "#<primitive:{}>", name),
            Procedure::Lambda(lambda) => write!(f, "#<lambda ({})>", lambda.params.join(" ")),
        }
    }
}

// The captured environment usually refers back to the procedure itself, so
// Debug must not descend into it.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            Procedure::Lambda(lambda) => {
                write!(f, "Lambda({:?} -> {})", lambda.params, lambda.body)
            }
        }
    }
}

// Procedures are equal only when they are the same object.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(f1, _), Procedure::Primitive(f2, _)) => Rc::ptr_eq(f1, f2),
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            _ => false,
        }
    }
}
