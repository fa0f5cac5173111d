use crate::source::Span;
use crate::types::{Node, PrimitiveFunc, Procedure, Sexpr};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String, Span), // Symbol name, span where lookup happened
}

// --- Environment Definition ---

pub struct Environment {
    // Use Rc<RefCell<...>> to allow shared ownership and interior mutability.
    // Needed for closures capturing environments and for 'set!'.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Node>, // Maps variable names to Nodes
}

impl Environment {
    /// Creates a new, top-level (root) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
        }))
    }

    /// Creates a root environment holding the standard library.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new(); // Create empty global env
        crate::primitives::register(&mut env_ptr.borrow_mut());
        env_ptr
    }

    /// Creates an enclosed environment binding `params` to `args` by
    /// position. Extra parameters or extra arguments are dropped.
    pub fn with_bindings(
        params: &[String],
        args: Vec<Node>,
        outer_env: Rc<RefCell<Environment>>,
    ) -> Rc<RefCell<Self>> {
        let bindings = params.iter().cloned().zip(args).collect();
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings,
        }))
    }

    /// Defines a variable in the *current* environment frame.
    /// Replaces the value if the variable already exists in this frame.
    pub fn define(&mut self, name: String, value_node: Node) {
        self.bindings.insert(name, value_node);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    /// `lookup_span` is the location where the variable was referenced, used for error reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Node, EnvError> {
        if let Some(value_node) = self.bindings.get(name) {
            Ok(value_node.clone())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name, lookup_span),
                None => Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
            }
        }
    }

    /// Returns the innermost environment, starting at `env` itself, whose own
    /// frame binds `name`.
    pub fn find(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        lookup_span: Span,
    ) -> Result<Rc<RefCell<Environment>>, EnvError> {
        let mut current = env.clone();
        loop {
            if current.borrow().bindings.contains_key(name) {
                return Ok(current);
            }
            let outer = current.borrow().outer.clone();
            match outer {
                Some(outer_env_ptr) => current = outer_env_ptr,
                None => return Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
            }
        }
    }

    /// Overwrites an *existing* binding in the frame `find` returns. Errors if
    /// the variable is not defined. `set_span` is the location of the target.
    pub fn set(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value_node: Node,
        set_span: Span,
    ) -> Result<(), EnvError> {
        let frame = Environment::find(env, name, set_span)?;
        frame.borrow_mut().define(name.to_string(), value_node);
        Ok(())
    }

    /// Helper to add a primitive procedure to the environment.
    pub fn add_primitive<F>(&mut self, name: &str, func: F)
    where
        F: Fn(Vec<Node>, Span) -> crate::evaluator::EvalResult + 'static,
    {
        let node = Node::new_primitive(func, name, Span::default());
        self.define(name.to_string(), node);
    }

    /// Binds `alias` to the very same primitive object as `name`, so the two
    /// are `eq?`.
    pub fn add_alias(&mut self, alias: &str, func: &PrimitiveFunc) {
        let node = Node::new(
            Sexpr::Procedure(Procedure::Primitive(func.clone(), alias.to_string())),
            Span::default(),
        );
        self.define(alias.to_string(), node);
    }

    /// Helper to bind a constant value.
    pub fn add_constant(&mut self, name: &str, value: Sexpr) {
        self.define(name.to_string(), Node::new(value, Span::default()));
    }

    fn add_identifiers(&self, mut identifiers: HashSet<String>) -> HashSet<String> {
        for identifier in self.bindings.keys() {
            identifiers.insert(identifier.to_string());
        }
        match self.outer {
            Some(ref outer_env_ptr) => outer_env_ptr.borrow().add_identifiers(identifiers),
            None => identifiers,
        }
    }

    /// Gets a list of all identifiers visible from the current environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        self.add_identifiers(HashSet::new())
    }
}

// Bindings may hold closures that capture this very environment, so only
// the names are shown.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    // Helper to create a dummy node with default span
    fn num_node(n: i64) -> Node {
        Node::new_number(n, Span::default())
    }

    fn sym_node(s: &str) -> Node {
        Node::new_symbol(s.to_string(), Span::default())
    }

    fn enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Environment::with_bindings(&[], Vec::new(), outer)
    }

    #[test]
    fn test_define_and_get_global() {
        let env = Environment::new();
        env.borrow_mut().define("x".to_string(), num_node(10));

        let result = env.borrow().get("x", Span::default());
        assert_eq!(result, Ok(num_node(10)));
    }

    #[test]
    fn test_get_unbound_global() {
        let env = Environment::new();
        let result = env.borrow().get("y", Span::default());
        assert!(matches!(result, Err(EnvError::UnboundVariable(s, _)) if s == "y"));
    }

    #[test]
    fn test_define_and_get_enclosed() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num_node(10));

        let local_env = enclosed(global_env);
        local_env.borrow_mut().define("y".to_string(), num_node(20));

        assert_eq!(local_env.borrow().get("y", Span::default()), Ok(num_node(20)));
        assert_eq!(local_env.borrow().get("x", Span::default()), Ok(num_node(10)));
    }

    #[test]
    fn test_get_unbound_enclosed() {
        let global_env = Environment::new();
        let local_env = enclosed(global_env);

        let span = Span::new(11, 12);
        let result = local_env.borrow().get("z", span);
        assert_eq!(
            result,
            Err(EnvError::UnboundVariable("z".to_string(), span))
        );
    }

    #[test]
    fn test_shadowing() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num_node(10));

        let local_env = enclosed(global_env.clone());
        local_env.borrow_mut().define("x".to_string(), num_node(50)); // Shadow global x

        let inner_local_env = enclosed(local_env.clone());
        inner_local_env
            .borrow_mut()
            .define("y".to_string(), sym_node("y-value"));

        assert_eq!(
            inner_local_env.borrow().get("x", Span::default()).unwrap(),
            num_node(50)
        );
        assert_eq!(
            inner_local_env.borrow().get("y", Span::default()).unwrap(),
            sym_node("y-value")
        );
        assert_eq!(
            global_env.borrow().get("x", Span::default()).unwrap(),
            num_node(10)
        );
    }

    #[test]
    fn test_with_bindings_truncates() {
        let root = Environment::new();
        let params = vec!["a".to_string(), "b".to_string()];

        let short_args = Environment::with_bindings(&params, vec![num_node(1)], root.clone());
        assert_eq!(short_args.borrow().get("a", Span::default()), Ok(num_node(1)));
        assert!(short_args.borrow().get("b", Span::default()).is_err());

        let extra_args = Environment::with_bindings(
            &params,
            vec![num_node(1), num_node(2), num_node(3)],
            root,
        );
        assert_eq!(extra_args.borrow().get("b", Span::default()), Ok(num_node(2)));
        assert_eq!(extra_args.borrow().get_identifiers().len(), 2);
    }

    #[test]
    fn test_find_returns_defining_frame() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num_node(1));
        let middle = enclosed(global_env.clone());
        let inner = enclosed(middle.clone());

        let found = Environment::find(&inner, "x", Span::default()).unwrap();
        assert!(Rc::ptr_eq(&found, &global_env));

        inner.borrow_mut().define("x".to_string(), num_node(2));
        let found = Environment::find(&inner, "x", Span::default()).unwrap();
        assert!(Rc::ptr_eq(&found, &inner));
    }

    #[test]
    fn test_find_unbound_at_root() {
        let root = Environment::new();
        let span = Span::new(3, 4);
        let result = Environment::find(&root, "missing", span);
        assert!(matches!(
            result,
            Err(EnvError::UnboundVariable(name, s)) if name == "missing" && s == span
        ));
    }

    #[test]
    fn test_set_updates_outer_frame() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num_node(1));
        let local_env = enclosed(global_env.clone());

        Environment::set(&local_env, "x", num_node(5), Span::default()).unwrap();
        assert!(!local_env.borrow().bindings.contains_key("x"));
        assert_eq!(global_env.borrow().get("x", Span::default()), Ok(num_node(5)));
    }

    #[test]
    fn test_set_stops_at_innermost_binding() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num_node(1));
        let middle = enclosed(global_env.clone());
        middle.borrow_mut().define("x".to_string(), num_node(2));
        let inner = enclosed(middle.clone());

        Environment::set(&inner, "x", num_node(3), Span::default()).unwrap();
        assert_eq!(middle.borrow().get("x", Span::default()), Ok(num_node(3)));
        assert_eq!(global_env.borrow().get("x", Span::default()), Ok(num_node(1)));
    }

    #[test]
    fn test_set_unbound_error() {
        let global_env = Environment::new();
        let local_env = enclosed(global_env);
        let result = Environment::set(&local_env, "nope", num_node(1), Span::default());
        assert!(matches!(result, Err(EnvError::UnboundVariable(s, _)) if s == "nope"));
    }

    #[test]
    fn test_get_identifiers_includes_outer() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("outer".to_string(), num_node(1));
        let local_env = enclosed(global_env);
        local_env.borrow_mut().define("inner".to_string(), num_node(2));

        let ids = local_env.borrow().get_identifiers();
        assert!(ids.contains("outer"));
        assert!(ids.contains("inner"));
    }
}
