//! Static pass between parsing and execution.
//!
//! Walks the tree once with a stack of block scopes, mapping each local
//! variable occurrence to the number of scopes between it and its
//! declaration.  Occurrences left out of the table are globals.  Closures
//! therefore see the binding that was in scope where they were written, even
//! if a same-named local is declared later in an enclosing block.
//!
//! The same walk enforces the rules a parser cannot: `return` placement,
//! `this`/`super` placement, self-inheritance, redeclaration and
//! self-reference in an initializer.  Every violation is collected.

use crate::ast::{Expr, ExprId, FunctionDecl, Name, Stmt, Variable};
use crate::error::LoxError;
use log::{debug, info};
use std::collections::HashMap;

/// Scope distance per resolved variable‑reference node.  Missing ⇒ global.
pub type Locals = HashMap<ExprId, usize>;

/// What kind of function body are we in?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

/// What kind of class body are we in?  Used to validate `this` / `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances (locals vs. globals) into a [`Locals`] table.
pub struct Resolver<'a> {
    scopes: Vec<HashMap<&'a str, bool>>, // value: initializer finished
    globals: HashMap<&'a str, bool>,     // only consulted for `var a = a;`
    current_function: FunctionType,
    current_class: ClassType,
    locals: Locals,
    errors: Vec<LoxError>,
}

impl<'a> Default for Resolver<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        info!("Resolver instantiated");

        Resolver {
            scopes: Vec::new(),
            globals: HashMap::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            locals: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// A resolver that already knows the names bound in the global frame,
    /// as when a REPL line follows earlier ones.
    pub fn with_globals<I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut resolver = Self::new();
        resolver
            .globals
            .extend(names.into_iter().map(|name| (name, true)));
        resolver
    }

    /// Walk all top‑level statements.  Yields the resolution table, or every
    /// static error found.
    pub fn resolve(mut self, statements: &'a [Stmt]) -> Result<Locals, Vec<LoxError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            info!("Resolved {} local reference(s)", self.locals.len());
            Ok(self.locals)
        } else {
            info!("Resolve pass found {} error(s)", self.errors.len());
            Err(self.errors)
        }
    }

    fn resolve_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // the name is visible *inside* its own body, for recursion
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer");
                    }

                    self.resolve_expr(expr);
                }
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &'a Name,
        superclass: Option<&'a Variable>,
        methods: &'a [std::rc::Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            if superclass.name.lexeme == name.lexeme {
                self.error(&superclass.name, "A class can't inherit from itself");
            }

            self.current_class = ClassType::Subclass;
            self.resolve_variable(superclass);

            // methods close over a scope holding `super`
            self.begin_scope();
            self.bind_implicit("super");
        }

        self.begin_scope();
        self.bind_implicit("this");

        for method in methods {
            let kind = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable(var) => self.resolve_variable(var),

            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            // properties are looked up dynamically: only the object resolves
            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class");
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'super' outside of a class");
                    }
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass");
                    }
                    ClassType::Subclass => {}
                }

                self.resolve_local(*id, keyword);
            }
        }
    }

    fn resolve_variable(&mut self, var: &'a Variable) {
        let name: &str = var.name.lexeme.as_str();

        let declared_only = match self.scopes.last() {
            Some(scope) => scope.get(name) == Some(&false),
            None => self.globals.get(name) == Some(&false),
        };

        if declared_only {
            self.error(
                &var.name,
                "Can't read local variable in its own initializer",
            );
        }

        self.resolve_local(var.id, &var.name);
    }

    /// Enter a fresh scope for a function’s parameters + body.  The body
    /// shares that scope, mirroring the single environment a call creates.
    fn resolve_function(&mut self, decl: &'a FunctionDecl, kind: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &'a Name) {
        let lexeme: &'a str = name.lexeme.as_str();

        let redeclared: bool = match self.scopes.last_mut() {
            Some(scope) => scope.insert(lexeme, false).is_some(),
            // Redeclaring a global is legal, and the initializer may read
            // the binding being replaced.
            None => {
                self.globals.entry(lexeme).or_insert(false);
                false
            }
        };

        if redeclared {
            self.error(name, "Already a variable with this name in this scope");
        }
    }

    fn define(&mut self, name: &'a Name) {
        let lexeme: &'a str = name.lexeme.as_str();

        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(lexeme, true);
            }
            None => {
                self.globals.insert(lexeme, true);
            }
        }
    }

    /// Bind `this` / `super` in the innermost scope.
    fn bind_implicit(&mut self, name: &'static str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, true);
        }
    }

    fn error(&mut self, name: &Name, message: &str) {
        debug!("Resolve error at '{}': {}", name.lexeme, message);

        self.errors
            .push(LoxError::resolve(name.line, &name.lexeme, message));
    }

    /// Innermost scope declaring `name` wins; no entry means global.
    fn resolve_local(&mut self, id: ExprId, name: &Name) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name.lexeme.as_str()) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.locals.insert(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
