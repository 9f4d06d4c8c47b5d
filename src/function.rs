//! Callable runtime objects: host‑provided natives and Lox closures.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{FunctionDecl, Name};
use crate::class::LoxInstance;
use crate::environment::Environment;
use crate::error::Result;
use crate::interpreter::{InterpretError, Interpreter};
use crate::value::Value;

/// Body of a native function.  Errors are plain messages; the interpreter
/// attaches the call's line.
pub type NativeFn = fn(&[Value]) -> std::result::Result<Value, String>;

/// A host‑provided primitive with a fixed name and arity.
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new<S: Into<String>>(name: S, arity: usize, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            arity,
            func,
        }
    }

    pub fn call(&self, arguments: &[Value]) -> std::result::Result<Value, String> {
        debug!("Calling native function '{}'", self.name);
        (self.func)(arguments)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// `clock()`: seconds since the Unix epoch.
pub fn clock(_args: &[Value]) -> std::result::Result<Value, String> {
    let millis: i64 = chrono::Utc::now().timestamp_millis();

    Ok(Value::Number(millis as f64 / 1000.0))
}

/// A Lox function or method: its declaration plus the frame that was current
/// when the declaration executed.
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// A copy of this method whose closure defines `this` as `instance`.
    pub fn bind(&self, instance: Rc<RefCell<LoxInstance>>) -> LoxFunction {
        let mut env = Environment::with_enclosing(Rc::clone(&self.closure));
        env.define("this", Value::Instance(instance));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: env.shared(),
            is_initializer: self.is_initializer,
        }
    }

    /// Run the body in a fresh frame parented to the closure (never to the
    /// caller's frame).  Arity has already been checked by the caller.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!("Calling user-defined function '{}'", self.name());

        let mut env = Environment::with_enclosing(Rc::clone(&self.closure));

        for (param, value) in self.declaration.params.iter().zip(arguments) {
            env.define(&param.lexeme, value);
        }

        let returned: Value = match interpreter.execute_block(&self.declaration.body, env.shared()) {
            Ok(()) => Value::Nil,
            Err(InterpretError::ReturnSignal(value)) => value,
            Err(InterpretError::Runtime(e)) => return Err(e),
        };

        if self.is_initializer {
            let this = Name::new("this", self.declaration.name.line);
            return Environment::get_at(&self.closure, 0, &this);
        }

        info!("Function '{}' returned: {}", self.name(), returned);

        Ok(returned)
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}
