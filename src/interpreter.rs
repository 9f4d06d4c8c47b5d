use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info};
use thiserror::Error;

use crate::ast::{BinaryOp, Expr, ExprId, LiteralValue, LogicalOp, Name, Stmt, UnaryOp};
use crate::class::{LoxClass, LoxInstance};
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::function::{self, LoxFunction, NativeFn, NativeFunction};
use crate::resolver::Locals;
use crate::value::Value;

/// Why execution of a statement stopped early.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error(transparent)]
    Runtime(#[from] LoxError),

    /// Unwinds to the nearest enclosing call; never escapes one.
    #[error("Return signal with value: {0}")]
    ReturnSignal(Value),
}

/// Convenient alias for interpreter results.
pub type IResult<T> = std::result::Result<T, InterpretError>;

/// Deepest chain of nested Lox calls before the run is aborted.
pub const MAX_CALL_DEPTH: usize = 4096;

/// Run `f` with enough native stack for one more level of tree walking,
/// growing onto the heap when the red zone is reached.
#[inline]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    const RED_ZONE: usize = 128 * 1024;
    const STACK_PER_GROWTH: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_GROWTH, f)
}

/// Tree‑walking evaluator.  Holds the global frame, the frame currently in
/// effect, the resolver's distance table and the output sink for `print`.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: Locals,
    output: Box<dyn Write>,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout, with `clock` defined.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Creates a new Interpreter whose `print` output goes to `output`.
    pub fn with_output<W: Write + 'static>(output: W) -> Self {
        info!("Initializing Interpreter");

        let globals = Environment::new().shared();

        let mut interpreter = Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output: Box::new(output),
            call_depth: 0,
        };

        interpreter.define_native("clock", 0, function::clock);

        interpreter
    }

    /// Pre‑populate the global frame with a host callable.
    pub fn define_native(&mut self, name: &str, arity: usize, func: NativeFn) {
        debug!("Defining native function '{}'", name);

        let native = NativeFunction::new(name, arity, func);

        self.globals
            .borrow_mut()
            .define(name, Value::NativeFunction(Rc::new(native)));
    }

    /// Names currently defined in the global frame.
    pub fn global_names(&self) -> Vec<String> {
        self.globals.borrow().names()
    }

    /// Merge a resolution table produced by the resolver.
    pub fn resolve(&mut self, locals: Locals) {
        debug!("Recording {} resolved local(s)", locals.len());

        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program").  The first runtime
    /// error stops the run.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}
                Err(InterpretError::Runtime(e)) => {
                    debug!("Runtime error: {}", e);
                    return Err(e);
                }
                // `return` outside a function is rejected by the resolver.
                Err(InterpretError::ReturnSignal(_)) => {
                    debug!("Discarding top-level return");
                }
            }
        }

        info!("Interpretation completed successfully");

        Ok(())
    }

    /// Evaluate a standalone expression (the `evaluate` command).
    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value> {
        match self.evaluate(expr) {
            Ok(value) => Ok(value),
            Err(InterpretError::Runtime(e)) => Err(e),
            Err(InterpretError::ReturnSignal(value)) => Ok(value),
        }
    }

    // ───────────────────────────── statements ──────────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> IResult<()> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> IResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                debug!("Printing value: {}", value);
                writeln!(self.output, "{}", value).map_err(LoxError::from)?;
                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(())
            }

            Stmt::Block(statements) => {
                let env = Environment::with_enclosing(Rc::clone(&self.environment));
                self.execute_block(statements, env.shared())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);
                // The closure is the frame current at declaration time.
                let function =
                    LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                self.environment
                    .borrow_mut()
                    .define(&decl.name.lexeme, Value::Function(Rc::new(function)));
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                Err(InterpretError::ReturnSignal(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass: Option<Rc<LoxClass>> = match superclass {
                    Some(var) => match self.look_up_variable(var.id, &var.name)? {
                        Value::Class(class) => Some(class),
                        _ => {
                            return Err(LoxError::runtime(
                                var.name.line,
                                "Superclass must be a class",
                            )
                            .into())
                        }
                    },
                    None => None,
                };

                self.environment
                    .borrow_mut()
                    .define(&name.lexeme, Value::Nil);

                // Methods of a subclass close over a frame binding `super`.
                let enclosing: Option<Rc<RefCell<Environment>>> = superclass.as_ref().map(|sc| {
                    let previous = Rc::clone(&self.environment);
                    let mut env = Environment::with_enclosing(Rc::clone(&previous));
                    env.define("super", Value::Class(Rc::clone(sc)));
                    self.environment = env.shared();
                    previous
                });

                let methods: HashMap<String, Rc<LoxFunction>> = methods
                    .iter()
                    .map(|decl| {
                        let is_init = decl.name.lexeme == "init";
                        let function = LoxFunction::new(
                            Rc::clone(decl),
                            Rc::clone(&self.environment),
                            is_init,
                        );
                        (decl.name.lexeme.clone(), Rc::new(function))
                    })
                    .collect();

                let class = LoxClass::new(name.lexeme.clone(), superclass, methods);

                if let Some(previous) = enclosing {
                    self.environment = previous;
                }

                debug!("Defined class '{}'", name.lexeme);

                self.environment
                    .borrow_mut()
                    .assign(name, Value::Class(Rc::new(class)))?;
                Ok(())
            }
        }
    }

    /// Run `statements` with `env` as the current frame, restoring the
    /// previous frame on every exit path.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Rc<RefCell<Environment>>,
    ) -> IResult<()> {
        let previous = mem::replace(&mut self.environment, env);

        let result = statements.iter().try_for_each(|stmt| self.execute(stmt));

        self.environment = previous;

        result
    }

    // ───────────────────────────── expressions ─────────────────────────────

    fn evaluate(&mut self, expr: &Expr) -> IResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> IResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary {
                operator,
                line,
                right,
            } => {
                let right = self.evaluate(right)?;
                self.evaluate_unary(*operator, *line, right)
            }

            Expr::Binary {
                left,
                operator,
                line,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(evaluate_binary(*operator, *line, left, right)?)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let short_circuit = match operator {
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::And => !left.is_truthy(),
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable(var) => Ok(self.look_up_variable(var.id, &var.name)?),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::assign_at(&self.environment, distance, name, value.clone())?
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                line,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut values = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    values.push(self.evaluate(arg)?);
                }

                Ok(self.call_value(callee, values, *line)?)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Ok(LoxInstance::get(&instance, name)?),
                _ => Err(LoxError::runtime(name.line, "Only instances have properties").into()),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(name.line, "Only instances have fields").into());
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());

                Ok(value)
            }

            Expr::This { id, keyword } => Ok(self.look_up_variable(*id, keyword)?),

            Expr::Super {
                id,
                keyword,
                method,
            } => Ok(self.evaluate_super(*id, keyword, method)?),
        }
    }

    fn evaluate_unary(&mut self, operator: UnaryOp, line: usize, right: Value) -> IResult<Value> {
        match operator {
            UnaryOp::Not => Ok(Value::Bool(!right.is_truthy())),
            UnaryOp::Negate => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(line, "Operand must be a number").into()),
            },
        }
    }

    /// `super.method`: look the method up starting at the superclass bound
    /// when the enclosing class was declared, and bind it to the current `this`.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Name, method: &Name) -> Result<Value> {
        let distance: usize = *self.locals.get(&id).ok_or_else(|| {
            LoxError::runtime(keyword.line, "Can't use 'super' outside of a class")
        })?;

        let superclass = match Environment::get_at(&self.environment, distance, keyword)? {
            Value::Class(class) => class,
            _ => return Err(LoxError::runtime(keyword.line, "Superclass must be a class")),
        };

        // `this` lives in the frame just inside the one holding `super`.
        let this = Name::new("this", keyword.line);
        let instance = match Environment::get_at(&self.environment, distance.saturating_sub(1), &this)? {
            Value::Instance(instance) => instance,
            _ => return Err(LoxError::runtime(keyword.line, "Only instances have properties")),
        };

        let function = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                method.line,
                format!("Undefined property '{}'", method.lexeme),
            )
        })?;

        Ok(Value::Function(Rc::new(function.bind(instance))))
    }

    fn look_up_variable(&self, id: ExprId, name: &Name) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => self.globals.borrow().get(name),
        }
    }

    /// Invokes a callable (native function, Lox function or class).
    fn call_value(&mut self, callee: Value, arguments: Vec<Value>, line: usize) -> Result<Value> {
        match callee {
            Value::NativeFunction(native) => {
                check_arity(native.arity, arguments.len(), line)?;
                let result = native
                    .call(&arguments)
                    .map_err(|msg| LoxError::runtime(line, msg))?;
                info!("Native function '{}' returned: {}", native.name, result);
                Ok(result)
            }

            Value::Function(function) => {
                check_arity(function.arity(), arguments.len(), line)?;
                self.enter_call(line)?;
                let result = function.call(self, arguments);
                self.call_depth -= 1;
                result
            }

            Value::Class(class) => {
                check_arity(class.arity(), arguments.len(), line)?;
                self.enter_call(line)?;
                let result = LoxClass::instantiate(&class, self, arguments);
                self.call_depth -= 1;
                result
            }

            other => {
                debug!("Attempted to call a {}", other.type_name());
                Err(LoxError::runtime(line, "Can only call functions and classes"))
            }
        }
    }

    /// Count one more active Lox call; the caller decrements when it returns.
    fn enter_call(&mut self, line: usize) -> Result<()> {
        if self.call_depth >= MAX_CALL_DEPTH {
            debug!("Call depth limit {} reached", MAX_CALL_DEPTH);
            return Err(LoxError::runtime(line, "Stack overflow"));
        }

        self.call_depth += 1;

        Ok(())
    }
}

fn check_arity(expected: usize, got: usize, line: usize) -> Result<()> {
    if expected != got {
        return Err(LoxError::runtime(
            line,
            format!("Expected {} arguments but got {}", expected, got),
        ));
    }

    Ok(())
}

fn evaluate_binary(operator: BinaryOp, line: usize, left: Value, right: Value) -> Result<Value> {
    use Value::{Bool, Number};

    let numbers = |f: fn(f64, f64) -> Value| match (&left, &right) {
        (Number(a), Number(b)) => Ok(f(*a, *b)),
        _ => Err(LoxError::runtime(line, "Operands must be numbers")),
    };

    match operator {
        BinaryOp::Add => match (&left, &right) {
            (Number(a), Number(b)) => Ok(Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(LoxError::runtime(
                line,
                "Operands must be two numbers or two strings",
            )),
        },
        BinaryOp::Subtract => numbers(|a, b| Number(a - b)),
        BinaryOp::Multiply => numbers(|a, b| Number(a * b)),
        BinaryOp::Divide => numbers(|a, b| Number(a / b)),
        BinaryOp::Greater => numbers(|a, b| Bool(a > b)),
        BinaryOp::GreaterEqual => numbers(|a, b| Bool(a >= b)),
        BinaryOp::Less => numbers(|a, b| Bool(a < b)),
        BinaryOp::LessEqual => numbers(|a, b| Bool(a <= b)),
        BinaryOp::Equal => Ok(Bool(left == right)),
        BinaryOp::NotEqual => Ok(Bool(left != right)),
    }
}
