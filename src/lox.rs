//! Pipeline driver: source text → tokens → AST → resolution → execution.
//!
//! A [`Lox`] session owns one interpreter, so globals, functions and classes
//! defined by one [`Lox::run`] call stay visible to the next (REPL mode).
//! Error state does not carry over: each run starts clean.

use log::{debug, info};
use thiserror::Error;

use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;

/// Exit status conventionally used for static (compile‑time) failures.
pub const EXIT_STATIC_ERROR: i32 = 65;

/// Exit status conventionally used for runtime failures.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

/// Why a run did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    /// Lexical, syntax or resolution errors; nothing was executed.
    #[error("{}", render(.0))]
    Static(Vec<LoxError>),

    /// Execution started and stopped at the first runtime error.
    #[error(transparent)]
    Runtime(LoxError),
}

fn render(errors: &[LoxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl RunError {
    /// Every diagnostic carried by this failure.
    pub fn diagnostics(&self) -> &[LoxError] {
        match self {
            RunError::Static(errors) => errors,
            RunError::Runtime(error) => std::slice::from_ref(error),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Static(_) => EXIT_STATIC_ERROR,
            RunError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }
}

/// An interpreter session.
pub struct Lox {
    interpreter: Interpreter,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    /// A session printing to stdout.
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    /// A session around a preconfigured interpreter (custom output sink or
    /// extra natives).
    pub fn with_interpreter(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    /// Scan, parse, resolve and execute `source`.  Nothing executes if any
    /// static error was found.
    pub fn run(&mut self, source: &str) -> Result<(), RunError> {
        info!("Running {} bytes of source", source.len());

        let (tokens, mut errors) = Scanner::scan_all(source);

        let (statements, parse_errors) = Parser::new(&tokens).parse();
        errors.extend(parse_errors);

        if !errors.is_empty() {
            debug!("Stopping before resolution: {} static error(s)", errors.len());
            return Err(RunError::Static(errors));
        }

        // Globals from earlier runs are already initialized.
        let known_globals: Vec<String> = self.interpreter.global_names();

        let locals = Resolver::with_globals(known_globals.iter().map(String::as_str))
            .resolve(&statements)
            .map_err(RunError::Static)?;

        self.interpreter.resolve(locals);

        self.interpreter
            .interpret(&statements)
            .map_err(RunError::Runtime)
    }
}
