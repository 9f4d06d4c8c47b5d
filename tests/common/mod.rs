#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rox::interpreter::Interpreter;
use rox::lox::{Lox, RunError};

/// Output sink that keeps everything `print` writes, shared with the test.
#[derive(Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("print output is UTF-8")
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_owned).collect()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fresh session whose output is captured.
pub fn session() -> (Lox, Capture) {
    let capture = Capture::default();
    let lox = Lox::with_interpreter(Interpreter::with_output(capture.clone()));
    (lox, capture)
}

/// Run `source` in a fresh session; returns printed lines and the outcome.
pub fn run(source: &str) -> (Vec<String>, Result<(), RunError>) {
    let (mut lox, capture) = session();
    let result = lox.run(source);
    (capture.lines(), result)
}

/// Run `source`, which must succeed, and return its printed lines.
pub fn run_ok(source: &str) -> Vec<String> {
    let (lines, result) = run(source);
    if let Err(e) = result {
        panic!("program failed: {}", e);
    }
    lines
}

/// Run `source`, which must fail at runtime; returns output so far and the
/// bare error message.
pub fn run_runtime_err(source: &str) -> (Vec<String>, String) {
    match run(source) {
        (lines, Err(RunError::Runtime(e))) => (lines, e.message()),
        (_, other) => panic!("expected runtime error, got {:?}", other),
    }
}

/// Run `source`, which must fail statically; returns the bare messages.
pub fn run_static_err(source: &str) -> Vec<String> {
    match run(source) {
        (lines, Err(RunError::Static(errors))) => {
            assert!(lines.is_empty(), "nothing may run after a static error");
            errors.iter().map(|e| e.message()).collect()
        }
        (_, other) => panic!("expected static errors, got {:?}", other),
    }
}
