use crate::ast::Name;
use crate::error::{LoxError, Result};
use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One lexical scope frame.  Frames are shared (`Rc<RefCell<_>>`) because a
/// closure keeps its declaring frame alive after the block that made it exits.
/// Links only point outward, so frames never form cycles among themselves.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// A global (outermost) frame.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap in the shared handle the interpreter passes around.
    pub fn shared(self) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(self))
    }

    pub fn enclosing(&self) -> Option<Rc<RefCell<Environment>>> {
        self.enclosing.clone()
    }

    /// Names bound directly in this frame.
    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Bind `name` in this frame.  Redefinition overwrites.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Name lookup walking outward; used for globals.
    pub fn get(&self, name: &Name) -> Result<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    /// Assignment walking outward; the name must already exist somewhere.
    pub fn assign(&mut self, name: &Name, value: Value) -> Result<()> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }

    /// The frame exactly `distance` enclosing links out from `env`.
    pub fn ancestor(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
    ) -> Option<Rc<RefCell<Environment>>> {
        let mut frame: Rc<RefCell<Environment>> = Rc::clone(env);

        for _ in 0..distance {
            let next = frame.borrow().enclosing.clone()?;
            frame = next;
        }

        Some(frame)
    }

    /// Read `name` from the frame `distance` links out, and only from it.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &Name) -> Result<Value> {
        debug!("get_at distance={} name={}", distance, name.lexeme);

        let frame = Self::ancestor(env, distance).ok_or_else(|| undefined(name))?;
        let value: Option<Value> = frame.borrow().values.get(&name.lexeme).cloned();

        value.ok_or_else(|| undefined(name))
    }

    /// Write `name` in the frame `distance` links out, and only in it.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &Name,
        value: Value,
    ) -> Result<()> {
        debug!("assign_at distance={} name={}", distance, name.lexeme);

        let frame = Self::ancestor(env, distance).ok_or_else(|| undefined(name))?;
        frame.borrow_mut().define(&name.lexeme, value);

        Ok(())
    }
}

fn undefined(name: &Name) -> LoxError {
    LoxError::runtime(name.line, format!("Undefined variable '{}'", name.lexeme))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::new(s, 1)
    }

    #[test]
    fn get_walks_outward() {
        let globals = Environment::new().shared();
        globals.borrow_mut().define("a", Value::Number(1.0));
        let inner = Environment::with_enclosing(Rc::clone(&globals));

        assert_eq!(inner.get(&name("a")).ok(), Some(Value::Number(1.0)));
    }

    #[test]
    fn assign_to_missing_name_fails() {
        let mut env = Environment::new();
        let err = env.assign(&name("nope"), Value::Nil).unwrap_err();

        assert_eq!(err.message(), "Undefined variable 'nope'");
    }

    #[test]
    fn get_at_reads_only_the_target_frame() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("x", Value::Number(1.0));
        let inner = Environment::with_enclosing(Rc::clone(&outer)).shared();
        inner.borrow_mut().define("x", Value::Number(2.0));

        assert_eq!(
            Environment::get_at(&inner, 0, &name("x")).ok(),
            Some(Value::Number(2.0))
        );
        assert_eq!(
            Environment::get_at(&inner, 1, &name("x")).ok(),
            Some(Value::Number(1.0))
        );
        assert!(Environment::get_at(&outer, 1, &name("x")).is_err());
    }

    #[test]
    fn assign_at_does_not_touch_other_frames() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("x", Value::Number(1.0));
        let inner = Environment::with_enclosing(Rc::clone(&outer)).shared();
        inner.borrow_mut().define("x", Value::Number(2.0));

        Environment::assign_at(&inner, 1, &name("x"), Value::Number(9.0)).unwrap();

        assert_eq!(
            outer.borrow().get(&name("x")).ok(),
            Some(Value::Number(9.0))
        );
        assert_eq!(
            Environment::get_at(&inner, 0, &name("x")).ok(),
            Some(Value::Number(2.0))
        );
    }

    #[test]
    fn redefinition_overwrites() {
        let mut env = Environment::new();
        env.define("a", Value::Number(1.0));
        env.define("a", Value::Bool(true));

        assert_eq!(env.get(&name("a")).ok(), Some(Value::Bool(true)));
    }
}
