//! Runtime state for one invocation of generated code.
//!
//! A [`Context`] holds a bounded parameter stack, a heap of named values and
//! the records the code emits. Heap names are canonical (upper case), so
//! `p1` and `P1` address the same slot.
//!
//! Blocks open a frame with [`Context::enter`]. A variable declared in the
//! frame hides any outer binding of the same name until [`Context::leave`]
//! puts the outer value back.

use im::HashMap;

use crate::errors::{ErrorKind, SelError};
use crate::names::CanonicalName;
use crate::repository::Record;
use crate::types::Value;

pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct Context {
    stack: Vec<Value>,
    max_depth: usize,
    heap: HashMap<CanonicalName, Value>,
    /// Per open block, the bindings its declarations hid.
    frames: Vec<Vec<(CanonicalName, Option<Value>)>>,
    results: Vec<Record>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STACK_DEPTH)
    }
}

impl Context {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
            heap: HashMap::new(),
            frames: Vec::new(),
            results: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Stack
    // ------------------------------------------------------------------------

    pub fn push(&mut self, value: Value) -> Result<(), SelError> {
        if self.stack.len() >= self.max_depth {
            return Err(SelError::runtime(ErrorKind::StackOverflow {
                limit: self.max_depth,
            }));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, SelError> {
        self.stack
            .pop()
            .ok_or_else(|| SelError::runtime(ErrorKind::StackUnderflow))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    // ------------------------------------------------------------------------
    // Heap
    // ------------------------------------------------------------------------

    /// Adds `name`. Does nothing and returns `false` when it is already bound.
    pub fn add(&mut self, name: &str, value: Value) -> bool {
        let key = CanonicalName::new(name);
        if self.heap.contains_key(&key) {
            return false;
        }
        self.heap.insert(key, value);
        true
    }

    /// Rebinds `name`. Does nothing and returns `false` when it is unbound.
    pub fn replace(&mut self, name: &str, value: Value) -> bool {
        match self.heap.get_mut(&CanonicalName::new(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Binds `name`, whether or not it was bound before.
    pub fn bind(&mut self, name: &str, value: Value) {
        if !self.add(name, value.clone()) {
            self.replace(name, value);
        }
    }

    /// Unbinds `name`; `false` when it was not bound.
    pub fn remove(&mut self, name: &str) -> bool {
        self.heap.remove(&CanonicalName::new(name)).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.heap.get(&CanonicalName::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    // ------------------------------------------------------------------------
    // Block frames
    // ------------------------------------------------------------------------

    pub fn enter(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Binds a variable declared in the innermost open block. Whatever the
    /// name held before comes back on [`Context::leave`].
    pub fn declare(&mut self, name: &str, value: Value) {
        let key = CanonicalName::new(name);
        if let Some(frame) = self.frames.last_mut() {
            if !frame.iter().any(|(saved, _)| *saved == key) {
                frame.push((key.clone(), self.heap.get(&key).cloned()));
            }
        }
        self.heap.insert(key, value);
    }

    /// Closes the innermost block, restoring the bindings it hid.
    pub fn leave(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (key, previous) in frame.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.heap.insert(key, value);
                }
                None => {
                    self.heap.remove(&key);
                }
            }
        }
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    pub fn emit(&mut self, record: Record) {
        self.results.push(record);
    }

    pub fn results(&self) -> &[Record] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_lifo_and_bounded() {
        let mut context = Context::new(2);
        context.push(Value::Number(1.0)).unwrap();
        context.push(Value::Number(2.0)).unwrap();
        let err = context.push(Value::Number(3.0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::StackOverflow { limit: 2 }));
        assert_eq!(context.pop().unwrap(), Value::Number(2.0));
        assert_eq!(context.pop().unwrap(), Value::Number(1.0));
        let err = context.pop().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::StackUnderflow));
        assert_eq!(err.category(), crate::errors::ErrorCategory::Runtime);
    }

    #[test]
    fn heap_operations_are_no_ops_when_they_do_not_apply() {
        let mut context = Context::default();
        assert!(context.add("p1", Value::Number(1.0)));
        assert!(!context.add("P1", Value::Number(2.0)));
        assert_eq!(context.get("p1"), Some(&Value::Number(1.0)));

        assert!(!context.replace("missing", Value::Null));
        assert!(!context.contains("missing"));
        assert!(context.replace("p1", Value::Number(3.0)));
        assert_eq!(context.get("P1"), Some(&Value::Number(3.0)));

        assert!(context.remove("p1"));
        assert!(!context.remove("p1"));

        context.bind("x", Value::Boolean(true));
        context.bind("x", Value::Boolean(false));
        assert_eq!(context.get("x"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn leaving_a_block_restores_hidden_bindings() {
        let mut context = Context::default();
        context.bind("p", Value::Number(100.0));
        context.enter();
        context.declare("p", Value::Number(999.0));
        context.declare("q", Value::Boolean(true));
        context.declare("P", Value::Number(1.0));
        assert_eq!(context.get("p"), Some(&Value::Number(1.0)));
        assert_eq!(context.frame_depth(), 1);
        context.leave();

        assert_eq!(context.get("p"), Some(&Value::Number(100.0)));
        assert!(!context.contains("q"));
        assert_eq!(context.frame_depth(), 0);
        context.leave();
        assert_eq!(context.get("p"), Some(&Value::Number(100.0)));
    }

    #[test]
    fn assignments_in_a_block_outlive_it() {
        let mut context = Context::default();
        context.bind("total", Value::Number(1.0));
        context.enter();
        context.bind("total", Value::Number(2.0));
        context.leave();
        assert_eq!(context.get("total"), Some(&Value::Number(2.0)));
    }
}
