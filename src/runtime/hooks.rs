//! VL-010: Hook registry interface.
//!
//! Compiled `{hook NAME ...}` statements call into a [`HookRegistry`] only when
//! the hook is registered. Whatever a hook returns is rendered into the output.

use crate::core::types::Value;
use indexmap::IndexMap;

/// Argument passed to a hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookArg {
    None,
    Single(Value),
    List(Vec<Value>),
}

/// Named extension points, dispatched by the host.
pub trait HookRegistry {
    fn contains(&self, name: &str) -> bool;
    fn call(&mut self, name: &str, arg: HookArg) -> Option<Value>;
}

/// Registry with nothing registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl HookRegistry for NoHooks {
    fn contains(&self, _name: &str) -> bool {
        false
    }

    fn call(&mut self, _name: &str, _arg: HookArg) -> Option<Value> {
        None
    }
}

type HookFn = Box<dyn FnMut(HookArg) -> Option<Value>>;

/// Closure-backed registry.
#[derive(Default)]
pub struct Hooks {
    hooks: IndexMap<String, HookFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: FnMut(HookArg) -> Option<Value> + 'static,
    {
        self.hooks.insert(name.to_string(), Box::new(f));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry for Hooks {
    fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    fn call(&mut self, name: &str, arg: HookArg) -> Option<Value> {
        let hook = self.hooks.get_mut(name)?;
        hook(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_vl010_no_hooks() {
        let mut hooks = NoHooks;
        assert!(!hooks.contains("any"));
        assert_eq!(hooks.call("any", HookArg::None), None);
    }

    #[test]
    fn test_vl010_register_and_call() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut hooks = Hooks::new();
        hooks.register("after_header", move |arg| {
            sink.borrow_mut().push(arg);
            Some(Value::from("<!-- hooked -->"))
        });
        assert!(hooks.contains("after_header"));
        assert_eq!(hooks.len(), 1);
        let out = hooks.call("after_header", HookArg::Single(Value::from(3)));
        assert_eq!(out, Some(Value::from("<!-- hooked -->")));
        assert_eq!(seen.borrow()[0], HookArg::Single(Value::from(3)));
        assert_eq!(hooks.call("missing", HookArg::None), None);
    }
}
