use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::value::Value;

pub type Env = Rc<RefCell<Scope>>;

struct Binding {
    value: Value,
    mutable: bool,
}

/// One lexical scope. Function scopes also carry the `this` value, except for arrow functions.
#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Binding>,
    this: Option<Value>,
    function: bool,
    parent: Option<Env>,
}

pub(crate) enum Assignment {
    Done,
    Undeclared,
    Constant,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Scope {
            this: Some(Value::Undefined),
            function: true,
            ..Default::default()
        }))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            parent: Some(Rc::clone(parent)),
            ..Default::default()
        }))
    }

    pub fn function(parent: &Env, this: Option<Value>) -> Env {
        Rc::new(RefCell::new(Scope {
            this,
            function: true,
            parent: Some(Rc::clone(parent)),
            ..Default::default()
        }))
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.vars.insert(name.into(), Binding { value, mutable });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Drop every binding. Breaks reference cycles between closures and the scope they live in.
    pub fn clear(&mut self) {
        self.vars.clear();
        self.parent = None;
    }
}

pub(crate) fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut current = Some(Rc::clone(env));
    while let Some(scope) = current {
        let scope = scope.borrow();
        if let Some(binding) = scope.vars.get(name) {
            return Some(binding.value.clone());
        }
        current = scope.parent.clone();
    }
    None
}

pub(crate) fn assign(env: &Env, name: &str, value: Value) -> Assignment {
    let mut current = Some(Rc::clone(env));
    while let Some(scope) = current {
        let mut scope = scope.borrow_mut();
        if let Some(binding) = scope.vars.get_mut(name) {
            if !binding.mutable {
                return Assignment::Constant;
            }
            binding.value = value;
            return Assignment::Done;
        }
        current = scope.parent.clone();
    }
    Assignment::Undeclared
}

pub(crate) fn this_value(env: &Env) -> Value {
    let mut current = Some(Rc::clone(env));
    while let Some(scope) = current {
        let scope = scope.borrow();
        if let Some(this) = &scope.this {
            return this.clone();
        }
        current = scope.parent.clone();
    }
    Value::Undefined
}

/// The nearest function (or root) scope, where `var` declarations land.
pub(crate) fn function_scope(env: &Env) -> Env {
    let mut current = Rc::clone(env);
    loop {
        let parent = {
            let scope = current.borrow();
            if scope.function {
                return Rc::clone(&current);
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}
