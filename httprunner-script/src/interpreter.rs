//! Tree-walking evaluator for parsed guest scripts.
//!
//! Scripts only see the globals installed by [`crate::builtins`] plus whatever the host defines
//! through [`Interpreter::define_global`]. Every run is bounded by an operation budget and a call
//! depth limit; hitting either aborts the run and can't be caught by the script.
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};
use tracing::*;

use crate::{
    ast::*,
    builtins::{self, Prototypes},
    error::{Result, ScriptError},
    parser::parse,
    scope::{self, Assignment, Env, Scope},
    value::{format_number, Function, Value},
};

/// Resource limits applied to a single [`Interpreter::run`].
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_operations: u64,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_operations: 1_000_000,
            max_call_depth: 64,
        }
    }
}

/// Abrupt completion of an evaluation step.
pub(crate) enum Interrupt {
    /// A value raised by `throw`.
    Throw(Value),
    Error(ScriptError),
}

impl From<ScriptError> for Interrupt {
    fn from(e: ScriptError) -> Self {
        Interrupt::Error(e)
    }
}

type Exec<T> = std::result::Result<T, Interrupt>;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: Env,
    prototypes: Prototypes,
    limits: Limits,
    operations: u64,
    depth: usize,
    /// Last value that escaped a callback as [`ScriptError::Uncaught`], so `catch` can recover it.
    thrown: Option<Value>,
    scopes: Vec<Weak<RefCell<Scope>>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        let globals = Scope::root();
        builtins::install(&mut globals.borrow_mut());
        Interpreter {
            globals,
            prototypes: Prototypes::new(),
            limits,
            operations: 0,
            depth: 0,
            thrown: None,
            scopes: Vec::new(),
        }
    }

    /// Bind `name` in the global scope, replacing any previous binding.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().declare(name, value, true);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        scope::lookup(&self.globals, name)
    }

    /// Parse and evaluate `source` in the global scope.
    ///
    /// Returns the value of the last top-level expression statement. A value thrown and not caught
    /// becomes [`ScriptError::Uncaught`].
    pub fn run(&mut self, source: &str) -> Result<Value> {
        let program = parse(source)?;
        self.operations = 0;
        self.depth = 0;
        let env = Rc::clone(&self.globals);
        let result = self.exec_program(&program.body, &env);
        debug!(operations = self.operations, "script finished");
        self.settle(result)
    }

    /// Call a script or native function from host code.
    pub fn call_function(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Result<Value> {
        let result = self.call(func, this, args);
        self.settle(result)
    }

    pub(crate) fn prototypes(&self) -> &Prototypes {
        &self.prototypes
    }

    fn settle(&mut self, result: Exec<Value>) -> Result<Value> {
        match result {
            Ok(value) => Ok(value),
            Err(Interrupt::Error(e)) => Err(e),
            Err(Interrupt::Throw(value)) => {
                let message = describe_thrown(&value);
                self.thrown = Some(value);
                Err(ScriptError::Uncaught(message))
            }
        }
    }

    fn tick(&mut self) -> Exec<()> {
        self.operations += 1;
        if self.operations > self.limits.max_operations {
            return Err(ScriptError::OperationLimit(self.limits.max_operations).into());
        }
        Ok(())
    }

    fn child_scope(&mut self, parent: &Env) -> Env {
        self.track(Scope::child(parent))
    }

    fn function_scope(&mut self, parent: &Env, this: Option<Value>) -> Env {
        self.track(Scope::function(parent, this))
    }

    fn track(&mut self, env: Env) -> Env {
        if self.scopes.len() >= 4096 {
            self.scopes.retain(|scope| scope.strong_count() > 0);
        }
        self.scopes.push(Rc::downgrade(&env));
        env
    }

    // Statements

    fn exec_program(&mut self, body: &[Stmt], env: &Env) -> Exec<Value> {
        self.hoist(body, env);
        let mut completion = Value::Undefined;
        for stmt in body {
            if let Stmt::Expr(expr) = stmt {
                self.tick()?;
                completion = self.eval(expr, env)?;
                continue;
            }
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                Flow::Return(_) | Flow::Break | Flow::Continue => break,
            }
        }
        Ok(completion)
    }

    /// Function declarations are visible in the whole block; `var` names exist before assignment.
    fn hoist(&mut self, body: &[Stmt], env: &Env) {
        for stmt in body {
            match stmt {
                Stmt::Function(def) => {
                    if let Some(name) = &def.name {
                        let func = Value::Function(Rc::new(Function::Script {
                            def: Rc::clone(def),
                            env: Rc::clone(env),
                        }));
                        env.borrow_mut().declare(name.clone(), func, true);
                    }
                }
                Stmt::Decl {
                    kind: DeclKind::Var,
                    declarations,
                } => {
                    let target = scope::function_scope(env);
                    let mut target = target.borrow_mut();
                    for (name, _) in declarations {
                        if !target.contains(name) {
                            target.declare(name.clone(), Value::Undefined, true);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Exec<Flow> {
        let env = self.child_scope(env);
        self.hoist(body, &env);
        for stmt in body {
            match self.exec(stmt, &env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Exec<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Stmt::Decl { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(init) => Some(self.eval(init, env)?),
                        None => None,
                    };
                    match kind {
                        DeclKind::Var => {
                            let target = scope::function_scope(env);
                            let mut target = target.borrow_mut();
                            if let Some(value) = value {
                                target.declare(name.clone(), value, true);
                            } else if !target.contains(name) {
                                target.declare(name.clone(), Value::Undefined, true);
                            }
                        }
                        DeclKind::Let | DeclKind::Const => env.borrow_mut().declare(
                            name.clone(),
                            value.unwrap_or_default(),
                            *kind == DeclKind::Let,
                        ),
                    }
                }
            }
            Stmt::Function(_) | Stmt::Empty => {}
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, env)?.is_truthy() {
                    return self.exec(then_branch, env);
                } else if let Some(else_branch) = else_branch {
                    return self.exec(else_branch, env);
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, env)?.is_truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                let env = self.child_scope(env);
                if let Some(init) = init {
                    self.exec(init, &env)?;
                }
                loop {
                    if let Some(condition) = condition {
                        if !self.eval(condition, &env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.tick()?;
                        self.eval(update, &env)?;
                    }
                }
            }
            Stmt::ForEach {
                kind,
                name,
                iterable,
                keys,
                body,
            } => {
                let iterable = self.eval(iterable, env)?;
                let items = if *keys {
                    enumerate_keys(&iterable)
                } else {
                    iterate(&iterable)?
                };
                for item in items {
                    let iteration = self.child_scope(env);
                    iteration
                        .borrow_mut()
                        .declare(name.clone(), item, *kind != DeclKind::Const);
                    match self.exec(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Block(body) => return self.exec_block(body, env),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                return Err(Interrupt::Throw(value));
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                return self.exec_try(
                    block,
                    param.as_deref(),
                    handler.as_deref(),
                    finalizer.as_deref(),
                    env,
                )
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&str>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        env: &Env,
    ) -> Exec<Flow> {
        let mut result = self.exec_block(block, env);

        if let Err(Interrupt::Error(e)) = &result {
            if e.is_fatal() {
                return result;
            }
        }

        if let Some(handler) = handler {
            result = match result {
                Err(interrupt) => {
                    let caught = self.catch_value(interrupt);
                    let catch_env = self.child_scope(env);
                    if let Some(param) = param {
                        catch_env.borrow_mut().declare(param, caught, true);
                    }
                    self.exec_block(handler, &catch_env)
                }
                ok => ok,
            };
        }

        if let Some(finalizer) = finalizer {
            if let Err(Interrupt::Error(e)) = &result {
                if e.is_fatal() {
                    return result;
                }
            }
            match self.exec_block(finalizer, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }

        result
    }

    /// The value bound to the `catch` parameter for an interrupt.
    fn catch_value(&mut self, interrupt: Interrupt) -> Value {
        match interrupt {
            Interrupt::Throw(value) => value,
            Interrupt::Error(ScriptError::Uncaught(message)) => match self.thrown.take() {
                Some(value) if describe_thrown(&value) == message => value,
                _ => builtins::error_object("Error", &message),
            },
            Interrupt::Error(e) => builtins::error_object(e.kind(), &e.message()),
        }
    }

    // Functions

    pub(crate) fn call(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Exec<Value> {
        let Value::Function(function) = func else {
            return Err(
                ScriptError::Type(format!("{} is not a function", func.to_display())).into(),
            );
        };
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::CallDepth(self.limits.max_call_depth).into());
        }
        self.tick()?;

        let function = Rc::clone(function);
        self.depth += 1;
        let result = match &*function {
            Function::Native { func, .. } => func(self, this, args).map_err(Interrupt::from),
            Function::Script { def, env } => self.call_script(def, env, this, args),
        };
        self.depth -= 1;
        result
    }

    fn call_script(
        &mut self,
        def: &FunctionDef,
        closure: &Env,
        this: Value,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let this = if def.is_arrow { None } else { Some(this) };
        let env = self.function_scope(closure, this);
        {
            let mut scope = env.borrow_mut();
            let mut args = args.into_iter();
            for param in &def.params {
                scope.declare(param.clone(), args.next().unwrap_or_default(), true);
            }
        }

        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &env),
            FunctionBody::Block(body) => {
                self.hoist(body, &env);
                for stmt in body {
                    match self.exec(stmt, &env)? {
                        Flow::Return(value) => return Ok(value),
                        Flow::Normal | Flow::Break | Flow::Continue => {}
                    }
                }
                Ok(Value::Undefined)
            }
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr, env: &Env) -> Exec<Value> {
        Ok(match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::String(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Null => Value::Null,
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&self.eval(expr, env)?.to_display()),
                    }
                }
                Value::String(out)
            }
            Expr::Ident(name) => scope::lookup(env, name).ok_or_else(|| {
                Interrupt::from(ScriptError::Reference(format!("{name} is not defined")))
            })?,
            Expr::This => scope::this_value(env),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Value::array(values)
            }
            Expr::Object(props) => {
                let mut values = Vec::with_capacity(props.len());
                for (key, value) in props {
                    values.push((key.clone(), self.eval(value, env)?));
                }
                Value::object(values)
            }
            Expr::Function(def) => match &def.name {
                // A named function expression sees its own name.
                Some(name) if !def.is_arrow => {
                    let scope = self.child_scope(env);
                    let func = Value::Function(Rc::new(Function::Script {
                        def: Rc::clone(def),
                        env: Rc::clone(&scope),
                    }));
                    scope.borrow_mut().declare(name.clone(), func.clone(), false);
                    func
                }
                _ => Value::Function(Rc::new(Function::Script {
                    def: Rc::clone(def),
                    env: Rc::clone(env),
                })),
            },
            Expr::Unary { op, operand } => match op {
                UnaryOp::Typeof => match &**operand {
                    Expr::Ident(name) => scope::lookup(env, name)
                        .map(|v| Value::string(v.type_of()))
                        .unwrap_or_else(|| Value::string("undefined")),
                    other => Value::string(self.eval(other, env)?.type_of()),
                },
                UnaryOp::Not => Value::Bool(!self.eval(operand, env)?.is_truthy()),
                UnaryOp::Neg => Value::Number(-self.eval(operand, env)?.to_number()),
                UnaryOp::Plus => Value::Number(self.eval(operand, env)?.to_number()),
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    left
                } else {
                    self.eval(right, env)?
                }
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.eval(condition, env)?.is_truthy() {
                    self.eval(then_expr, env)?
                } else {
                    self.eval(else_expr, env)?
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op {
                    Some(op) => {
                        let current = self.eval(target, env)?;
                        let rhs = self.eval(value, env)?;
                        binary(*op, &current, &rhs)
                    }
                    None => self.eval(value, env)?,
                };
                self.store(target, value.clone(), env)?;
                value
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target, env)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.store(target, Value::Number(new), env)?;
                Value::Number(if *prefix { new } else { old })
            }
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => {
                self.eval_chain(expr, env)?.unwrap_or_default()
            }
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                let instance = Value::object(Vec::<(String, Value)>::new());
                match self.call(&constructor, instance.clone(), args)? {
                    result @ (Value::Object(_) | Value::Array(_)) => result,
                    _ => instance,
                }
            }
        })
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Exec<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        Ok(values)
    }

    /// Evaluate a member/index/call chain. `None` means an optional link short-circuited the
    /// rest of the chain.
    fn eval_chain(&mut self, expr: &Expr, env: &Env) -> Exec<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                Ok(Some(self.get_property(&object, property)?))
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(index, env)?);
                Ok(Some(self.get_property(&object, &key)?))
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (this, func) = match &**callee {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(object) = self.eval_chain(object, env)? else {
                            return Ok(None);
                        };
                        if *member_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let func = self.get_property(&object, property)?;
                        (object, func)
                    }
                    Expr::Index {
                        object,
                        index,
                        optional: index_optional,
                    } => {
                        let Some(object) = self.eval_chain(object, env)? else {
                            return Ok(None);
                        };
                        if *index_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let key = property_key(&self.eval(index, env)?);
                        let func = self.get_property(&object, &key)?;
                        (object, func)
                    }
                    other => {
                        let Some(func) = self.eval_chain(other, env)? else {
                            return Ok(None);
                        };
                        (Value::Undefined, func)
                    }
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                if !matches!(func, Value::Function(_)) {
                    return Err(ScriptError::Type(format!(
                        "{} is not a function",
                        callee_name(callee)
                    ))
                    .into());
                }
                let args = self.eval_args(args, env)?;
                Ok(Some(self.call(&func, this, args)?))
            }
            other => Ok(Some(self.eval(other, env)?)),
        }
    }

    fn get_property(&mut self, object: &Value, key: &str) -> Exec<Value> {
        if object.is_nullish() {
            return Err(ScriptError::Type(format!(
                "Cannot read properties of {} (reading '{key}')",
                object.to_display()
            ))
            .into());
        }
        Ok(builtins::get_property(self, object, key))
    }

    fn store(&mut self, target: &Expr, value: Value, env: &Env) -> Exec<()> {
        match target {
            Expr::Ident(name) => match scope::assign(env, name, value.clone()) {
                Assignment::Done => Ok(()),
                Assignment::Constant => {
                    Err(ScriptError::Type("Assignment to constant variable.".into()).into())
                }
                Assignment::Undeclared => {
                    self.globals.borrow_mut().declare(name.clone(), value, true);
                    Ok(())
                }
            },
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, env)?;
                set_property(&object, property, value)
            }
            Expr::Index { object, index, .. } => {
                let object = self.eval(object, env)?;
                let key = property_key(&self.eval(index, env)?);
                set_property(&object, &key, value)
            }
            _ => Err(ScriptError::Reference("Invalid left-hand side in assignment".into()).into()),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // Closures keep their defining scope alive and scopes keep closures alive.
        self.globals.borrow_mut().clear();
        for env in self.scopes.drain(..) {
            if let Some(env) = env.upgrade() {
                env.borrow_mut().clear();
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let concat = |v: &Value| {
                matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_))
            };
            if concat(left) || concat(right) {
                Value::String(left.to_display() + &right.to_display())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(ordering.is_some_and(|ordering| match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
    }
}

fn property_key(key: &Value) -> String {
    match key {
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

fn set_property(object: &Value, key: &str, value: Value) -> Exec<()> {
    match object {
        Value::Object(props) => {
            props.borrow_mut().insert(key.to_string(), value);
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = value.to_number();
                if len >= 0.0 && len.fract() == 0.0 {
                    items.resize(len as usize, Value::Undefined);
                }
            } else if let Ok(index) = key.parse::<usize>() {
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
            }
        }
        Value::Undefined | Value::Null => {
            return Err(ScriptError::Type(format!(
                "Cannot set properties of {} (setting '{key}')",
                object.to_display()
            ))
            .into());
        }
        _ => {}
    }
    Ok(())
}

fn iterate(value: &Value) -> Exec<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ScriptError::Type(format!("{} is not iterable", other.to_display())).into()),
    }
}

fn enumerate_keys(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(props) => props.borrow().keys().map(|k| Value::string(k.as_str())).collect(),
        Value::Array(items) => (0..items.borrow().len())
            .map(|i| Value::String(i.to_string()))
            .collect(),
        Value::String(s) => (0..s.chars().count())
            .map(|i| Value::String(i.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Text used when a thrown value escapes the script: `Name: message` for error objects.
pub(crate) fn describe_thrown(value: &Value) -> String {
    if let Value::Object(props) = value {
        let props = props.borrow();
        if let Some(message) = props.get("message") {
            let name = props
                .get("name")
                .map(Value::to_display)
                .unwrap_or_else(|| "Error".into());
            let message = message.to_display();
            return if message.is_empty() {
                name
            } else {
                format!("{name}: {message}")
            };
        }
    }
    value.to_display()
}

fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", callee_name(object)),
        Expr::This => "this".into(),
        _ => "expression".into(),
    }
}
