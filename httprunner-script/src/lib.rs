//! # httprunner-script
//!
//! A small sandboxed interpreter for the JavaScript subset used by the assertion scripts of
//! `.http` files. Scripts have no access to I/O, timers or modules: the only things they can
//! touch are the standard globals (`JSON`, `Math`, `Object`, ...) and the values the host binds
//! with [`Interpreter::define_global`].
//!
//! ```
//! use httprunner_script::{Interpreter, Value};
//!
//! let mut interpreter = Interpreter::new();
//! interpreter.define_global("status", Value::Number(200.0));
//! let ok = interpreter.run("status >= 200 && status < 300").unwrap();
//! assert!(ok.is_truthy());
//! ```
pub mod ast;
mod builtins;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod value;

pub use error::{Result, ScriptError};
pub use interpreter::{Interpreter, Limits};
pub use parser::parse;
pub use value::{format_number, Function, NativeFn, ObjectRef, Value};
