//! Dynamic values manipulated by guest scripts.

use indexmap::IndexMap;
use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    ast::FunctionDef,
    error::{Result, ScriptError},
    interpreter::Interpreter,
    scope::Env,
};

/// Signature of functions implemented in Rust. Receives the `this` value and the arguments.
pub type NativeFn = dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value>;

pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Function>),
}

pub enum Function {
    Script { def: Rc<FunctionDef>, env: Env },
    Native { name: String, func: Rc<NativeFn> },
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Script { def, .. } => def.name.as_deref().unwrap_or("anonymous"),
            Function::Native { name, .. } => name,
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn object<K: Into<String>>(props: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(
            props.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Wrap a Rust closure as a callable value.
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Function::Native {
            name: name.into(),
            func: Rc::new(func),
        }))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// String conversion as performed by `String(value)` and `+` concatenation.
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".into(),
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name()),
        }
    }

    /// Identity for objects, value equality for primitives (`===`).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Equality with type coercion (`==`).
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Array(_) | Value::Object(_))
                    || matches!(other, Value::Array(_) | Value::Object(_))
                {
                    return self.to_display() == other.to_display();
                }
                self.to_number() == other.to_number()
            }
            (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_))
            | (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
                Value::String(self.to_display()).loose_equals(&Value::String(other.to_display()))
            }
            _ => self.strict_equals(other),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json)),
            serde_json::Value::Object(props) => {
                Value::object(props.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }

    /// JSON form of the value; `None` for values JSON can't represent (`undefined`, functions,
    /// circular structures).
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.try_to_json().ok().flatten()
    }

    /// Like [`Value::to_json`], but circular structures are an error, as in `JSON.stringify`.
    pub fn try_to_json(&self) -> Result<Option<serde_json::Value>> {
        self.json_with(&mut Vec::new())
    }

    fn json_with(&self, parents: &mut Vec<*const ()>) -> Result<Option<serde_json::Value>> {
        let json = match self {
            Value::Undefined | Value::Function(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                enter(parents, Rc::as_ptr(items).cast())?;
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.json_with(parents)?.unwrap_or(serde_json::Value::Null));
                }
                parents.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(props) => {
                enter(parents, Rc::as_ptr(props).cast())?;
                let mut out = serde_json::Map::new();
                for (key, value) in props.borrow().iter() {
                    if let Some(value) = value.json_with(parents)? {
                        out.insert(key.clone(), value);
                    }
                }
                parents.pop();
                serde_json::Value::Object(out)
            }
        };
        Ok(Some(json))
    }
}

fn enter(parents: &mut Vec<*const ()>, ptr: *const ()) -> Result<()> {
    if parents.contains(&ptr) {
        return Err(ScriptError::Type(
            "Converting circular structure to JSON".into(),
        ));
    }
    parents.push(ptr);
    Ok(())
}

fn json_number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Number to string the way JavaScript prints it for common values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.into()
    } else if n == 0.0 {
        "0".into()
    } else if n.abs() >= 1e21 {
        let s = format!("{n:e}");
        if s.contains("e-") {
            s
        } else {
            s.replacen('e', "e+", 1)
        }
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

pub(crate) fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Array(_) | Value::Object(_) => match self.to_json() {
                Some(json) => write!(f, "{json}"),
                None => write!(f, "{}", self.to_display()),
            },
            other => write!(f, "{}", other.to_display()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(1.0, "1")]
    #[test_case(-0.0, "0")]
    #[test_case(0.1, "0.1")]
    #[test_case(1e21, "1e+21")]
    #[test_case(123456789.0, "123456789")]
    #[test_case(f64::NAN, "NaN")]
    #[test_case(f64::NEG_INFINITY, "-Infinity")]
    fn number_formatting(n: f64, expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[test_case("42", 42.0)]
    #[test_case("  7 ", 7.0)]
    #[test_case("", 0.0)]
    #[test_case("0x10", 16.0)]
    #[test_case("1e2", 100.0)]
    fn string_to_number(s: &str, expected: f64) {
        assert_eq!(parse_number(s), expected);
    }

    #[test]
    fn non_numeric_strings_are_nan() {
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("12px").is_nan());
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::from("200").loose_equals(&Value::from(200.0)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::from(0.0)));
        assert!(Value::from(true).loose_equals(&Value::from(1.0)));
        assert!(!Value::from("200").strict_equals(&Value::from(200.0)));
    }

    #[test]
    fn json_conversion_keeps_integers() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"], "c": 1.5});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), Some(json));
    }

    #[test]
    fn undefined_properties_are_dropped_from_json() {
        let value = Value::object([("a", Value::Undefined), ("b", Value::from(1.0))]);
        assert_eq!(value.to_json(), Some(serde_json::json!({"b": 1})));
    }

    #[test]
    fn array_display_joins_elements() {
        let value = Value::array([Value::from(1.0), Value::Null, Value::from("x")]);
        assert_eq!(value.to_display(), "1,,x");
    }
}
