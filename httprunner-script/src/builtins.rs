//! Standard globals and the methods available on strings, numbers, arrays and objects.
use serde::Serialize;
use std::{collections::HashMap, rc::Rc};

use crate::{
    error::{Result, ScriptError},
    interpreter::Interpreter,
    scope::Scope,
    value::{format_number, ArrayRef, Value},
};

type Method = fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value>;

/// Method tables looked up when a property isn't found on the value itself.
pub(crate) struct Prototypes {
    string: HashMap<&'static str, Value>,
    number: HashMap<&'static str, Value>,
    array: HashMap<&'static str, Value>,
    object: HashMap<&'static str, Value>,
}

impl Prototypes {
    pub(crate) fn new() -> Self {
        Prototypes {
            string: table(&[
                ("includes", string_includes),
                ("startsWith", string_starts_with),
                ("endsWith", string_ends_with),
                ("indexOf", string_index_of),
                ("lastIndexOf", string_last_index_of),
                ("toUpperCase", |_, this, _| {
                    Ok(Value::String(this.to_display().to_uppercase()))
                }),
                ("toLowerCase", |_, this, _| {
                    Ok(Value::String(this.to_display().to_lowercase()))
                }),
                ("trim", |_, this, _| {
                    Ok(Value::string(this.to_display().trim()))
                }),
                ("trimStart", |_, this, _| {
                    Ok(Value::string(this.to_display().trim_start()))
                }),
                ("trimEnd", |_, this, _| {
                    Ok(Value::string(this.to_display().trim_end()))
                }),
                ("split", string_split),
                ("substring", string_substring),
                ("slice", string_slice),
                ("replace", |interpreter, this, args| {
                    string_replace(interpreter, this, args, false)
                }),
                ("replaceAll", |interpreter, this, args| {
                    string_replace(interpreter, this, args, true)
                }),
                ("charAt", string_char_at),
                ("concat", |_, this, args| {
                    let mut out = this.to_display();
                    for arg in args {
                        out.push_str(&arg.to_display());
                    }
                    Ok(Value::String(out))
                }),
                ("repeat", string_repeat),
                ("padStart", |_, this, args| string_pad(this, args, true)),
                ("padEnd", |_, this, args| string_pad(this, args, false)),
                ("toString", |_, this, _| Ok(Value::String(this.to_display()))),
            ]),
            number: table(&[("toFixed", number_to_fixed), ("toString", number_to_string)]),
            array: table(&[
                ("includes", array_includes),
                ("indexOf", array_index_of),
                ("push", array_push),
                ("pop", |_, this, _| {
                    Ok(this_array(&this)?.borrow_mut().pop().unwrap_or_default())
                }),
                ("shift", |_, this, _| {
                    let array = this_array(&this)?;
                    let mut items = array.borrow_mut();
                    Ok(if items.is_empty() {
                        Value::Undefined
                    } else {
                        items.remove(0)
                    })
                }),
                ("reverse", |_, this, _| {
                    this_array(&this)?.borrow_mut().reverse();
                    Ok(this)
                }),
                ("join", array_join),
                ("slice", array_slice),
                ("concat", array_concat),
                ("map", array_map),
                ("filter", array_filter),
                ("forEach", array_for_each),
                ("some", array_some),
                ("every", array_every),
                ("find", array_find),
                ("findIndex", array_find_index),
                ("reduce", array_reduce),
                ("sort", array_sort),
                ("toString", |_, this, _| Ok(Value::String(this.to_display()))),
            ]),
            object: table(&[
                ("hasOwnProperty", |_, this, args| {
                    let key = arg(&args, 0).to_display();
                    Ok(Value::Bool(match &this {
                        Value::Object(props) => props.borrow().contains_key(&key),
                        Value::Array(items) => key
                            .parse::<usize>()
                            .is_ok_and(|i| i < items.borrow().len()),
                        _ => false,
                    }))
                }),
                ("toString", |_, this, _| Ok(Value::String(this.to_display()))),
            ]),
        }
    }
}

fn table(methods: &[(&'static str, Method)]) -> HashMap<&'static str, Value> {
    methods
        .iter()
        .map(|(name, method)| (*name, Value::native(*name, *method)))
        .collect()
}

/// Property lookup on a non-nullish value.
pub(crate) fn get_property(interpreter: &Interpreter, object: &Value, key: &str) -> Value {
    let prototypes = interpreter.prototypes();
    let own = match object {
        Value::String(s) => match key {
            "length" => Some(Value::Number(s.chars().count() as f64)),
            _ => match key.parse::<usize>() {
                Ok(i) => Some(
                    s.chars()
                        .nth(i)
                        .map_or(Value::Undefined, |c| Value::String(c.to_string())),
                ),
                Err(_) => prototypes.string.get(key).cloned(),
            },
        },
        Value::Array(items) => match key {
            "length" => Some(Value::Number(items.borrow().len() as f64)),
            _ => match key.parse::<usize>() {
                Ok(i) => Some(items.borrow().get(i).cloned().unwrap_or_default()),
                Err(_) => prototypes.array.get(key).cloned(),
            },
        },
        Value::Object(props) => props.borrow().get(key).cloned(),
        Value::Number(_) => prototypes.number.get(key).cloned(),
        Value::Function(func) if key == "name" => Some(Value::string(func.name())),
        _ => None,
    };
    own.or_else(|| prototypes.object.get(key).cloned())
        .unwrap_or_default()
}

/// An `Error`-like object as produced by `new Error(message)`.
pub(crate) fn error_object(name: &str, message: &str) -> Value {
    Value::object([
        ("name", Value::string(name)),
        ("message", Value::string(message)),
    ])
}

/// Install the standard globals into the root scope.
pub(crate) fn install(scope: &mut Scope) {
    scope.declare("undefined", Value::Undefined, false);
    scope.declare("NaN", Value::Number(f64::NAN), false);
    scope.declare("Infinity", Value::Number(f64::INFINITY), false);

    scope.declare(
        "JSON",
        Value::object([
            ("parse", Value::native("parse", json_parse)),
            ("stringify", Value::native("stringify", json_stringify)),
        ]),
        false,
    );

    scope.declare(
        "Math",
        Value::object([
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
            ("floor", math_fn("floor", f64::floor)),
            ("ceil", math_fn("ceil", f64::ceil)),
            ("round", math_fn("round", |n| (n + 0.5).floor())),
            ("trunc", math_fn("trunc", f64::trunc)),
            ("abs", math_fn("abs", f64::abs)),
            ("sqrt", math_fn("sqrt", f64::sqrt)),
            (
                "sign",
                math_fn("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
            ),
            (
                "pow",
                Value::native("pow", |_, _, args| {
                    Ok(Value::Number(
                        arg(&args, 0).to_number().powf(arg(&args, 1).to_number()),
                    ))
                }),
            ),
            (
                "min",
                Value::native("min", |_, _, args| Ok(Value::Number(extremum(&args, f64::min, f64::INFINITY)))),
            ),
            (
                "max",
                Value::native("max", |_, _, args| Ok(Value::Number(extremum(&args, f64::max, f64::NEG_INFINITY)))),
            ),
            (
                "random",
                Value::native("random", |_, _, _| Ok(Value::Number(rand::random::<f64>()))),
            ),
        ]),
        false,
    );

    scope.declare(
        "Object",
        Value::object([
            ("keys", Value::native("keys", object_keys)),
            ("values", Value::native("values", object_values)),
            ("entries", Value::native("entries", object_entries)),
            ("assign", Value::native("assign", object_assign)),
        ]),
        false,
    );

    scope.declare(
        "Array",
        Value::object([(
            "isArray",
            Value::native("isArray", |_, _, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
            }),
        )]),
        false,
    );

    scope.declare(
        "String",
        Value::native("String", |_, _, args| {
            Ok(Value::String(match args.first() {
                Some(v) => v.to_display(),
                None => String::new(),
            }))
        }),
        false,
    );
    scope.declare(
        "Number",
        Value::native("Number", |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
        false,
    );
    scope.declare(
        "Boolean",
        Value::native("Boolean", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).is_truthy()))
        }),
        false,
    );
    scope.declare("parseInt", Value::native("parseInt", parse_int), false);
    scope.declare("parseFloat", Value::native("parseFloat", parse_float), false);
    scope.declare(
        "isNaN",
        Value::native("isNaN", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))
        }),
        false,
    );
    scope.declare(
        "isFinite",
        Value::native("isFinite", |_, _, args| {
            Ok(Value::Bool(arg(&args, 0).to_number().is_finite()))
        }),
        false,
    );

    for name in [
        "Error",
        "TypeError",
        "RangeError",
        "SyntaxError",
        "ReferenceError",
    ] {
        scope.declare(
            name,
            Value::native(name, move |_, _, args| {
                let message = match arg(&args, 0) {
                    Value::Undefined => String::new(),
                    v => v.to_display(),
                };
                Ok(error_object(name, &message))
            }),
            false,
        );
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn this_array(this: &Value) -> Result<ArrayRef> {
    match this {
        Value::Array(items) => Ok(Rc::clone(items)),
        other => Err(ScriptError::Type(format!(
            "{} is not an array",
            other.to_display()
        ))),
    }
}

/// Resolve a possibly negative position against `len`, as `slice` does.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// A non-negative position clamped to `len`, as `substring` and `includes` do.
fn clamped_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        0
    } else {
        n.trunc().clamp(0.0, len as f64) as usize
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len())
        .find(|&i| haystack[i..].starts_with(needle))
}

fn math_fn(name: &'static str, f: fn(f64) -> f64) -> Value {
    Value::native(name, move |_, _, args| {
        Ok(Value::Number(f(arg(&args, 0).to_number())))
    })
}

fn extremum(args: &[Value], pick: fn(f64, f64) -> f64, initial: f64) -> f64 {
    let mut result = initial;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return f64::NAN;
        }
        result = pick(result, n);
    }
    result
}

// JSON

fn json_parse(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let text = arg(&args, 0).to_display();
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => Ok(Value::from_json(&json)),
        Err(e) => {
            let message = e.to_string();
            let message = message
                .split(" at line ")
                .next()
                .unwrap_or_default()
                .to_string();
            Err(ScriptError::Syntax {
                message,
                line: e.line(),
                column: e.column(),
            })
        }
    }
}

fn json_stringify(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let Some(json) = arg(&args, 0).try_to_json()? else {
        return Ok(Value::Undefined);
    };
    let indent: String = match arg(&args, 2) {
        Value::Number(n) if n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(Value::String(json.to_string()));
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)
        .map_err(|e| ScriptError::Type(e.to_string()))?;
    Ok(Value::String(String::from_utf8_lossy(&out).into_owned()))
}

// Globals

fn parse_int(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let text = arg(&args, 0).to_display();
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = match arg(&args, 1) {
        Value::Undefined => 0,
        v => v.to_number() as u32,
    };
    if (radix == 0 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let n = digits
        .into_iter()
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    Ok(Value::Number(if negative { -n } else { n }))
}

fn parse_float(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let text = arg(&args, 0).to_display();
    let s = text.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if rest.starts_with("Infinity") {
        return Ok(Value::Number(sign * f64::INFINITY));
    }

    let bytes = rest.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return Ok(Value::Number(f64::NAN));
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exponent_end = end + 1;
        if exponent_end < bytes.len() && (bytes[exponent_end] == b'+' || bytes[exponent_end] == b'-')
        {
            exponent_end += 1;
        }
        let digits_start = exponent_end;
        while exponent_end < bytes.len() && bytes[exponent_end].is_ascii_digit() {
            exponent_end += 1;
        }
        if exponent_end > digits_start {
            end = exponent_end;
        }
    }
    let n = rest[..end].parse::<f64>().unwrap_or(f64::NAN);
    Ok(Value::Number(sign * n))
}

fn object_entries_of(value: &Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Object(props) => Ok(props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Value::Array(items) => Ok(items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect()),
        Value::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect()),
        Value::Undefined | Value::Null => Err(ScriptError::Type(
            "Cannot convert undefined or null to object".into(),
        )),
        _ => Ok(Vec::new()),
    }
}

fn object_keys(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let entries = object_entries_of(&arg(&args, 0))?;
    Ok(Value::array(entries.into_iter().map(|(k, _)| Value::String(k))))
}

fn object_values(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let entries = object_entries_of(&arg(&args, 0))?;
    Ok(Value::array(entries.into_iter().map(|(_, v)| v)))
}

fn object_entries(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let entries = object_entries_of(&arg(&args, 0))?;
    Ok(Value::array(
        entries
            .into_iter()
            .map(|(k, v)| Value::array([Value::String(k), v])),
    ))
}

fn object_assign(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value> {
    let target = arg(&args, 0);
    let Value::Object(props) = &target else {
        return Err(ScriptError::Type(
            "Object.assign target must be an object".into(),
        ));
    };
    for source in args.iter().skip(1).filter(|v| !v.is_nullish()) {
        for (key, value) in object_entries_of(source)? {
            props.borrow_mut().insert(key, value);
        }
    }
    Ok(target)
}

// String methods

fn string_includes(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let needle: Vec<char> = arg(&args, 0).to_display().chars().collect();
    let from = clamped_index(&arg(&args, 1), chars.len(), 0);
    Ok(Value::Bool(find_chars(&chars, &needle, from).is_some()))
}

fn string_starts_with(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let needle: Vec<char> = arg(&args, 0).to_display().chars().collect();
    let from = clamped_index(&arg(&args, 1), chars.len(), 0);
    Ok(Value::Bool(chars[from..].starts_with(&needle)))
}

fn string_ends_with(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let needle: Vec<char> = arg(&args, 0).to_display().chars().collect();
    let end = clamped_index(&arg(&args, 1), chars.len(), chars.len());
    Ok(Value::Bool(chars[..end].ends_with(&needle)))
}

fn string_index_of(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let needle: Vec<char> = arg(&args, 0).to_display().chars().collect();
    let from = clamped_index(&arg(&args, 1), chars.len(), 0);
    Ok(Value::Number(
        find_chars(&chars, &needle, from).map_or(-1.0, |i| i as f64),
    ))
}

fn string_last_index_of(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let needle: Vec<char> = arg(&args, 0).to_display().chars().collect();
    if needle.len() > chars.len() {
        return Ok(Value::Number(-1.0));
    }
    let found = (0..=chars.len() - needle.len())
        .rev()
        .find(|&i| chars[i..].starts_with(&needle));
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn string_split(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let s = this.to_display();
    let limit = match arg(&args, 1) {
        Value::Undefined => usize::MAX,
        v => v.to_number().max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(&args, 0) {
        Value::Undefined => vec![Value::String(s)],
        separator => {
            let separator = separator.to_display();
            if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::string).collect()
            }
        }
    };
    Ok(Value::array(parts.into_iter().take(limit)))
}

fn string_substring(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let start = clamped_index(&arg(&args, 0), chars.len(), 0);
    let end = clamped_index(&arg(&args, 1), chars.len(), chars.len());
    let (start, end) = if start > end { (end, start) } else { (start, end) };
    Ok(Value::String(chars[start..end].iter().collect()))
}

fn string_slice(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let chars: Vec<char> = this.to_display().chars().collect();
    let start = relative_index(&arg(&args, 0), chars.len(), 0);
    let end = relative_index(&arg(&args, 1), chars.len(), chars.len());
    Ok(Value::String(if start < end {
        chars[start..end].iter().collect()
    } else {
        String::new()
    }))
}

fn string_replace(
    interpreter: &mut Interpreter,
    this: Value,
    args: Vec<Value>,
    all: bool,
) -> Result<Value> {
    let s = this.to_display();
    let pattern = arg(&args, 0).to_display();
    let replacement = arg(&args, 1);

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    let mut offset = 0;
    while let Some(found) = rest.find(pattern.as_str()) {
        out.push_str(&rest[..found]);
        let position = s[..offset + found].chars().count();
        let substitute = match &replacement {
            Value::Function(_) => interpreter
                .call_function(
                    &replacement,
                    Value::Undefined,
                    vec![
                        Value::string(pattern.as_str()),
                        Value::Number(position as f64),
                        Value::string(s.as_str()),
                    ],
                )?
                .to_display(),
            other => other.to_display(),
        };
        out.push_str(&substitute);

        let skip = found + pattern.len();
        if pattern.is_empty() {
            // An empty pattern matches between every character.
            match rest[skip..].chars().next() {
                Some(c) if all => {
                    out.push(c);
                    offset += c.len_utf8();
                    rest = &rest[c.len_utf8()..];
                    continue;
                }
                _ => {
                    rest = &rest[skip..];
                    break;
                }
            }
        }
        offset += skip;
        rest = &rest[skip..];
        if !all {
            break;
        }
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn string_char_at(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let index = arg(&args, 0).to_number();
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    let c = if index < 0.0 {
        None
    } else {
        this.to_display().chars().nth(index as usize)
    };
    Ok(Value::String(c.map(String::from).unwrap_or_default()))
}

fn string_repeat(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let count = arg(&args, 0).to_number();
    let count = if count.is_nan() { 0.0 } else { count.trunc() };
    if !(0.0..=1e6).contains(&count) {
        return Err(ScriptError::Type(format!(
            "Invalid count value: {}",
            format_number(count)
        )));
    }
    Ok(Value::String(this.to_display().repeat(count as usize)))
}

fn string_pad(this: Value, args: Vec<Value>, start: bool) -> Result<Value> {
    let s = this.to_display();
    let target = arg(&args, 0).to_number();
    let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
    let fill = match arg(&args, 1) {
        Value::Undefined => " ".to_string(),
        v => v.to_display(),
    };
    let len = s.chars().count();
    if target <= len || fill.is_empty() {
        return Ok(Value::String(s));
    }
    let padding: String = fill.chars().cycle().take(target - len).collect();
    Ok(Value::String(if start {
        padding + &s
    } else {
        s + &padding
    }))
}

// Number methods

fn number_to_fixed(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let n = this.to_number();
    let digits = arg(&args, 0).to_number();
    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
    if !(0.0..=100.0).contains(&digits) {
        return Err(ScriptError::Type(
            "toFixed() digits argument must be between 0 and 100".into(),
        ));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::String(format_number(n)));
    }
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

fn number_to_string(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let n = this.to_number();
    let radix = match arg(&args, 0) {
        Value::Undefined => 10,
        v => v.to_number() as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(ScriptError::Type(
            "toString() radix must be between 2 and 36".into(),
        ));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(Value::String(format_number(n)));
    }

    let mut digits = Vec::new();
    let mut rest = n.abs();
    while rest >= 1.0 {
        let digit = (rest % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        rest = (rest / f64::from(radix)).floor();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::String(digits.into_iter().rev().collect()))
}

// Array methods

fn array_includes(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let needle = arg(&args, 0);
    let found = this_array(&this)?.borrow().iter().any(|item| {
        item.strict_equals(&needle)
            || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
    });
    Ok(Value::Bool(found))
}

fn array_index_of(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let needle = arg(&args, 0);
    let position = this_array(&this)?
        .borrow()
        .iter()
        .position(|item| item.strict_equals(&needle));
    Ok(Value::Number(position.map_or(-1.0, |i| i as f64)))
}

fn array_push(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let array = this_array(&this)?;
    let mut items = array.borrow_mut();
    items.extend(args);
    Ok(Value::Number(items.len() as f64))
}

fn array_join(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let separator = match arg(&args, 0) {
        Value::Undefined => ",".to_string(),
        v => v.to_display(),
    };
    let joined = this_array(&this)?
        .borrow()
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.to_display()
            }
        })
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::String(joined))
}

fn array_slice(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let array = this_array(&this)?;
    let items = array.borrow();
    let start = relative_index(&arg(&args, 0), items.len(), 0);
    let end = relative_index(&arg(&args, 1), items.len(), items.len());
    Ok(Value::array(if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    }))
}

fn array_concat(_: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut items = this_array(&this)?.borrow().clone();
    for arg in args {
        match arg {
            Value::Array(other) => items.extend(other.borrow().iter().cloned()),
            other => items.push(other),
        }
    }
    Ok(Value::array(items))
}

/// Invoke `callback(item, index, array)` for each element of a snapshot of the array until
/// `visit` returns `false`.
fn visit_elements(
    interpreter: &mut Interpreter,
    this: &Value,
    callback: &Value,
    mut visit: impl FnMut(usize, &Value, Value) -> bool,
) -> Result<()> {
    let items = this_array(this)?.borrow().clone();
    for (index, item) in items.into_iter().enumerate() {
        let result = interpreter.call_function(
            callback,
            Value::Undefined,
            vec![item.clone(), Value::Number(index as f64), this.clone()],
        )?;
        if !visit(index, &item, result) {
            break;
        }
    }
    Ok(())
}

fn array_map(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut out = Vec::new();
    visit_elements(interpreter, &this, &arg(&args, 0), |_, _, result| {
        out.push(result);
        true
    })?;
    Ok(Value::array(out))
}

fn array_filter(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut out = Vec::new();
    visit_elements(interpreter, &this, &arg(&args, 0), |_, item, result| {
        if result.is_truthy() {
            out.push(item.clone());
        }
        true
    })?;
    Ok(Value::array(out))
}

fn array_for_each(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    visit_elements(interpreter, &this, &arg(&args, 0), |_, _, _| true)?;
    Ok(Value::Undefined)
}

fn array_some(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut found = false;
    visit_elements(interpreter, &this, &arg(&args, 0), |_, _, result| {
        found = result.is_truthy();
        !found
    })?;
    Ok(Value::Bool(found))
}

fn array_every(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut all = true;
    visit_elements(interpreter, &this, &arg(&args, 0), |_, _, result| {
        all = result.is_truthy();
        all
    })?;
    Ok(Value::Bool(all))
}

fn array_find(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut found = Value::Undefined;
    visit_elements(interpreter, &this, &arg(&args, 0), |_, item, result| {
        if result.is_truthy() {
            found = item.clone();
            return false;
        }
        true
    })?;
    Ok(found)
}

fn array_find_index(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let mut found = -1.0;
    visit_elements(interpreter, &this, &arg(&args, 0), |index, _, result| {
        if result.is_truthy() {
            found = index as f64;
            return false;
        }
        true
    })?;
    Ok(Value::Number(found))
}

fn array_reduce(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let items = this_array(&this)?.borrow().clone();
    let callback = arg(&args, 0);
    let mut items = items.into_iter().enumerate();
    let mut accumulator = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match items.next() {
            Some((_, first)) => first,
            None => {
                return Err(ScriptError::Type(
                    "Reduce of empty array with no initial value".into(),
                ))
            }
        },
    };
    for (index, item) in items {
        accumulator = interpreter.call_function(
            &callback,
            Value::Undefined,
            vec![accumulator, item, Value::Number(index as f64), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn array_sort(interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> Result<Value> {
    let array = this_array(&this)?;
    let mut items = array.borrow().clone();
    let compare = arg(&args, 0);
    // Insertion sort: stable, and the comparator may call back into the script.
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare_elements(interpreter, &compare, &items[j - 1], &items[j])? > 0.0 {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
    *array.borrow_mut() = items;
    Ok(this)
}

fn compare_elements(
    interpreter: &mut Interpreter,
    compare: &Value,
    a: &Value,
    b: &Value,
) -> Result<f64> {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(0.0),
        (Value::Undefined, _) => return Ok(1.0),
        (_, Value::Undefined) => return Ok(-1.0),
        _ => {}
    }
    if compare.is_nullish() {
        return Ok(match a.to_display().cmp(&b.to_display()) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        });
    }
    let result = interpreter
        .call_function(compare, Value::Undefined, vec![a.clone(), b.clone()])?
        .to_number();
    Ok(if result.is_nan() { 0.0 } else { result })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn eval_json(source: &str) -> serde_json::Value {
        Interpreter::new()
            .run(source)
            .unwrap()
            .to_json()
            .unwrap()
    }

    #[test_case("'Hello'.length", serde_json::json!(5))]
    #[test_case("'application/json'.includes('json')", serde_json::json!(true))]
    #[test_case("'abc'.startsWith('b', 1)", serde_json::json!(true))]
    #[test_case("'abc'.endsWith('bc')", serde_json::json!(true))]
    #[test_case("'a-b-c'.split('-')", serde_json::json!(["a", "b", "c"]))]
    #[test_case("'abc'.split('')", serde_json::json!(["a", "b", "c"]))]
    #[test_case("'  x '.trim()", serde_json::json!("x"))]
    #[test_case("'Hello'.toUpperCase()", serde_json::json!("HELLO"))]
    #[test_case("'hello'.indexOf('l')", serde_json::json!(2))]
    #[test_case("'hello'.lastIndexOf('l')", serde_json::json!(3))]
    #[test_case("'hello'.slice(-3)", serde_json::json!("llo"))]
    #[test_case("'hello'.substring(3, 1)", serde_json::json!("el"))]
    #[test_case("'a.b.c'.replace('.', '/')", serde_json::json!("a/b.c"))]
    #[test_case("'a.b.c'.replaceAll('.', '/')", serde_json::json!("a/b/c"))]
    #[test_case("'ab'.replace('b', (m) => m.toUpperCase())", serde_json::json!("aB"))]
    #[test_case("'abc'.charAt(1) + 'abc'[2]", serde_json::json!("bc"))]
    #[test_case("'5'.padStart(3, '0')", serde_json::json!("005"))]
    #[test_case("'ab'.repeat(2)", serde_json::json!("abab"))]
    fn string_methods(source: &str, expected: serde_json::Value) {
        assert_eq!(eval_json(source), expected);
    }

    #[test_case("[1, 2, 3].map(x => x * 2)", serde_json::json!([2, 4, 6]))]
    #[test_case("[1, 2, 3].filter(x => x > 1)", serde_json::json!([2, 3]))]
    #[test_case("[1, 2, 3].some(x => x > 2)", serde_json::json!(true))]
    #[test_case("[1, 2, 3].every(x => x > 2)", serde_json::json!(false))]
    #[test_case("[{id: 1}, {id: 2}].find(x => x.id === 2)", serde_json::json!({"id": 2}))]
    #[test_case("[5, 6].findIndex(x => x === 6)", serde_json::json!(1))]
    #[test_case("[1, 2, 3].reduce((a, b) => a + b)", serde_json::json!(6))]
    #[test_case("[1, 2, 3].reduce((a, b) => a + b, 10)", serde_json::json!(16))]
    #[test_case("[1, NaN].includes(NaN)", serde_json::json!(true))]
    #[test_case("[1, 2].indexOf(3)", serde_json::json!(-1))]
    #[test_case("[1, null, 'a'].join('-')", serde_json::json!("1--a"))]
    #[test_case("[1, 2, 3, 4].slice(1, -1)", serde_json::json!([2, 3]))]
    #[test_case("[1].concat([2, 3], 4)", serde_json::json!([1, 2, 3, 4]))]
    #[test_case("[3, 1, 2].sort()", serde_json::json!([1, 2, 3]))]
    #[test_case("[3, 10, 2].sort((a, b) => b - a)", serde_json::json!([10, 3, 2]))]
    #[test_case("const a = [1]; a.push(2, 3); [a.pop(), a.length]", serde_json::json!([3, 2]))]
    fn array_methods(source: &str, expected: serde_json::Value) {
        assert_eq!(eval_json(source), expected);
    }

    #[test_case("(1.005).toFixed(1)", serde_json::json!("1.0"))]
    #[test_case("(2).toFixed(2)", serde_json::json!("2.00"))]
    #[test_case("(255).toString(16)", serde_json::json!("ff"))]
    #[test_case("(-5).toString(2)", serde_json::json!("-101"))]
    #[test_case("(0.5).toString()", serde_json::json!("0.5"))]
    fn number_methods(source: &str, expected: serde_json::Value) {
        assert_eq!(eval_json(source), expected);
    }

    #[test_case("parseInt('42px')", serde_json::json!(42))]
    #[test_case("parseInt('0x1A')", serde_json::json!(26))]
    #[test_case("parseInt('-12', 10)", serde_json::json!(-12))]
    #[test_case("isNaN(parseInt('px'))", serde_json::json!(true))]
    #[test_case("parseFloat('3.5e2kg')", serde_json::json!(350))]
    #[test_case("parseFloat('.25')", serde_json::json!(0.25))]
    #[test_case("Number('12') + 1", serde_json::json!(13))]
    #[test_case("String(12) + 1", serde_json::json!("121"))]
    #[test_case("Boolean('')", serde_json::json!(false))]
    #[test_case("Math.max(1, 5, 3) + Math.min(4, 2)", serde_json::json!(7))]
    #[test_case("Math.round(2.5) + Math.floor(1.9) + Math.abs(-1)", serde_json::json!(5))]
    #[test_case("Object.keys({a: 1, b: 2})", serde_json::json!(["a", "b"]))]
    #[test_case("Object.values({a: 1, b: 2})", serde_json::json!([1, 2]))]
    #[test_case("Object.entries({a: 1})", serde_json::json!([["a", 1]]))]
    #[test_case("Object.assign({a: 1}, {b: 2})", serde_json::json!({"a": 1, "b": 2}))]
    #[test_case("Array.isArray([]) && !Array.isArray({})", serde_json::json!(true))]
    #[test_case("({a: 1}).hasOwnProperty('a')", serde_json::json!(true))]
    fn globals(source: &str, expected: serde_json::Value) {
        assert_eq!(eval_json(source), expected);
    }

    #[test]
    fn json_round_trip_keeps_key_order() {
        assert_eq!(
            eval_json(r#"JSON.stringify(JSON.parse('{"b": 1, "a": [true, null]}'))"#),
            serde_json::json!(r#"{"b":1,"a":[true,null]}"#)
        );
    }

    #[test]
    fn json_stringify_with_indent() {
        assert_eq!(
            eval_json("JSON.stringify({a: [1]}, null, 2)"),
            serde_json::json!("{\n  \"a\": [\n    1\n  ]\n}")
        );
    }

    #[test]
    fn json_stringify_rejects_cycles() {
        let err = Interpreter::new()
            .run("const a = {}; a.self = a; JSON.stringify(a)")
            .unwrap_err();
        assert_eq!(
            err,
            ScriptError::Type("Converting circular structure to JSON".into())
        );
    }

    #[test]
    fn json_parse_errors_are_catchable() {
        assert_eq!(
            eval_json("let name; try { JSON.parse('{') } catch (e) { name = e.name } name"),
            serde_json::json!("SyntaxError")
        );
    }

    #[test]
    fn math_random_is_in_range() {
        assert_eq!(
            eval_json("const r = Math.random(); r >= 0 && r < 1"),
            serde_json::json!(true)
        );
    }

    #[test]
    fn error_constructors() {
        assert_eq!(
            eval_json("const e = new TypeError('bad'); [e.name, e.message, Error().message]"),
            serde_json::json!(["TypeError", "bad", ""])
        );
    }
}
