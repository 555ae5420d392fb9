//! `{{name}}` substitution and the script sandbox.
use httprunner_script::{Interpreter, Limits};
use rand::Rng;
use uuid::Uuid;
use std::{ops::Range, sync::Arc};
use tracing::*;

use crate::{
    client::Client, config::Variables, response::ResponseEnvelope, Error, Result,
};

/// Resolves placeholders and runs assertion scripts for one run.
///
/// Lookup order is built-in dynamic variables, then globals, then the static variables of the
/// selected client profile.
#[derive(Clone)]
pub struct VariableContext {
    client: Client,
    variables: Arc<Variables>,
    limits: Limits,
}

impl VariableContext {
    pub fn new(client: Client, variables: Arc<Variables>) -> VariableContext {
        VariableContext {
            client,
            variables,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> VariableContext {
        self.limits = limits;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Replace every `{{ name }}` in `text`.
    ///
    /// Text without placeholders is returned untouched. Otherwise `$uuid`, `$timestamp` and
    /// `$randomInt` are refreshed once, so repeated occurrences within one call agree. An
    /// unresolvable name fails the whole call.
    pub fn substitute(&self, text: &str) -> Result<String> {
        let found = placeholders(text);
        if found.is_empty() {
            return Ok(text.to_string());
        }

        self.refresh_builtins();

        let mut substituted = String::with_capacity(text.len());
        let mut last = 0;
        for placeholder in &found {
            let value = self
                .resolve(placeholder.name)
                .ok_or_else(|| Error::MissingVariable(placeholder.name.to_string()))?;
            substituted.push_str(&text[last..placeholder.range.start]);
            substituted.push_str(&value);
            last = placeholder.range.end;
        }
        substituted.push_str(&text[last..]);
        Ok(substituted)
    }

    fn resolve(&self, name: &str) -> Option<String> {
        self.client
            .with_globals(|globals| globals.get(name).map(render))
            .or_else(|| self.variables.get(name).map(render))
    }

    fn refresh_builtins(&self) {
        let uuid = Uuid::new_v4().to_string();
        let random_int: u32 = rand::thread_rng().gen_range(0..1000);
        let timestamp = chrono::Utc::now().timestamp();
        self.client.with_globals(|globals| {
            globals.set("$uuid", serde_json::Value::String(uuid));
            globals.set("$timestamp", serde_json::Value::from(timestamp));
            globals.set("$randomInt", serde_json::Value::from(random_int));
        });
    }

    /// Run a case's script with `client` and `response` as its only host bindings.
    pub fn run_script(&self, source: &str, response: &ResponseEnvelope) -> Result<()> {
        let mut interpreter = Interpreter::with_limits(self.limits);
        interpreter.define_global("client", self.client.to_value());
        interpreter.define_global("response", response.to_value());
        interpreter.run(source)?;
        debug!("script completed");
        Ok(())
    }
}

/// Text substituted for a variable value.
fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Placeholder<'a> {
    range: Range<usize>,
    name: &'a str,
}

fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find("{{") {
        let start = pos + offset;
        match placeholder_at(text, start) {
            Some(placeholder) => {
                pos = placeholder.range.end;
                found.push(placeholder);
            }
            None => pos = start + 1,
        }
    }
    found
}

/// Match `{{ $?[A-Za-z0-9_-]+ }}` starting at `start`.
fn placeholder_at(text: &str, start: usize) -> Option<Placeholder<'_>> {
    let inner = &text[start + 2..];
    let name_start = text.len() - inner.trim_start().len();

    let candidate = &text[name_start..];
    let sigil = usize::from(candidate.starts_with('$'));
    let ident_len = candidate[sigil..]
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(candidate.len() - sigil);
    if ident_len == 0 {
        return None;
    }
    let name_end = name_start + sigil + ident_len;

    let rest = text[name_end..].trim_start().strip_prefix("}}")?;
    Some(Placeholder {
        range: start..text.len() - rest.len(),
        name: &text[name_start..name_end],
    })
}
