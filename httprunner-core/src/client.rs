//! The `client` object guest scripts talk to.
//!
//! `client.test(name, fn)` opens a test scope, `client.assert(check, message)` records an
//! assertion into the innermost open scope and `client.log(text)` records a log entry. Everything
//! lands in an output queue that the executor drains after each script run.
use httprunner_script::{Interpreter, ScriptError, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::*;

use crate::globals::GlobalsStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub valid: bool,
    /// Failure message; always `None` for valid assertions.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Assertions {
        name: String,
        assertions: Vec<AssertionOutcome>,
    },
    Error {
        name: String,
        message: String,
    },
}

impl TestOutcome {
    pub fn name(&self) -> &str {
        match self {
            TestOutcome::Assertions { name, .. } | TestOutcome::Error { name, .. } => name,
        }
    }

    /// A test succeeds iff it didn't error and every assertion in it is valid.
    pub fn is_success(&self) -> bool {
        match self {
            TestOutcome::Assertions { assertions, .. } => assertions.iter().all(|a| a.valid),
            TestOutcome::Error { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
}

/// One entry of the client's output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Log(LogEntry),
    Test(TestOutcome),
}

struct TestScope {
    name: String,
    assertions: Vec<AssertionOutcome>,
}

#[derive(Default)]
struct ClientState {
    globals: GlobalsStore,
    scopes: Vec<TestScope>,
    output: Vec<Output>,
}

/// Facade shared by the executor and the scripts of one run.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct Client {
    state: Arc<Mutex<ClientState>>,
}

impl Client {
    pub fn new() -> Client {
        Client::default()
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the globals.
    pub fn with_globals<T>(&self, f: impl FnOnce(&mut GlobalsStore) -> T) -> T {
        f(&mut self.state().globals)
    }

    pub fn begin_test(&self, name: impl Into<String>) {
        self.state().scopes.push(TestScope {
            name: name.into(),
            assertions: Vec::new(),
        });
    }

    /// Close the innermost test scope. A failed body replaces the collected assertions with an
    /// error outcome; a body that asserted nothing leaves no outcome.
    pub fn end_test(&self, result: Result<(), String>) {
        let mut state = self.state();
        let Some(scope) = state.scopes.pop() else {
            warn!("end_test called without an open test");
            return;
        };
        let outcome = match result {
            Ok(()) if scope.assertions.is_empty() => return,
            Ok(()) => TestOutcome::Assertions {
                name: scope.name,
                assertions: scope.assertions,
            },
            Err(message) => TestOutcome::Error {
                name: scope.name,
                message,
            },
        };
        state.output.push(Output::Test(outcome));
    }

    /// Close the innermost test scope without an outcome. Used when a fatal error unwinds
    /// through the test, which the caller reports once as an uncaught error.
    pub fn abandon_test(&self) {
        if self.state().scopes.pop().is_none() {
            warn!("abandon_test called without an open test");
        }
    }

    /// Record an assertion in the innermost open test. Fails when no test is open.
    pub fn assert(&self, check: bool, message: impl Into<String>) -> Result<(), ScriptError> {
        let mut state = self.state();
        let Some(scope) = state.scopes.last_mut() else {
            return Err(ScriptError::Host(
                "All assertions should be wrapped by test.".into(),
            ));
        };
        scope.assertions.push(AssertionOutcome {
            valid: check,
            message: (!check).then(|| message.into()),
        });
        Ok(())
    }

    pub fn log(&self, message: impl Into<String>) {
        self.state().output.push(Output::Log(LogEntry {
            message: message.into(),
        }));
    }

    pub fn push_output(&self, output: Output) {
        self.state().output.push(output);
    }

    /// Take everything queued since the last drain.
    pub fn drain_output(&self) -> Vec<Output> {
        let mut state = self.state();
        // Scopes left open by an aborted script must not leak into the next case.
        state.scopes.clear();
        std::mem::take(&mut state.output)
    }

    /// Script value bound to `client`.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("test", self.test_fn()),
            ("assert", self.assert_fn()),
            ("log", self.log_fn()),
            ("global", self.globals_value()),
        ])
    }

    fn test_fn(&self) -> Value {
        let client = self.clone();
        Value::native("test", move |interpreter: &mut Interpreter, _, args| {
            let mut args = args.into_iter();
            let name = args.next().unwrap_or_default().to_display();
            let body = args.next().unwrap_or_default();

            client.begin_test(name);
            match interpreter.call_function(&body, Value::Undefined, Vec::new()) {
                Ok(_) => client.end_test(Ok(())),
                Err(e) if e.is_fatal() => {
                    client.abandon_test();
                    return Err(e);
                }
                Err(e) => client.end_test(Err(e.to_string())),
            }
            Ok(Value::Undefined)
        })
    }

    fn assert_fn(&self) -> Value {
        let client = self.clone();
        Value::native("assert", move |_, _, args| {
            let mut args = args.into_iter();
            let check = args.next().unwrap_or_default().is_truthy();
            let message = args.next().unwrap_or_default().to_display();
            client.assert(check, message)?;
            Ok(Value::Undefined)
        })
    }

    fn log_fn(&self) -> Value {
        let client = self.clone();
        Value::native("log", move |_, _, args| {
            let message = args
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(" ");
            client.log(message);
            Ok(Value::Undefined)
        })
    }

    fn globals_value(&self) -> Value {
        let set = {
            let client = self.clone();
            Value::native("set", move |_, _, args| {
                let mut args = args.into_iter();
                let name = args.next().unwrap_or_default().to_display();
                let value = args.next().unwrap_or_default().try_to_json()?;
                client.with_globals(|globals| {
                    globals.set(name, value.unwrap_or(serde_json::Value::Null))
                });
                Ok(Value::Undefined)
            })
        };
        let get = {
            let client = self.clone();
            Value::native("get", move |_, _, args| {
                let name = args.first().map(Value::to_display).unwrap_or_default();
                Ok(client.with_globals(|globals| {
                    globals.get(&name).map_or(Value::Undefined, Value::from_json)
                }))
            })
        };
        let is_empty = {
            let client = self.clone();
            Value::native("isEmpty", move |_, _, _| {
                Ok(Value::Bool(client.with_globals(|globals| globals.is_empty())))
            })
        };
        let clear = {
            let client = self.clone();
            Value::native("clear", move |_, _, args| {
                let name = args.first().map(Value::to_display).unwrap_or_default();
                client.with_globals(|globals| globals.clear(&name));
                Ok(Value::Undefined)
            })
        };
        let clear_all = {
            let client = self.clone();
            Value::native("clearAll", move |_, _, _| {
                client.with_globals(GlobalsStore::clear_all);
                Ok(Value::Undefined)
            })
        };

        Value::object([
            ("set", set),
            ("get", get),
            ("isEmpty", is_empty),
            ("clear", clear),
            ("clearAll", clear_all),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(client: &Client, source: &str) -> Result<Value, ScriptError> {
        let mut interpreter = Interpreter::new();
        interpreter.define_global("client", client.to_value());
        interpreter.run(source)
    }

    #[test]
    fn test_collects_assertions() -> eyre::Result<()> {
        let client = Client::new();
        run(
            &client,
            r#"
            client.test("status", function () {
                client.assert(true, "unused")
                client.assert(1 === 2, "numbers differ")
            })
            "#,
        )?;

        assert_eq!(
            client.drain_output(),
            vec![Output::Test(TestOutcome::Assertions {
                name: "status".into(),
                assertions: vec![
                    AssertionOutcome {
                        valid: true,
                        message: None
                    },
                    AssertionOutcome {
                        valid: false,
                        message: Some("numbers differ".into())
                    },
                ],
            })]
        );
        assert!(client.drain_output().is_empty());
        Ok(())
    }

    #[test]
    fn assert_outside_test_throws() {
        let client = Client::new();
        let result = run(&client, "client.assert(false, 'x')");
        assert_eq!(
            result.err(),
            Some(ScriptError::Host(
                "All assertions should be wrapped by test.".into()
            ))
        );
        assert!(client.drain_output().is_empty());
    }

    #[test]
    fn assert_outside_test_is_catchable() -> eyre::Result<()> {
        let client = Client::new();
        let value = run(
            &client,
            "let m; try { client.assert(true, 'x') } catch (e) { m = e.message }; m",
        )?;
        assert_eq!(value.to_display(), "All assertions should be wrapped by test.");
        Ok(())
    }

    #[test]
    fn throwing_body_records_error_instead_of_assertions() -> eyre::Result<()> {
        let client = Client::new();
        run(
            &client,
            r#"
            client.test("boom", () => {
                client.assert(true, "a")
                throw new Error("bad body")
            })
            client.test("after", () => client.assert(true, "b"))
            "#,
        )?;

        let output = client.drain_output();
        assert_eq!(output.len(), 2);
        assert_eq!(
            output[0],
            Output::Test(TestOutcome::Error {
                name: "boom".into(),
                message: "Error: bad body".into(),
            })
        );
        assert!(matches!(&output[1], Output::Test(t) if t.name() == "after" && t.is_success()));
        Ok(())
    }

    #[test]
    fn test_without_assertions_records_nothing() -> eyre::Result<()> {
        let client = Client::new();
        run(&client, "client.test('empty', () => {})")?;
        assert!(client.drain_output().is_empty());
        Ok(())
    }

    #[test]
    fn nested_tests_assert_into_innermost() -> eyre::Result<()> {
        let client = Client::new();
        run(
            &client,
            r#"
            client.test("outer", () => {
                client.test("inner", () => client.assert(false, "inner failed"))
                client.assert(true, "outer ok")
            })
            "#,
        )?;
        let output = client.drain_output();
        let names: Vec<_> = output
            .iter()
            .filter_map(|o| match o {
                Output::Test(t) => Some((t.name().to_string(), t.is_success())),
                Output::Log(_) => None,
            })
            .collect();
        assert_eq!(
            names,
            vec![("inner".to_string(), false), ("outer".to_string(), true)]
        );
        Ok(())
    }

    #[test]
    fn log_is_independent_of_tests() -> eyre::Result<()> {
        let client = Client::new();
        run(
            &client,
            "client.log('top'); client.test('t', () => { client.log('inside', 1) })",
        )?;
        assert_eq!(
            client.drain_output(),
            vec![
                Output::Log(LogEntry {
                    message: "top".into()
                }),
                Output::Log(LogEntry {
                    message: "inside 1".into()
                }),
            ]
        );
        Ok(())
    }

    #[test]
    fn globals_round_trip_through_scripts() -> eyre::Result<()> {
        let client = Client::new();
        run(
            &client,
            r#"
            client.global.set("token", "abc")
            client.global.set("ids", [1, 2])
            "#,
        )?;
        assert_eq!(
            client.with_globals(|g| g.get("token").cloned()),
            Some(serde_json::json!("abc"))
        );

        let value = run(
            &client,
            r#"
            const before = client.global.get("ids").length
            client.global.clear("ids")
            const cleared = client.global.get("ids") === undefined
            client.global.clearAll()
            ;[before, cleared, client.global.isEmpty()]
            "#,
        )?;
        assert_eq!(value.to_json(), Some(serde_json::json!([2, true, true])));
        Ok(())
    }

    #[test]
    fn operation_limit_is_not_swallowed_by_test() {
        let client = Client::new();
        let result = run(&client, "client.test('spin', () => { while (true) {} })");
        assert!(matches!(result, Err(ScriptError::OperationLimit(_))));
        assert_eq!(client.drain_output(), vec![]);
    }

    #[test]
    fn fatal_error_in_nested_tests_leaves_no_outcomes() {
        let client = Client::new();
        let result = run(
            &client,
            r#"
            client.test("outer", () => {
                client.assert(true, "before")
                client.test("inner", () => { while (true) {} })
            })
            "#,
        );
        assert!(matches!(result, Err(ScriptError::OperationLimit(_))));
        // Both scopes are closed, so an assert outside a test still fails.
        assert!(client.assert(true, "after").is_err());
        assert_eq!(client.drain_output(), vec![]);
    }
}
