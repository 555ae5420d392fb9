//! # httprunner
//!
//! Runs the requests of `.http` files in order and checks each response with the assertion
//! script embedded next to the request.
//!
//! ```text
//! ### Create user
//! POST {{host}}/users
//! Content-Type: application/json
//!
//! { "name": "alice" }
//!
//! > {%
//! client.test("created", () => client.assert(response.status === 201, "status"))
//! client.global.set("userId", response.body.id)
//! %}
//! ```
//!
//! ```text
//! $ httprunner --client-file rest-client.env.json --selected-client dev users.http
//! .
//!
//! Assertions: 1
//! ```
mod app;

// Re-export error handling crates for user convenience
pub use eyre;

pub use app::{App, Color};

// Re-export core functionality
pub use httprunner_core::{
    config::{ClientConfig, Variables},
    reporter::{DotReporter, ListReporter, NullReporter, Reporter, ReporterType},
    runner::{self, Options, Report, Runner, Summary},
};
