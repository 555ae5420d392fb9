//! # httprunner Core
//!
//! Core functionality for httprunner, a test runner for `.http` request files.
//!
//! This crate provides:
//! - The `.http` file parser
//! - `{{name}}` substitution and the sandbox running assertion scripts
//! - The HTTP transport and the per-case executor (body construction, redirects)
//! - The sequential runner and its reporters
//! - Client configuration loading
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | .http files         | ---> | parser              | ---> | runner (pipeline)   |
//! | requests + scripts  |      | TestCase records    |      | one case at a time  |
//! +---------------------+      +---------------------+      +---------------------+
//!                                                                |            |
//!                                                                v            v
//! +---------------------+      +---------------------+      +---------------------+
//! | client file + env   | ---> | VariableContext     | <--- | executor            |
//! | static variables    |      | {{name}} + sandbox  |      | HTTP exchange       |
//! +---------------------+      +---------------------+      +---------------------+
//!                                        |                              |
//!                                        v                              v
//!                              +---------------------+      +---------------------+
//!                              | client + globals    | ---> | reporter (output)   |
//!                              | test/assert/log     |      | Dot/List/Null       |
//!                              +---------------------+      +---------------------+
//! ```
//!
//! Most users should use the `httprunner` binary rather than this crate directly.
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod globals;
pub mod http;
pub mod parser;
pub mod reporter;
pub mod response;
pub mod runner;

// Re-export error handling crates
pub use eyre;

pub use client::Client;
pub use config::{ClientConfig, Variables};
pub use context::VariableContext;
pub use error::{Error, Result};
pub use parser::TestCase;
pub use reporter::{DotReporter, ListReporter, NullReporter, Reporter, ReporterType};
pub use runner::{Options, Report, Runner, Summary};
