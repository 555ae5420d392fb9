//! # Configuration Module
//!
//! Loads the client file, a JSON object mapping client (profile) names to variable maps:
//!
//! ```json
//! {
//!   "dev": { "host": "http://localhost:8080", "token": "dev-token" },
//!   "staging": { "host": "https://staging.example.com" }
//! }
//! ```
//!
//! ## Loading flow (block diagram)
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | --client-file     | --> | JSON parser       | --> | ClientConfig      |
//! | rest-client.env.. |     | (deserialization) |     | profiles{}        |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!          +---------------------------------------------------+
//!          v
//! +-------------------+     +-------------------+     +-------------------+
//! | .env + env vars   | --> | HTTPRUNNER_*      | --> | Merged into       |
//! | HTTPRUNNER_KEY=.. |     | HTTPRUNNER_DEV_*  |     | profile variables |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//!                                                    +-------------------+
//!                                                    | --selected-client |
//!                                                    | -> Variables      |
//!                                                    +-------------------+
//! ```
//!
//! `HTTPRUNNER_<KEY>` applies to every client, `HTTPRUNNER_<CLIENT>_<KEY>` only to `<client>`.
//! Keys are lowercased and environment values win over the file.
use indexmap::IndexMap;
use std::path::Path;
use tracing::*;

use crate::{Error, Result};

/// Static variables of the selected client.
pub type Variables = IndexMap<String, serde_json::Value>;

pub const DEFAULT_CLIENT_FILE: &str = "rest-client.env.json";

const PREFIX: &str = "HTTPRUNNER";

/// Environment variables read by the CLI itself rather than merged as client variables.
const RESERVED_ENV: &[&str] = &["HTTPRUNNER_COLOR"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub profiles: IndexMap<String, Variables>,
    /// Variables from `HTTPRUNNER_<KEY>`, used when no client is selected.
    pub global: Variables,
}

impl ClientConfig {
    /// Load `.env`, then the client file at `path`. A missing file is an empty configuration
    /// unless `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<ClientConfig> {
        let _ = dotenv::dotenv();
        let mut cfg = ClientConfig::load_from(path, required)?;
        cfg.load_env(std::env::vars());
        Ok(cfg)
    }

    fn load_from(path: &Path, required: bool) -> Result<ClientConfig> {
        let buf = match std::fs::read_to_string(path) {
            Ok(buf) => buf,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using an empty configuration", path.display());
                return Ok(ClientConfig::default());
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let cfg = ClientConfig::parse(&buf).map_err(|e| {
            Error::Config(format!("{}: {e}", path.display()))
        })?;
        debug!("{} was successfully loaded: {cfg:#?}", path.display());
        Ok(cfg)
    }

    pub fn parse(json: &str) -> Result<ClientConfig> {
        let profiles: IndexMap<String, Variables> = serde_json::from_str(json).map_err(|e| {
            Error::Config(format!("failed to deserialize the client file: {e}"))
        })?;
        Ok(ClientConfig {
            profiles,
            global: Variables::new(),
        })
    }

    /// Merge `HTTPRUNNER_*` variables: file < global env < client env.
    fn load_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        let global_prefix = format!("{PREFIX}_");
        let mut profile_prefixes: Vec<_> = self
            .profiles
            .keys()
            .map(|name| (name.clone(), format!("{PREFIX}_{}_", name.to_uppercase())))
            .collect();
        // `dev_api` must win over `dev` for `HTTPRUNNER_DEV_API_*`.
        profile_prefixes.sort_by(|(_, a), (_, b)| b.len().cmp(&a.len()));

        let mut profile_vars: IndexMap<String, Variables> = IndexMap::new();
        for (key, value) in vars {
            if RESERVED_ENV.contains(&key.as_str()) {
                continue;
            }
            let scoped = profile_prefixes.iter().find_map(|(name, prefix)| {
                key.strip_prefix(prefix.as_str()).map(|rest| (name, rest))
            });
            if let Some((name, rest)) = scoped {
                profile_vars
                    .entry(name.clone())
                    .or_default()
                    .insert(rest.to_lowercase(), serde_json::Value::String(value));
            } else if let Some(rest) = key.strip_prefix(&global_prefix) {
                self.global
                    .insert(rest.to_lowercase(), serde_json::Value::String(value));
            }
        }

        for (name, profile) in &mut self.profiles {
            profile.extend(self.global.clone());
            if let Some(vars) = profile_vars.shift_remove(name) {
                profile.extend(vars);
            }
        }

        debug!("client configuration loaded from env: {self:#?}");
    }

    /// Variables for the selected client. Unknown clients are an error.
    pub fn variables(&self, selected: Option<&str>) -> Result<Variables> {
        match selected {
            Some(name) => self.profiles.get(name).cloned().ok_or_else(|| {
                Error::Config(format!("client \"{name}\" not found in the client file"))
            }),
            None => Ok(self.global.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;
    use test_case::test_case;

    const SAMPLE: &str = r#"{
        "dev": { "host": "http://localhost", "port": 8080 },
        "staging": { "host": "https://staging.example.com" }
    }"#;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_profiles() -> eyre::Result<()> {
        let cfg = ClientConfig::parse(SAMPLE)?;
        assert_eq!(cfg.profiles.len(), 2);
        let dev = cfg.variables(Some("dev"))?;
        assert_eq!(dev.get("host"), Some(&json!("http://localhost")));
        assert_eq!(dev.get("port"), Some(&json!(8080)));
        Ok(())
    }

    #[test]
    fn unknown_client_is_config_error() -> eyre::Result<()> {
        let cfg = ClientConfig::parse(SAMPLE)?;
        let result = cfg.variables(Some("prod"));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("prod")));
        Ok(())
    }

    #[test]
    fn no_selection_is_empty() -> eyre::Result<()> {
        let cfg = ClientConfig::parse(SAMPLE)?;
        assert!(cfg.variables(None)?.is_empty());
        Ok(())
    }

    #[test_case("[]"; "not an object")]
    #[test_case(r#"{"dev": 1}"#; "profile not an object")]
    #[test_case("{"; "truncated")]
    fn malformed_file_is_config_error(json: &str) {
        assert!(matches!(ClientConfig::parse(json), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_file() -> eyre::Result<()> {
        let mut cfg = ClientConfig::parse(SAMPLE)?;
        cfg.load_env(env(&[
            ("HTTPRUNNER_TOKEN", "global-token"),
            ("HTTPRUNNER_HOST", "http://global"),
            ("HTTPRUNNER_DEV_HOST", "http://dev-env"),
            ("HTTPRUNNER_COLOR", "never"),
            ("PATH", "/usr/bin"),
        ]));

        let dev = cfg.variables(Some("dev"))?;
        assert_eq!(dev.get("host"), Some(&json!("http://dev-env")));
        assert_eq!(dev.get("token"), Some(&json!("global-token")));
        assert_eq!(dev.get("port"), Some(&json!(8080)));

        let staging = cfg.variables(Some("staging"))?;
        assert_eq!(staging.get("host"), Some(&json!("http://global")));

        let global = cfg.variables(None)?;
        assert_eq!(global.get("token"), Some(&json!("global-token")));
        assert_eq!(global.get("color"), None);
        assert_eq!(global.get("dev_host"), None);
        Ok(())
    }

    #[test]
    fn env_goes_to_the_longest_matching_client() -> eyre::Result<()> {
        let mut cfg = ClientConfig::parse(r#"{"dev": {}, "dev_api": {}}"#)?;
        cfg.load_env(env(&[
            ("HTTPRUNNER_DEV_API_HOST", "http://api"),
            ("HTTPRUNNER_DEV_HOST", "http://dev"),
        ]));

        let dev = cfg.variables(Some("dev"))?;
        assert_eq!(dev.get("host"), Some(&json!("http://dev")));
        assert_eq!(dev.get("api_host"), None);

        let api = cfg.variables(Some("dev_api"))?;
        assert_eq!(api.get("host"), Some(&json!("http://api")));
        Ok(())
    }

    #[test]
    #[serial]
    fn missing_default_file_is_empty() -> eyre::Result<()> {
        let cfg = ClientConfig::load(Path::new("/nonexistent/rest-client.env.json"), false)?;
        assert!(cfg.profiles.is_empty());
        Ok(())
    }

    #[test]
    fn missing_required_file_is_error() {
        let result = ClientConfig::load_from(Path::new("/nonexistent/client.json"), true);
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("/nonexistent/client.json")));
    }

    #[test]
    #[serial]
    fn load_from_file_and_env() -> eyre::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(SAMPLE.as_bytes())?;

        std::env::set_var("HTTPRUNNER_STAGING_API_KEY", "secret");
        let cfg = ClientConfig::load(file.path(), true);
        std::env::remove_var("HTTPRUNNER_STAGING_API_KEY");

        let staging = cfg?.variables(Some("staging"))?;
        assert_eq!(staging.get("api_key"), Some(&json!("secret")));
        Ok(())
    }
}
