use std::path::PathBuf;

use httprunner_script::ScriptError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `{{name}}` placeholder that neither the globals nor the client configuration define.
    #[error("missing variable {0}")]
    MissingVariable(String),
    /// The guest script failed outside of any `client.test`.
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    /// The response declared `application/json` but its body isn't valid JSON.
    #[error("failed to parse response body: {0}")]
    ResponseParse(#[from] serde_json::Error),
    /// Occurs when the client file can't be loaded or the selected client doesn't exist.
    #[error("failed to load client configuration: {0}")]
    Config(String),
    #[error("invalid uri \"{uri}\": {source}")]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },
    #[error("invalid header \"{0}\"")]
    InvalidHeader(String),
    #[error("invalid method \"{0}\"")]
    InvalidMethod(String),
    #[error("exceeded the limit of {0} redirects")]
    TooManyRedirects(usize),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
