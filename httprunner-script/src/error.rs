/// Errors surfaced by the script sandbox.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// The source could not be tokenized or parsed.
    #[error("SyntaxError: {message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ReferenceError: {0}")]
    Reference(String),
    /// A value thrown by the script that nothing caught.
    #[error("{0}")]
    Uncaught(String),
    /// Raised by a host binding such as `client.assert`.
    #[error("{0}")]
    Host(String),
    #[error("script exceeded the limit of {0} operations")]
    OperationLimit(u64),
    #[error("maximum call depth of {0} exceeded")]
    CallDepth(usize),
}

impl ScriptError {
    /// Limit violations abort the whole run and can't be caught by the script.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScriptError::OperationLimit(_) | ScriptError::CallDepth(_)
        )
    }

    /// Name of the error as seen from the script (`e.name`).
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Syntax { .. } => "SyntaxError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Reference(_) => "ReferenceError",
            ScriptError::Uncaught(_) | ScriptError::Host(_) => "Error",
            ScriptError::OperationLimit(_) | ScriptError::CallDepth(_) => "RangeError",
        }
    }

    /// Message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            ScriptError::Syntax { message, .. } => message.clone(),
            ScriptError::Type(m)
            | ScriptError::Reference(m)
            | ScriptError::Uncaught(m)
            | ScriptError::Host(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
