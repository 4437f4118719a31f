use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriplError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Cannot retract ({entity}, {attribute}, {value}): no such triple")]
    MissingTriple {
        entity: String,
        attribute: String,
        value: String,
    },
    #[error("Pattern {pattern} matched {matches} entities where exactly one was expected")]
    AmbiguousPattern { pattern: String, matches: usize },
    #[error("No entity {0} in the store")]
    UnknownEntity(String),
    #[error("Pattern {pattern} matched no entity")]
    NoMatch { pattern: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TriplError>;

impl TriplError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

// Helper conversions
impl From<serde_json::Error> for TriplError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(e.to_string())
    }
}
impl From<std::io::Error> for TriplError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<::config::ConfigError> for TriplError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
