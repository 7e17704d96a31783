use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid channel key: {0}")]
    Key(#[from] KeyError),
    #[error("validation error: {0}")]
    Validation(String),
}

/// A channel identifier that cannot be represented as a [`crate::ChannelKey`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{field} is empty")]
    Empty { field: &'static str },
    #[error("{field} '{value}' exceeds {max} bytes")]
    TooLong {
        field: &'static str,
        value: String,
        max: usize,
    },
    #[error("{field} '{value}' contains invalid characters")]
    InvalidCharacter { field: &'static str, value: String },
    #[error("expected 4 '.'-separated tokens in '{input}', found {found}")]
    TokenCount { input: String, found: usize },
}
