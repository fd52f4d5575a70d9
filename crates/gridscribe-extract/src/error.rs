use thiserror::Error;

/// Request-level failures. Anything wrong with the workbook content itself is
/// reported as a [`gridscribe_common::Diagnostic`] instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid value for option `{option}`: {message}")]
    InvalidOption {
        option: &'static str,
        message: String,
    },
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("failed to parse options as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl ExtractError {
    pub(crate) fn invalid(option: &'static str, message: impl Into<String>) -> Self {
        ExtractError::InvalidOption {
            option,
            message: message.into(),
        }
    }
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
