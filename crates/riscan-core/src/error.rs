use std::path::PathBuf;

/// Errors that can occur across riscan.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use riscan_core::{ErrorKind, RiError};
///
/// let err = RiError::InvalidParameter("overlap must be smaller than chunk size".into());
/// assert_eq!(err.kind(), ErrorKind::InvalidParameter);
/// assert!(err.to_string().contains("overlap"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RiError {
    /// A numeric parameter or configuration value is out of range.
    #[error("invalid parameter: {0}")]
    #[diagnostic(
        code(riscan::invalid_parameter),
        help("check the [search] section of your .riscan.toml")
    )]
    InvalidParameter(String),

    /// An injected collaborator (lemmatizer, embedder) failed.
    #[error("{dependency} failed: {message}")]
    #[diagnostic(code(riscan::external_dependency))]
    ExternalDependency {
        /// Name of the failing collaborator (e.g. `"embedder"`).
        dependency: String,
        /// Failure detail as reported by the collaborator.
        message: String,
    },

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(riscan::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(riscan::config))]
    Config(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(riscan::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(riscan::toml))]
    Toml(#[from] toml::de::Error),

    /// Embedding cache failure.
    #[error("database error: {0}")]
    #[diagnostic(code(riscan::database))]
    Database(String),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(riscan::file_not_found))]
    FileNotFound(PathBuf),
}

/// Coarse classification of an [`RiError`], for callers deciding whether to
/// skip a document or abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed parameters. Unrecoverable.
    InvalidParameter,
    /// An injected collaborator failed. The caller owns any retry policy.
    ExternalDependency,
    /// Anything raised while reading or writing files and caches.
    Storage,
    /// Configuration could not be loaded.
    Config,
}

impl RiError {
    /// Build an [`RiError::ExternalDependency`] from any displayable error.
    pub fn external(dependency: &str, message: impl std::fmt::Display) -> Self {
        RiError::ExternalDependency {
            dependency: dependency.to_string(),
            message: message.to_string(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            RiError::ExternalDependency { .. } => ErrorKind::ExternalDependency,
            RiError::Io(_)
            | RiError::Serialization(_)
            | RiError::Database(_)
            | RiError::FileNotFound(_) => ErrorKind::Storage,
            RiError::Config(_) | RiError::Toml(_) => ErrorKind::Config,
        }
    }
}
