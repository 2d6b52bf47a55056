use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable '{name}': {hint}")]
    MissingVariable { name: String, hint: String },

    #[error("Invalid value '{value}' for '{name}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load environment file {}: {reason}", path.display())]
    EnvFile { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn missing(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingVariable {
            name: name.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn env_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::EnvFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
