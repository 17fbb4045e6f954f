use std::path::PathBuf;

use thiserror::Error;

use crate::schedule::ScheduleError;

/// Errors raised while loading module descriptors or reading module properties.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The descriptor or settings file could not be read or parsed.
    #[error("failed to load {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// The modules directory could not be listed.
    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required property is absent.
    #[error("missing required property `{key}`")]
    Missing { key: String },

    /// A property is present but holds a different semantic type.
    #[error("property `{key}` expected to be {expected} but {found} found")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A property holds a value that is neither string, integer nor boolean.
    #[error("property `{key}` holds an unsupported {found} value; string, integer and boolean are supported")]
    UnsupportedValue { key: String, found: &'static str },
}

/// Fatal startup errors. Every variant is detected before the scheduler loop starts.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Descriptor(#[from] ConfigError),

    #[error("module {instance} configuration is invalid: {source}")]
    Config {
        instance: String,
        #[source]
        source: ConfigError,
    },

    #[error("module `{module}` is not registered")]
    UnknownModule { module: String },

    #[error("module `{module}` is registered more than once")]
    DuplicateModule { module: String },

    #[error("instance name `{instance}` is declared by more than one descriptor")]
    DuplicateInstance { instance: String },

    #[error("module {instance} failed to initialize: {error:#}")]
    Module {
        instance: String,
        error: anyhow::Error,
    },

    #[error("parsing cron expression `{expression}` for {method} failed: {source}")]
    InvalidSchedule {
        method: String,
        expression: String,
        #[source]
        source: ScheduleError,
    },
}

impl HostError {
    /// Classify a constructor failure: property errors stay configuration errors,
    /// anything else is a module error.
    pub(crate) fn from_construct(instance: &str, error: anyhow::Error) -> Self {
        match error.downcast::<ConfigError>() {
            Ok(source) => HostError::Config {
                instance: instance.to_string(),
                source,
            },
            Err(error) => HostError::Module {
                instance: instance.to_string(),
                error,
            },
        }
    }
}
