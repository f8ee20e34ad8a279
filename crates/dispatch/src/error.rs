//! Error types of the dispatch core.
//!
//! Configuration mistakes (bad patterns, compiling twice, matching before compiling) are
//! reported as [`RouterError`] at startup. Failures raised by handlers and filters travel as
//! [`BoxError`] and are turned into replies by an [`ErrorHandler`](crate::ErrorHandler) at the
//! outermost boundary.

use std::error::Error;
use thiserror::Error;

/// Error type produced by handlers and filters.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("router has already been compiled")]
    AlreadyCompiled,

    #[error("router must be compiled before routes can be matched")]
    NotCompiled,

    #[error("duplicate path parameter '{name}' in pattern '{pattern}'")]
    DuplicateParam { pattern: String, name: String },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid regex in route pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("controller '{controller}' has no handler named '{handler}'")]
    UnknownHandler { controller: String, handler: String },

    #[error("no extractor registered for marker '{marker}' (parameter '{param}' of {controller}::{handler})")]
    UnresolvedMarker { marker: String, param: String, controller: String, handler: String },
}

impl RouterError {
    pub(crate) fn invalid_pattern<P: Into<String>, R: Into<String>>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern { pattern: pattern.into(), reason: reason.into() }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompletionError {
    #[error("result has already been published for this request")]
    AlreadyPublished,

    #[error("no party is waiting for the result anymore")]
    Detached,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown completion mode '{0}', expected 'blocking' or 'native'")]
    UnknownCompletionMode(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("malformed dispatch config: {0}")]
    Malformed(#[from] serde_json::Error),
}
