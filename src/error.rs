use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

#[derive(Debug, Error)]
pub enum TagfigError {
    #[error("field {path} is not public but carries a {stage} annotation")]
    UnexportedFieldTagged { path: String, stage: Stage },

    #[error("field {path} of type {type_name} does not support a {stage} annotation")]
    UnsupportedFieldKind {
        path: String,
        type_name: &'static str,
        stage: Stage,
    },

    #[error("field {path}: value '{raw}' is not a number")]
    NotANumber { path: String, raw: String },

    #[error("field {path}: default func $({name}) returned a value of the wrong type")]
    DefaultFuncTypeMismatch { path: String, name: String },

    #[error("field {path}: no {registry} func registered as $({name})")]
    UnknownFunction {
        path: String,
        name: String,
        registry: &'static str,
    },

    #[error("field {path}: conf option skipzero cannot be combined with a default")]
    SkipZeroWithDefault { path: String },

    #[error("env {name} not found (field {path})")]
    EnvVarMissing { path: String, name: String },

    #[error("field {path}: command '{command}' was never registered")]
    CommandNotRegistered { path: String, command: String },

    #[error("command '{command}' is already registered")]
    DuplicateCommand { command: String },

    #[error("field {path}: invalid modifier '{modifier}' on cmd annotation")]
    InvalidCommandModifier { path: String, modifier: String },

    #[error("field {path}: 'cflag' and 'cmd' annotations must both be present")]
    FlagAndCommandTagMismatch { path: String },

    #[error("flag --{flag} conflicts with an existing definition: {reason}")]
    FlagConflict { flag: String, reason: String },

    #[error("flags for {type_name} were never registered")]
    FlagsNotRegistered { type_name: &'static str },

    #[cfg(feature = "clap")]
    #[error("Failed to parse command-line flags: {0}")]
    FlagParse(#[from] clap::Error),

    #[error("field {path}: regexp {pattern} failed to compile: {source}")]
    RegexCompileFailure {
        path: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("field {path}: invalid test '{expression}': {reason}")]
    InvalidTestOperator {
        path: String,
        expression: String,
        reason: String,
    },

    #[error("field {path}: test operator {op} is not supported on {kind} values")]
    UnsupportedTestKind {
        path: String,
        op: String,
        kind: String,
    },

    #[error("field {path}: value {actual} !{op} {expected}")]
    TestAssertionFailed {
        path: String,
        op: String,
        expected: String,
        actual: String,
    },

    #[error("field {path}: value !$({name})")]
    PredicateFailed { path: String, name: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Failure to turn a raw string into a primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
}

impl CoerceError {
    pub(crate) fn at(self, path: impl Into<String>) -> TagfigError {
        match self {
            Self::NotANumber(raw) => TagfigError::NotANumber {
                path: path.into(),
                raw,
            },
        }
    }
}

impl TagfigError {
    /// The dotted field path the error refers to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnexportedFieldTagged { path, .. }
            | Self::UnsupportedFieldKind { path, .. }
            | Self::NotANumber { path, .. }
            | Self::DefaultFuncTypeMismatch { path, .. }
            | Self::UnknownFunction { path, .. }
            | Self::SkipZeroWithDefault { path }
            | Self::EnvVarMissing { path, .. }
            | Self::CommandNotRegistered { path, .. }
            | Self::InvalidCommandModifier { path, .. }
            | Self::FlagAndCommandTagMismatch { path }
            | Self::RegexCompileFailure { path, .. }
            | Self::InvalidTestOperator { path, .. }
            | Self::UnsupportedTestKind { path, .. }
            | Self::TestAssertionFailed { path, .. }
            | Self::PredicateFailed { path, .. } => Some(path),
            _ => None,
        }
    }

    /// True for failures produced by evaluating a test annotation, the only
    /// kind that `testwarn` may downgrade.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            Self::TestAssertionFailed { .. } | Self::PredicateFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_failure_names_field_operator_and_operand() {
        let err = TagfigError::TestAssertionFailed {
            path: "server.port".into(),
            op: ">=".into(),
            expected: "1024".into(),
            actual: "80".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("server.port"));
        assert!(msg.contains(">="));
        assert!(msg.contains("1024"));
        assert!(msg.contains("80"));
    }

    #[test]
    fn env_missing_formats() {
        let err = TagfigError::EnvVarMissing {
            path: "port".into(),
            name: "APP_PORT".into(),
        };
        assert_eq!(err.to_string(), "env APP_PORT not found (field port)");
    }

    #[test]
    fn path_is_exposed() {
        let err = TagfigError::SkipZeroWithDefault {
            path: "inner.count".into(),
        };
        assert_eq!(err.path(), Some("inner.count"));
        let err = TagfigError::FlagsNotRegistered { type_name: "Config" };
        assert_eq!(err.path(), None);
    }

    #[test]
    fn only_evaluation_failures_are_test_failures() {
        let err = TagfigError::PredicateFailed {
            path: "expiration".into(),
            name: "validduration".into(),
        };
        assert!(err.is_test_failure());
        let err = TagfigError::InvalidTestOperator {
            path: "port".into(),
            expression: "!1".into(),
            reason: "invalid test operation".into(),
        };
        assert!(!err.is_test_failure());
    }

    #[test]
    fn coerce_error_gains_path() {
        let err = CoerceError::NotANumber("abc".into()).at("server.port");
        assert!(matches!(
            err,
            TagfigError::NotANumber { ref path, ref raw } if path == "server.port" && raw == "abc"
        ));
    }
}
