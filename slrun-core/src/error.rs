// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for slrun.
//!
//! One explicit enum per concern, composed into [`SlrunError`].
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ContainerId, FunctionId, ImageTag};

/// Top-level error type for the slrun runtime.
#[derive(Debug, Error)]
pub enum SlrunError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Function Table Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Function not found: {0}")]
    FunctionNotFound(FunctionId),

    #[error("Function already exists: {0}")]
    FunctionAlreadyExists(FunctionId),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Invocation error: {0}")]
    Invoke(#[from] InvokeError),

    #[error("Container engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Cannot create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors abort startup.
/// Used when configuration is invalid and the runtime cannot safely start.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Duplicate function name: {name}")]
    DuplicateFunctionName { name: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// State transition errors for the function state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for function {function_id}")]
    InvalidTransition {
        function_id: FunctionId,
        from: &'static str,
        to: &'static str,
    },
}

/// Kind of engine object an operation referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineResource {
    Image,
    Container,
}

impl fmt::Display for EngineResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Container => write!(f, "container"),
        }
    }
}

/// Errors reported by a container engine implementation.
///
/// `NotFound` is a structured classification: callers decide whether a
/// missing object is expected by matching on the variant.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No such {resource}: {id}")]
    NotFound { resource: EngineResource, id: String },

    #[error("Cannot connect to container engine: {reason}")]
    Connection { reason: String },

    #[error("Engine operation '{operation}' failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("Image build for {image} failed: {message}")]
    BuildFailed { image: ImageTag, message: String },

    #[error("Container {container} does not publish port {port}/tcp")]
    PortNotPublished { container: ContainerId, port: u16 },

    #[error("Container {container} exited right after start")]
    ContainerExited { container: ContainerId },
}

impl EngineError {
    /// Whether this error reports a missing image or container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Image build errors. Any of these aborts the startup sequence.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Cannot package build context for {function} from {path}: {source}")]
    Context {
        function: FunctionId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine rejected build of {function}: {source}")]
    Engine {
        function: FunctionId,
        #[source]
        source: EngineError,
    },
}

/// A single container that could not be stopped.
#[derive(Debug)]
pub struct StopFailure {
    pub function: FunctionId,
    pub container: ContainerId,
    pub error: EngineError,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.function, self.container, self.error)
    }
}

fn join_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reconciliation errors. Fatal for the current pass, never retried.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Cannot observe running containers: {0}")]
    Observe(#[source] EngineError),

    #[error("Function {function} has no image; build it before starting")]
    NotBuilt { function: FunctionId },

    #[error("Cannot stop stale container {container} of {function}: {source}")]
    Converge {
        function: FunctionId,
        container: ContainerId,
        #[source]
        source: EngineError,
    },

    #[error("Cannot start function {function}: {source}")]
    Start {
        function: FunctionId,
        #[source]
        source: EngineError,
    },

    #[error("{count} function(s) failed to stop: {details}", count = .failures.len(), details = join_failures(.failures))]
    StopFailed { failures: Vec<StopFailure> },

    #[error("Function {0} is not registered")]
    Unregistered(FunctionId),

    #[error(transparent)]
    State(#[from] StateTransitionError),
}

/// Invocation errors. All are recoverable at the caller's discretion.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Function {0} not found")]
    NotFound(String),

    #[error("Function {0} is not running")]
    NotRunning(FunctionId),

    #[error("Call to function {function} failed: {source}")]
    Transport {
        function: FunctionId,
        #[source]
        source: reqwest::Error,
    },
}

/// Result type alias using SlrunError.
pub type SlrunResult<T> = Result<T, SlrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::MissingRequiredField {
            field: "build_dir",
            context: "function 'echo'".to_string(),
        };
        assert!(err.to_string().contains("build_dir"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn test_error_chain() {
        let validation_err = HardValidationError::InvalidPort {
            port: 0,
            reason: "Port must be non-zero".to_string(),
        };
        let err: SlrunError = validation_err.into();
        assert!(matches!(err, SlrunError::HardValidation(_)));
    }

    #[test]
    fn test_not_found_classification() {
        let missing = EngineError::NotFound {
            resource: EngineResource::Image,
            id: "slrun-echo".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "No such image: slrun-echo");

        let other = EngineError::Api {
            operation: "remove_image",
            message: "conflict".to_string(),
        };
        assert!(!other.is_not_found());
    }

    #[test]
    fn test_stop_failed_lists_every_function() {
        let failures = vec![
            StopFailure {
                function: FunctionId::new("alpha").unwrap(),
                container: ContainerId::new("c1"),
                error: EngineError::Connection {
                    reason: "socket closed".to_string(),
                },
            },
            StopFailure {
                function: FunctionId::new("beta").unwrap(),
                container: ContainerId::new("c2"),
                error: EngineError::Connection {
                    reason: "socket closed".to_string(),
                },
            },
        ];
        let err = ReconcileError::StopFailed { failures };
        let message = err.to_string();
        assert!(message.starts_with("2 function(s) failed to stop"));
        assert!(message.contains("alpha (c1)"));
        assert!(message.contains("beta (c2)"));
    }
}
