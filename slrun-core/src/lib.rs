// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! slrun Core Library
//!
//! Minimal function runtime. Each configured function is a source tree that
//! is packaged, built into a container image, run as exactly one container
//! published on loopback, and invoked by name over HTTP.
//!
//! Layers, leaves first:
//! - [`packager`]: streamed tar build context
//! - [`builder`]: image replacement through the engine
//! - [`reconciler`]: observe, converge, start and stop containers
//! - [`router`]: name to endpoint resolution and HTTP forwarding
//! - [`runtime`]: the context object tying them together

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod packager;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, FunctionConfig, RuntimeConfig};
pub use engine::{ContainerEngine, DockerEngine};
pub use error::{
    BuildError, EngineError, HardValidationError, InvokeError, ReconcileError, SlrunError,
    SlrunResult,
};
pub use registry::{FunctionRegistry, FunctionStatus};
pub use router::{Invocation, InvocationResponse};
pub use runtime::Runtime;
pub use state::{FunctionState, FunctionStateMachine};
pub use types::{ContainerId, Endpoint, FunctionId, ImageTag, Port};
