// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Runtime context.
//!
//! Owns the function table, the engine handle and the invocation client,
//! and sequences builds, reconciliation passes and invocations against
//! each other.
//!
//! Lifecycle operations (`build*`, `start`, `stop`, `teardown`) take the
//! write side of a phase lock, so at most one runs at a time. Invocations
//! take the read side only while resolving an endpoint; the call itself
//! runs unlocked, so slow functions never hold up a pass.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::builder::ImageBuilder;
use crate::config::{Config, RuntimeConfig};
use crate::engine::ContainerEngine;
use crate::error::{InvokeError, SlrunError, SlrunResult, StateTransitionError};
use crate::reconciler::Reconciler;
use crate::registry::{FunctionRegistry, FunctionStatus};
use crate::router::{self, Invocation, InvocationResponse, Invoker};
use crate::state::FunctionState;
use crate::types::{FunctionId, ImageTag};

pub struct Runtime {
    config: RuntimeConfig,
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<FunctionRegistry>,
    invoker: Invoker,
    phase: RwLock<()>,
}

impl Runtime {
    /// Register every configured function (all start `Unbuilt`).
    pub fn new(config: Config, engine: Arc<dyn ContainerEngine>) -> SlrunResult<Self> {
        let registry = FunctionRegistry::new_shared(config.functions)?;
        let invoker = Invoker::new(config.runtime.invoke_timeout).map_err(SlrunError::HttpClient)?;

        tracing::debug!(functions = registry.len(), "Runtime initialised");

        Ok(Self {
            config: config.runtime,
            engine,
            registry,
            invoker,
            phase: RwLock::new(()),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Snapshots of every function in configuration order.
    pub fn statuses(&self) -> Vec<FunctionStatus> {
        self.registry.statuses()
    }

    /// Build one function's image.
    pub async fn build(&self, id: &FunctionId) -> SlrunResult<ImageTag> {
        let _phase = self.phase.write().await;
        self.build_one(id).await
    }

    /// Build every function in configuration order, stopping at the first
    /// failure.
    pub async fn build_all(&self) -> SlrunResult<Vec<ImageTag>> {
        let _phase = self.phase.write().await;

        let mut images = Vec::with_capacity(self.registry.len());
        for id in self.registry.function_ids() {
            images.push(self.build_one(id).await?);
        }
        Ok(images)
    }

    /// Reconcile: every function ends with exactly one running container.
    pub async fn start(&self) -> SlrunResult<()> {
        let _phase = self.phase.write().await;
        self.reconciler().start().await?;

        tracing::info!(functions = self.registry.len(), "All functions running");
        Ok(())
    }

    /// Start every function; if the pass fails, stop whatever it left
    /// running before returning the start error.
    ///
    /// A failed pass rolls back on its own, but a rollback stop can fail
    /// too. This makes one more attempt so no container outlives startup.
    pub async fn launch(&self) -> SlrunResult<()> {
        let started = self.start().await;
        if started.is_err() {
            match self.stop().await {
                Ok(0) => {}
                Ok(stopped) => {
                    tracing::warn!(stopped, "Stopped functions left running by the failed start");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cannot stop functions after failed start");
                }
            }
        }
        started
    }

    /// Stop every running function. Returns how many were stopped.
    pub async fn stop(&self) -> SlrunResult<usize> {
        let _phase = self.phase.write().await;
        Ok(self.reconciler().stop().await?)
    }

    /// Stop leftover containers of configured functions without starting
    /// new ones. Returns how many containers were stopped.
    pub async fn teardown(&self) -> SlrunResult<usize> {
        let _phase = self.phase.write().await;
        Ok(self.reconciler().teardown().await?)
    }

    /// `GET` `path` on a running function and return the response body.
    pub async fn invoke(&self, name: &str, path: &str) -> Result<Bytes, InvokeError> {
        let (id, endpoint) = {
            let _phase = self.phase.read().await;
            router::resolve(&self.registry, name)?
        };
        self.invoker.invoke(&id, endpoint, path).await
    }

    /// Forward a full request to a running function.
    pub async fn forward(
        &self,
        name: &str,
        invocation: Invocation,
    ) -> Result<InvocationResponse, InvokeError> {
        let (id, endpoint) = {
            let _phase = self.phase.read().await;
            router::resolve(&self.registry, name)?
        };
        self.invoker.forward(&id, endpoint, invocation).await
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            self.engine.as_ref(),
            &self.registry,
            &self.config.image_prefix,
            self.config.container_port,
        )
    }

    async fn build_one(&self, id: &FunctionId) -> SlrunResult<ImageTag> {
        let config = self.registry.get_config(id)?;

        // Refuse before touching the engine: removing the image of a live
        // container would force it out from under the function.
        let state = self.registry.get_state(id)?;
        if !state.can_transition_to(FunctionState::Built) {
            return Err(StateTransitionError::InvalidTransition {
                function_id: id.clone(),
                from: state.name(),
                to: FunctionState::Built.name(),
            }
            .into());
        }

        let image = ImageBuilder::new(self.engine.as_ref(), &self.config.image_prefix)
            .build(&config)
            .await?;

        let recorded = image.clone();
        self.registry
            .update(id, move |entry| entry.record_image(recorded))??;

        Ok(image)
    }
}
