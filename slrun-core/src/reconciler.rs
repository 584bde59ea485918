// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lifecycle reconciler.
//!
//! Drives every configured function to exactly one running container:
//! observe what the engine runs, stop and remove all of it, then start one
//! fresh container per function and record where it listens.
//!
//! Containers are recognised by the ownership labels they were created
//! with, not by image reference: once a rebuild removes a tag, the engine
//! reports the old containers by bare image id.
//!
//! A start pass is all-or-nothing: if a function fails to start, the
//! functions already started in the same pass are stopped again. `stop`
//! attempts every running function and reports all failures together.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{EngineError, ReconcileError, StateTransitionError, StopFailure};
use crate::registry::{FunctionEntry, FunctionRegistry};
use crate::state::FunctionState;
use crate::types::{ContainerId, Endpoint, FunctionId, ImageTag, Port};

/// Functions are only published on the loopback interface.
const HOST_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Containers are stopped without waiting for a clean exit.
const STOP_GRACE: Duration = Duration::ZERO;

/// Containers found for one function during observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub function: FunctionId,
    pub containers: Vec<ContainerId>,
}

/// Reconciles the function table against a container engine.
pub struct Reconciler<'a> {
    engine: &'a dyn ContainerEngine,
    registry: &'a FunctionRegistry,
    image_prefix: &'a str,
    container_port: Port,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        engine: &'a dyn ContainerEngine,
        registry: &'a FunctionRegistry,
        image_prefix: &'a str,
        container_port: Port,
    ) -> Self {
        Self {
            engine,
            registry,
            image_prefix,
            container_port,
        }
    }

    /// Full pass: observe, stop everything observed, start every function.
    ///
    /// Every function must have an image. On failure, functions started
    /// earlier in this pass are stopped again before the error is returned.
    pub async fn start(&self) -> Result<(), ReconcileError> {
        for id in self.registry.function_ids() {
            let built = self.with_entry(id, |entry| entry.image().is_some())?;
            if !built {
                return Err(ReconcileError::NotBuilt {
                    function: id.clone(),
                });
            }
        }

        let observed = self.observe().await?;
        self.converge_to_empty(&observed).await?;

        let mut started: Vec<FunctionId> = Vec::new();
        for id in self.registry.function_ids() {
            if let Err(e) = self.start_function(id).await {
                tracing::error!(function = %id, error = %e, "Cannot start function");
                self.roll_back(&started).await;
                return Err(e);
            }
            started.push(id.clone());
        }

        Ok(())
    }

    /// Stop every function this process is running.
    ///
    /// All functions are attempted; failures are collected into one
    /// [`ReconcileError::StopFailed`]. Returns how many were stopped.
    pub async fn stop(&self) -> Result<usize, ReconcileError> {
        let mut failures = Vec::new();
        let mut stopped = 0;

        for id in self.registry.functions_in_state(FunctionState::Running) {
            let Some(container) = self.with_entry(&id, |entry| entry.container().cloned())? else {
                continue;
            };

            tracing::info!(function = %id, container = %container, "Stopping function");
            match self.stop_container(&container).await {
                Ok(()) => {
                    self.record(&id, FunctionEntry::record_stopped)?;
                    tracing::info!(function = %id, "Stopped function");
                    stopped += 1;
                }
                Err(error) => {
                    tracing::error!(function = %id, container = %container, error = %error, "Cannot stop function");
                    failures.push(StopFailure {
                        function: id,
                        container,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(stopped)
        } else {
            Err(ReconcileError::StopFailed { failures })
        }
    }

    /// Stop any container labelled for a configured function without
    /// starting replacements. Returns how many containers were stopped.
    pub async fn teardown(&self) -> Result<usize, ReconcileError> {
        let observed = self.observe().await?;
        self.converge_to_empty(&observed).await
    }

    /// List the engine's running containers and match them to functions by
    /// their ownership labels.
    ///
    /// Functions with an image move to `Unknown` when a container was found
    /// and to `Stopped` otherwise. Only functions with at least one match
    /// are returned.
    pub async fn observe(&self) -> Result<Vec<Observed>, ReconcileError> {
        let containers = self
            .engine
            .list_containers()
            .await
            .map_err(ReconcileError::Observe)?;

        let mut observed = Vec::new();
        for id in self.registry.function_ids() {
            let image = ImageTag::for_function(self.image_prefix, id);
            let matching: Vec<ContainerId> = containers
                .iter()
                .filter(|c| c.belongs_to(id, &image))
                .inspect(|c| {
                    tracing::debug!(
                        function = %id,
                        container = %c.id,
                        reported_image = %c.image,
                        "Found function container"
                    )
                })
                .map(|c| c.id.clone())
                .collect();

            let has_image = self.with_entry(id, |entry| entry.state().has_image())?;
            match matching.first() {
                Some(first) => {
                    tracing::info!(
                        function = %id,
                        image = %image,
                        containers = matching.len(),
                        "Function is running as {}",
                        first
                    );
                    if has_image {
                        let first = first.clone();
                        self.record(id, move |entry| entry.record_observed(first))?;
                    }
                    observed.push(Observed {
                        function: id.clone(),
                        containers: matching,
                    });
                }
                None => {
                    tracing::info!(function = %id, image = %image, "Function is not running");
                    if has_image {
                        self.record(id, FunctionEntry::record_stopped)?;
                    }
                }
            }
        }

        Ok(observed)
    }

    /// Stop and remove every observed container with no grace period.
    ///
    /// A container that no longer exists counts as stopped.
    pub async fn converge_to_empty(&self, observed: &[Observed]) -> Result<usize, ReconcileError> {
        let mut stopped = 0;

        for item in observed {
            for container in &item.containers {
                tracing::info!(function = %item.function, container = %container, "Stopping stale container");
                self.stop_container(container)
                    .await
                    .map_err(|source| ReconcileError::Converge {
                        function: item.function.clone(),
                        container: container.clone(),
                        source,
                    })?;
                stopped += 1;
            }

            if self.with_entry(&item.function, |entry| entry.state().has_image())? {
                self.record(&item.function, FunctionEntry::record_stopped)?;
            }
        }

        Ok(stopped)
    }

    /// Create, start and inspect one function's container.
    async fn start_function(&self, id: &FunctionId) -> Result<(), ReconcileError> {
        let image = self
            .with_entry(id, |entry| entry.image().cloned())?
            .ok_or_else(|| ReconcileError::NotBuilt {
                function: id.clone(),
            })?;

        tracing::info!(function = %id, image = %image, "Starting function");
        let started = Instant::now();

        let spec = ContainerSpec {
            function: id.clone(),
            image,
            container_port: self.container_port,
            host_ip: HOST_IP,
        };
        let container = self
            .engine
            .create_container(&spec)
            .await
            .map_err(|source| ReconcileError::Start {
                function: id.clone(),
                source,
            })?;

        let endpoint = match self.launch(&container).await {
            Ok(endpoint) => endpoint,
            Err(source) => {
                // Do not leave a half-started container behind.
                if let Err(e) = self.stop_container(&container).await {
                    tracing::warn!(function = %id, container = %container, error = %e, "Cannot discard failed container");
                }
                return Err(ReconcileError::Start {
                    function: id.clone(),
                    source,
                });
            }
        };

        let recorded = container.clone();
        self.record(id, move |entry| entry.record_running(recorded, endpoint))?;

        tracing::info!(
            function = %id,
            container = %container,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Started function with mapping {}->{}/tcp",
            endpoint,
            self.container_port
        );
        Ok(())
    }

    /// Start a created container and read back the host port the engine
    /// allocated for it.
    async fn launch(&self, container: &ContainerId) -> Result<Endpoint, EngineError> {
        self.engine.start_container(container).await?;

        let inspection = self.engine.inspect_container(container).await?;
        if !inspection.running {
            return Err(EngineError::ContainerExited {
                container: container.clone(),
            });
        }
        let host_port = inspection
            .host_port(self.container_port, HOST_IP)
            .and_then(|port| Port::new(port).ok())
            .ok_or_else(|| EngineError::PortNotPublished {
                container: container.clone(),
                port: self.container_port.value(),
            })?;

        Ok(Endpoint::loopback(host_port))
    }

    /// Stop functions started earlier in a failed pass, newest first.
    async fn roll_back(&self, started: &[FunctionId]) {
        for id in started.iter().rev() {
            let container = match self.with_entry(id, |entry| entry.container().cloned()) {
                Ok(Some(container)) => container,
                _ => continue,
            };

            tracing::warn!(function = %id, container = %container, "Rolling back started function");
            match self.stop_container(&container).await {
                Ok(()) => {
                    if let Err(e) = self.record(id, FunctionEntry::record_stopped) {
                        tracing::error!(function = %id, error = %e, "Cannot record rollback");
                    }
                }
                Err(e) => {
                    tracing::error!(function = %id, container = %container, error = %e, "Rollback stop failed, container left running");
                }
            }
        }
    }

    /// Stop a container, then remove it.
    ///
    /// Only the stop decides the outcome; a container that cannot be removed
    /// no longer runs and is merely logged.
    async fn stop_container(&self, container: &ContainerId) -> Result<(), EngineError> {
        match self.engine.stop_container(container, STOP_GRACE).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(container = %container, "Container already gone");
                return Ok(());
            }
            other => other?,
        }

        match self.engine.remove_container(container).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(container = %container, error = %e, "Cannot remove stopped container");
            }
        }
        Ok(())
    }

    fn with_entry<R>(
        &self,
        id: &FunctionId,
        f: impl FnOnce(&FunctionEntry) -> R,
    ) -> Result<R, ReconcileError> {
        self.registry
            .inspect(id, f)
            .map_err(|_| ReconcileError::Unregistered(id.clone()))
    }

    fn record(
        &self,
        id: &FunctionId,
        f: impl FnOnce(&mut FunctionEntry) -> Result<(), StateTransitionError>,
    ) -> Result<(), ReconcileError> {
        self.registry
            .update(id, f)
            .map_err(|_| ReconcileError::Unregistered(id.clone()))?
            .map_err(ReconcileError::from)
    }
}
