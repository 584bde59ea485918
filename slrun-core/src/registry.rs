//! Thread-safe function table using DashMap.
//!
//! Holds every configured function with its runtime fields: image tag,
//! container identity, endpoint and state machine. Iteration follows
//! configuration order.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::FunctionConfig;
use crate::error::{SlrunError, SlrunResult, StateTransitionError};
use crate::state::{FunctionState, FunctionStateMachine};
use crate::types::{ContainerId, Endpoint, FunctionId, ImageTag};

/// Entry in the function registry.
#[derive(Debug)]
pub struct FunctionEntry {
    /// Function configuration.
    pub config: FunctionConfig,
    image: Option<ImageTag>,
    container: Option<ContainerId>,
    endpoint: Option<Endpoint>,
    state_machine: FunctionStateMachine,
}

impl FunctionEntry {
    /// Create a new function entry.
    pub fn new(config: FunctionConfig) -> Self {
        let state_machine = FunctionStateMachine::new(config.name.clone());
        Self {
            config,
            image: None,
            container: None,
            endpoint: None,
            state_machine,
        }
    }

    pub fn image(&self) -> Option<&ImageTag> {
        self.image.as_ref()
    }

    pub fn container(&self) -> Option<&ContainerId> {
        self.container.as_ref()
    }

    /// Set only while the function is running.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
    }

    pub fn state(&self) -> FunctionState {
        self.state_machine.state()
    }

    pub fn is_running(&self) -> bool {
        self.state_machine.is_invokable()
    }

    /// Record a successful image build.
    pub fn record_image(&mut self, image: ImageTag) -> Result<(), StateTransitionError> {
        self.state_machine.transition_to(FunctionState::Built)?;
        self.image = Some(image);
        Ok(())
    }

    /// Record a container found in the engine that this pass did not start.
    pub fn record_observed(&mut self, container: ContainerId) -> Result<(), StateTransitionError> {
        self.state_machine.transition_to(FunctionState::Unknown)?;
        self.container = Some(container);
        self.endpoint = None;
        Ok(())
    }

    /// Record that no container backs the function.
    pub fn record_stopped(&mut self) -> Result<(), StateTransitionError> {
        self.state_machine.transition_to(FunctionState::Stopped)?;
        self.container = None;
        self.endpoint = None;
        Ok(())
    }

    /// Record a container started by this process and its endpoint.
    pub fn record_running(
        &mut self,
        container: ContainerId,
        endpoint: Endpoint,
    ) -> Result<(), StateTransitionError> {
        self.state_machine.transition_to(FunctionState::Running)?;
        self.container = Some(container);
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Point-in-time view of this entry.
    pub fn status(&self) -> FunctionStatus {
        FunctionStatus {
            name: self.config.name.clone(),
            state: self.state(),
            running: self.is_running(),
            image: self.image.clone(),
            container: self.container.clone(),
            endpoint: self.endpoint,
            seconds_in_state: self.state_machine.time_in_current_state().as_secs(),
        }
    }
}

/// Serializable snapshot of a function, used by `status` listings.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionStatus {
    pub name: FunctionId,
    pub state: FunctionState,
    pub running: bool,
    pub image: Option<ImageTag>,
    pub container: Option<ContainerId>,
    pub endpoint: Option<Endpoint>,
    pub seconds_in_state: u64,
}

/// Thread-safe registry for managing functions.
/// Uses DashMap for lock-free concurrent access.
#[derive(Debug)]
pub struct FunctionRegistry {
    /// Function names in configuration order.
    order: Vec<FunctionId>,
    /// Map of function name to function entry.
    functions: DashMap<FunctionId, FunctionEntry>,
}

impl FunctionRegistry {
    /// Build a registry from validated configuration, preserving order.
    pub fn from_configs(configs: impl IntoIterator<Item = FunctionConfig>) -> SlrunResult<Self> {
        let functions = DashMap::new();
        let mut order = Vec::new();

        for config in configs {
            let id = config.name.clone();

            // Check for duplicate - fail fast
            if functions.contains_key(&id) {
                return Err(SlrunError::FunctionAlreadyExists(id));
            }

            functions.insert(id.clone(), FunctionEntry::new(config));
            order.push(id);
        }

        Ok(Self { order, functions })
    }

    /// Create a registry wrapped in an Arc for sharing across tasks.
    pub fn new_shared(configs: impl IntoIterator<Item = FunctionConfig>) -> SlrunResult<Arc<Self>> {
        Self::from_configs(configs).map(Arc::new)
    }

    /// Function names in configuration order.
    pub fn function_ids(&self) -> &[FunctionId] {
        &self.order
    }

    /// Look up a function by its raw name.
    ///
    /// Names that are not valid identifiers cannot be registered, so they
    /// resolve to `None` like any other unknown name.
    pub fn resolve(&self, name: &str) -> Option<FunctionId> {
        let id = FunctionId::new(name).ok()?;
        self.functions.contains_key(&id).then_some(id)
    }

    /// Get the number of registered functions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get the current state of a function.
    pub fn get_state(&self, id: &FunctionId) -> SlrunResult<FunctionState> {
        self.functions
            .get(id)
            .map(|entry| entry.state())
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))
    }

    /// Get the configuration for a function.
    pub fn get_config(&self, id: &FunctionId) -> SlrunResult<FunctionConfig> {
        self.functions
            .get(id)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))
    }

    /// Snapshot of a single function.
    pub fn status(&self, id: &FunctionId) -> SlrunResult<FunctionStatus> {
        self.functions
            .get(id)
            .map(|entry| entry.status())
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))
    }

    /// Snapshots of every function in configuration order.
    pub fn statuses(&self) -> Vec<FunctionStatus> {
        self.order
            .iter()
            .filter_map(|id| self.functions.get(id).map(|entry| entry.status()))
            .collect()
    }

    /// Endpoint of a running function; `None` when it is not running.
    pub fn endpoint(&self, id: &FunctionId) -> SlrunResult<Option<Endpoint>> {
        self.functions
            .get(id)
            .map(|entry| entry.endpoint())
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))
    }

    /// Functions in a specific state, in configuration order.
    pub fn functions_in_state(&self, state: FunctionState) -> Vec<FunctionId> {
        self.order
            .iter()
            .filter(|id| {
                self.functions
                    .get(*id)
                    .is_some_and(|entry| entry.state() == state)
            })
            .cloned()
            .collect()
    }

    /// Run `f` against a function's entry with exclusive access.
    ///
    /// The shard lock is held for the duration of `f`; never await inside.
    pub fn update<R>(
        &self,
        id: &FunctionId,
        f: impl FnOnce(&mut FunctionEntry) -> R,
    ) -> SlrunResult<R> {
        let mut entry = self
            .functions
            .get_mut(id)
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))?;
        Ok(f(&mut entry))
    }

    /// Run `f` against a function's entry with shared access.
    pub fn inspect<R>(&self, id: &FunctionId, f: impl FnOnce(&FunctionEntry) -> R) -> SlrunResult<R> {
        let entry = self
            .functions
            .get(id)
            .ok_or_else(|| SlrunError::FunctionNotFound(id.clone()))?;
        Ok(f(&entry))
    }
}
