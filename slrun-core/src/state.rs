// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Function state machine with typed state transitions.
//!
//! Implements the function lifecycle: Unbuilt → Built → {Unknown, Running, Stopped}.
//! Invalid transitions result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::FunctionId;

/// Function lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionState {
    /// Registered from configuration, no image yet.
    Unbuilt,

    /// Image exists in the engine's store, engine state not yet observed.
    Built,

    /// A container backs the function but this process did not start it,
    /// so its endpoint is not known.
    Unknown,

    /// Container started by this process, endpoint recorded.
    Running,

    /// Confirmed that no container backs the function.
    Stopped,
}

impl FunctionState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unbuilt => "Unbuilt",
            Self::Built => "Built",
            Self::Unknown => "Unknown",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: FunctionState) -> bool {
        matches!(
            (self, target),
            // Image builds
            (Self::Unbuilt, Self::Built) |
            (Self::Built, Self::Built) |
            (Self::Stopped, Self::Built) |
            // Observation at the start of a pass
            (Self::Built, Self::Unknown) |
            (Self::Built, Self::Stopped) |
            (Self::Stopped, Self::Unknown) |
            (Self::Stopped, Self::Stopped) |
            (Self::Running, Self::Unknown) |
            (Self::Running, Self::Stopped) |
            (Self::Unknown, Self::Unknown) |
            // Converge, start and stop
            (Self::Unknown, Self::Stopped) |
            (Self::Stopped, Self::Running)
        )
    }

    /// Whether an image has been recorded for the function.
    pub fn has_image(&self) -> bool {
        !matches!(self, Self::Unbuilt)
    }
}

impl std::fmt::Display for FunctionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for a function's lifecycle.
/// Enforces valid state transitions and tracks timing metrics.
#[derive(Debug)]
pub struct FunctionStateMachine {
    function_id: FunctionId,
    current_state: FunctionState,
    last_transition: Instant,
    transition_count: u64,
}

impl FunctionStateMachine {
    /// Create a new state machine for a function.
    pub fn new(function_id: FunctionId) -> Self {
        Self {
            function_id,
            current_state: FunctionState::Unbuilt,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> FunctionState {
        self.current_state
    }

    /// Get the function ID.
    pub fn function_id(&self) -> &FunctionId {
        &self.function_id
    }

    /// Get time since last transition.
    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    /// Returns Ok(()) if successful, or StateTransitionError if invalid.
    pub fn transition_to(&mut self, target: FunctionState) -> Result<(), StateTransitionError> {
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                function_id: self.function_id.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            function_id = %self.function_id,
            from = self.current_state.name(),
            to = target.name(),
            "State transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Check if the function can be invoked.
    pub fn is_invokable(&self) -> bool {
        self.current_state == FunctionState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sm() -> FunctionStateMachine {
        FunctionStateMachine::new(FunctionId::new("test-func").unwrap())
    }

    #[test]
    fn test_initial_state() {
        let sm = make_sm();
        assert_eq!(sm.state(), FunctionState::Unbuilt);
        assert_eq!(sm.transition_count(), 0);
        assert!(!sm.is_invokable());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut sm = make_sm();

        sm.transition_to(FunctionState::Built).unwrap();
        sm.transition_to(FunctionState::Unknown).unwrap();
        sm.transition_to(FunctionState::Stopped).unwrap();
        sm.transition_to(FunctionState::Running).unwrap();
        assert!(sm.is_invokable());

        sm.transition_to(FunctionState::Stopped).unwrap();
        assert!(!sm.is_invokable());
        assert_eq!(sm.transition_count(), 5);
    }

    #[test]
    fn test_second_pass_from_running() {
        let mut sm = make_sm();
        sm.transition_to(FunctionState::Built).unwrap();
        sm.transition_to(FunctionState::Stopped).unwrap();
        sm.transition_to(FunctionState::Running).unwrap();

        // A new pass observes our own container again.
        sm.transition_to(FunctionState::Unknown).unwrap();
        sm.transition_to(FunctionState::Stopped).unwrap();
        sm.transition_to(FunctionState::Running).unwrap();
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = make_sm();

        // Cannot start without an image
        assert!(sm.transition_to(FunctionState::Running).is_err());
        assert!(sm.transition_to(FunctionState::Stopped).is_err());

        sm.transition_to(FunctionState::Built).unwrap();
        // Starting requires a confirmed clean slate
        assert!(sm.transition_to(FunctionState::Running).is_err());

        sm.transition_to(FunctionState::Unknown).unwrap();
        assert!(sm.transition_to(FunctionState::Running).is_err());
        // Cannot rebuild while a container may still be using the image
        assert!(sm.transition_to(FunctionState::Built).is_err());
    }

    #[test]
    fn test_has_image() {
        assert!(!FunctionState::Unbuilt.has_image());
        assert!(FunctionState::Built.has_image());
        assert!(FunctionState::Running.has_image());
        assert!(FunctionState::Stopped.has_image());
    }
}
