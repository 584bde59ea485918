// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container engine interface.
//!
//! The runtime only issues lifecycle commands to the engine and reads back
//! its reported state. Image storage, isolation and networking are the
//! engine's business.

mod docker;

pub use docker::DockerEngine;

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::packager::ContextStream;
use crate::types::{ContainerId, FunctionId, ImageTag, Port};

/// Label naming the function a container was started for.
pub const FUNCTION_LABEL: &str = "slrun.function";
/// Label carrying the tag the container was created from. Unlike the
/// engine's image reference it survives removal of that tag.
pub const IMAGE_LABEL: &str = "slrun.image";

/// A container as reported by the engine's container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// Image reference as the engine reports it; a bare image id once the
    /// tag has been removed or moved.
    pub image: String,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// Whether this container was started for `function` from `image`.
    pub fn belongs_to(&self, function: &FunctionId, image: &ImageTag) -> bool {
        self.labels.get(FUNCTION_LABEL).map(String::as_str) == Some(function.as_str())
            && self.labels.get(IMAGE_LABEL).map(String::as_str) == Some(image.as_str())
    }
}

/// Everything needed to create a function container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub function: FunctionId,
    pub image: ImageTag,
    /// Port the function listens on inside the container.
    pub container_port: Port,
    /// Host interface the port is published on; the host port is left to
    /// the engine.
    pub host_ip: IpAddr,
}

impl ContainerSpec {
    /// Ownership labels attached to the created container.
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (FUNCTION_LABEL.to_string(), self.function.to_string()),
            (IMAGE_LABEL.to_string(), self.image.to_string()),
        ])
    }
}

/// One host binding of a published container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_ip: Option<IpAddr>,
    pub host_port: u16,
}

/// Engine-reported details of a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerInspection {
    pub running: bool,
    pub bindings: Vec<PortBinding>,
}

impl ContainerInspection {
    /// Host port bound to `container_port`, preferring a binding on `host_ip`.
    pub fn host_port(&self, container_port: Port, host_ip: IpAddr) -> Option<u16> {
        let candidates: Vec<&PortBinding> = self
            .bindings
            .iter()
            .filter(|b| b.container_port == container_port.value() && b.host_port != 0)
            .collect();
        candidates
            .iter()
            .find(|b| b.host_ip == Some(host_ip))
            .or(candidates.first())
            .map(|b| b.host_port)
    }
}

/// Lifecycle operations the runtime needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Remove an image, forcing removal and pruning untagged parents.
    /// Returns [`EngineError::NotFound`] when no such image exists.
    async fn remove_image(&self, image: &ImageTag) -> Result<(), EngineError>;

    /// Build an image from a streamed tar context and tag it.
    /// Resolves only after the engine's build output has been fully drained.
    async fn build_image(&self, image: &ImageTag, context: ContextStream) -> Result<(), EngineError>;

    /// List running containers that carry a [`FUNCTION_LABEL`].
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError>;

    /// Create (but do not start) a container.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), EngineError>;

    /// Read back a container's state, including allocated host ports.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, EngineError>;

    /// Stop a container, waiting at most `grace` before killing it.
    /// A zero grace period stops it immediately.
    async fn stop_container(&self, id: &ContainerId, grace: Duration) -> Result<(), EngineError>;

    /// Remove a container, killing it first if it still runs.
    async fn remove_container(&self, id: &ContainerId) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn binding(container_port: u16, host_ip: Option<IpAddr>, host_port: u16) -> PortBinding {
        PortBinding {
            container_port,
            host_ip,
            host_port,
        }
    }

    fn echo() -> (FunctionId, ImageTag) {
        let id = FunctionId::new("echo").unwrap();
        let image = ImageTag::for_function("slrun-", &id);
        (id, image)
    }

    #[test]
    fn test_labels_identify_owner_after_retag() {
        let (id, image) = echo();
        let spec = ContainerSpec {
            function: id.clone(),
            image: image.clone(),
            container_port: Port::HTTP,
            host_ip: LOOPBACK,
        };
        let summary = ContainerSummary {
            id: ContainerId::new("c1"),
            image: "sha256:0123abcd".to_string(),
            labels: spec.labels(),
        };
        assert!(summary.belongs_to(&id, &image));

        let other = FunctionId::new("echo2").unwrap();
        assert!(!summary.belongs_to(&other, &image));
        assert!(!summary.belongs_to(&id, &ImageTag::for_function("team/", &id)));
    }

    #[test]
    fn test_unlabelled_container_has_no_owner() {
        let (id, image) = echo();
        let summary = ContainerSummary {
            id: ContainerId::new("c1"),
            image: image.to_string(),
            labels: HashMap::new(),
        };
        assert!(!summary.belongs_to(&id, &image));
    }

    #[test]
    fn test_host_port_prefers_requested_interface() {
        let inspection = ContainerInspection {
            running: true,
            bindings: vec![
                binding(80, Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)), 40001),
                binding(80, Some(LOOPBACK), 40002),
            ],
        };
        assert_eq!(inspection.host_port(Port::HTTP, LOOPBACK), Some(40002));
    }

    #[test]
    fn test_host_port_falls_back_to_any_binding() {
        let inspection = ContainerInspection {
            running: true,
            bindings: vec![binding(80, None, 40001)],
        };
        assert_eq!(inspection.host_port(Port::HTTP, LOOPBACK), Some(40001));
    }

    #[test]
    fn test_host_port_missing() {
        let inspection = ContainerInspection {
            running: true,
            bindings: vec![binding(8080, Some(LOOPBACK), 40001), binding(80, Some(LOOPBACK), 0)],
        };
        assert_eq!(inspection.host_port(Port::HTTP, LOOPBACK), None);
        assert_eq!(ContainerInspection::default().host_port(Port::HTTP, LOOPBACK), None);
    }
}
