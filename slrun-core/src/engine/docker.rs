// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Docker engine backed by bollard.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    errors::Error as DockerError,
    models::{ContainerCreateBody, HostConfig, PortBinding as DockerPortBinding},
    query_parameters::{
        BuildImageOptions,
        CreateContainerOptions,
        InspectContainerOptions,
        ListContainersOptions,
        RemoveContainerOptions,
        RemoveImageOptions,
        StartContainerOptions,
        StopContainerOptions,
    },
    Docker,
};
use futures_util::StreamExt;

use super::{
    ContainerEngine, ContainerInspection, ContainerSpec, ContainerSummary, PortBinding,
    FUNCTION_LABEL,
};
use crate::error::{EngineError, EngineResource};
use crate::packager::ContextStream;
use crate::types::{ContainerId, ImageTag};

/// Seconds before a request to the Docker daemon times out.
const CLIENT_TIMEOUT_SECS: u64 = 120;

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local daemon (honours `DOCKER_HOST`), or to an
    /// explicit address.
    ///
    /// Supported address formats:
    /// - Unix socket: `unix:///var/run/docker.sock` or `/var/run/docker.sock`
    /// - HTTP: `http://localhost:2375` or `tcp://localhost:2375`
    pub fn connect(address: Option<&str>) -> Result<Self, EngineError> {
        let docker = match address {
            None => Docker::connect_with_local_defaults(),
            Some(address) if address.starts_with("http://") || address.starts_with("tcp://") => {
                let addr = address
                    .trim_start_matches("http://")
                    .trim_start_matches("tcp://");
                Docker::connect_with_http(
                    &format!("http://{}", addr),
                    CLIENT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
            Some(address) => {
                let socket_path = address.trim_start_matches("unix://");
                Docker::connect_with_socket(
                    socket_path,
                    CLIENT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
        }
        .map_err(|e| EngineError::Connection {
            reason: e.to_string(),
        })?;

        Ok(Self { docker })
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Connection {
                reason: e.to_string(),
            })
    }
}

/// Classify a daemon error. 404 responses become `NotFound`.
fn classify(
    err: DockerError,
    operation: &'static str,
    resource: EngineResource,
    id: &str,
) -> EngineError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::NotFound {
            resource,
            id: id.to_string(),
        },
        other => EngineError::Api {
            operation,
            message: other.to_string(),
        },
    }
}

/// Docker keys published ports as `"<port>/<proto>"`.
fn port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

fn parse_bindings(ports: HashMap<String, Option<Vec<DockerPortBinding>>>) -> Vec<PortBinding> {
    let mut bindings = Vec::new();
    for (key, host_bindings) in ports {
        let Some(container_port) = key
            .strip_suffix("/tcp")
            .and_then(|port| port.parse::<u16>().ok())
        else {
            continue;
        };
        for binding in host_bindings.unwrap_or_default() {
            let host_port = binding
                .host_port
                .as_deref()
                .and_then(|port| port.parse::<u16>().ok())
                .unwrap_or(0);
            let host_ip = binding
                .host_ip
                .as_deref()
                .and_then(|ip| ip.parse::<IpAddr>().ok());
            bindings.push(PortBinding {
                container_port,
                host_ip,
                host_port,
            });
        }
    }
    bindings
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn remove_image(&self, image: &ImageTag) -> Result<(), EngineError> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
            ..Default::default()
        };

        self.docker
            .remove_image(image.as_str(), Some(options), None)
            .await
            .map(|deleted| {
                tracing::debug!(image = %image, layers = deleted.len(), "Removed image");
            })
            .map_err(|e| classify(e, "remove_image", EngineResource::Image, image.as_str()))
    }

    async fn build_image(&self, image: &ImageTag, context: ContextStream) -> Result<(), EngineError> {
        let options = BuildImageOptions {
            t: Some(image.to_string()),
            rm: true,
            ..Default::default()
        };

        let mut output =
            self.docker
                .build_image(options, None, Some(bollard::body_try_stream(context)));

        // The daemon only finishes the build once its output is consumed, so
        // keep reading after the first failure.
        let mut failure = None;
        while let Some(item) = output.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                        if !line.is_empty() {
                            tracing::debug!(image = %image, "{}", line);
                        }
                    }
                    if let Some(error) = info.error {
                        failure.get_or_insert(error);
                    }
                }
                Err(e) => {
                    failure.get_or_insert(e.to_string());
                }
            }
        }

        match failure {
            Some(message) => Err(EngineError::BuildFailed {
                image: image.clone(),
                message,
            }),
            None => Ok(()),
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![FUNCTION_LABEL.to_string()]);
        let options = ListContainersOptions {
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| EngineError::Api {
                operation: "list_containers",
                message: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                Some(ContainerSummary {
                    id: ContainerId::new(id),
                    image: c.image.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError> {
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key(spec.container_port.value()),
            Some(vec![DockerPortBinding {
                host_ip: Some(spec.host_ip.to_string()),
                // Left empty so the engine allocates a free port.
                host_port: None,
            }]),
        );

        let body = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            labels: Some(spec.labels()),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(|e| classify(e, "create_container", EngineResource::Image, spec.image.as_str()))?;

        for warning in &response.warnings {
            tracing::warn!(image = %spec.image, warning = %warning, "Engine warning on container create");
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), EngineError> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(|e| classify(e, "start_container", EngineResource::Container, id.as_str()))
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, EngineError> {
        let inspect = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| classify(e, "inspect_container", EngineResource::Container, id.as_str()))?;

        let running = inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);
        let bindings = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .map(parse_bindings)
            .unwrap_or_default();

        Ok(ContainerInspection { running, bindings })
    }

    async fn stop_container(&self, id: &ContainerId, grace: Duration) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: Some(i32::try_from(grace.as_secs()).unwrap_or(i32::MAX)),
            ..Default::default()
        };

        match self.docker.stop_container(id.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(classify(e, "stop_container", EngineResource::Container, id.as_str())),
        }
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| classify(e, "remove_container", EngineResource::Container, id.as_str()))
    }
}
