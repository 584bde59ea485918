// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process container engine for integration tests.
//!
//! Images are the entry lists of uploaded build contexts. A started
//! container is a real HTTP/1.1 listener on 127.0.0.1 with an OS-assigned
//! port, answering `<image> <method> <path>` for every request and `404 not
//! here` for `/missing`.
//!
//! Like the daemon, removing a tag that containers still use leaves those
//! containers reported by bare image id, and the listing only shows
//! containers carrying the function label.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use slrun_core::engine::{
    ContainerEngine, ContainerInspection, ContainerSpec, ContainerSummary, PortBinding,
    FUNCTION_LABEL, IMAGE_LABEL,
};
use slrun_core::error::EngineResource;
use slrun_core::packager::ContextStream;
use slrun_core::{
    Config, ContainerId, EngineError, FunctionConfig, FunctionId, ImageTag, Runtime, RuntimeConfig,
};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

struct FakeContainer {
    /// Tag the container was created from.
    image: String,
    /// Image reference the listing reports.
    reported_image: String,
    labels: HashMap<String, String>,
    container_port: u16,
    host_port: Option<u16>,
    server: Option<JoinHandle<()>>,
}

impl FakeContainer {
    fn is_running(&self) -> bool {
        self.server.is_some()
    }
}

#[derive(Default)]
struct EngineState {
    /// Image tag to archive entry paths.
    images: HashMap<String, Vec<String>>,
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
    next_image_id: u64,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    fail_stop_once: HashSet<String>,
    exit_on_start: HashSet<String>,
    fail_list: bool,
    delete_during_build: Option<PathBuf>,
    removed_images: Vec<String>,
    created: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `start_container` fail for containers of `image`.
    pub fn fail_start(&self, image: &str) {
        self.state.lock().unwrap().fail_start.insert(image.to_string());
    }

    /// Make `stop_container` fail for containers of `image`.
    pub fn fail_stop(&self, image: &str) {
        self.state.lock().unwrap().fail_stop.insert(image.to_string());
    }

    /// Make the next `stop_container` for a container of `image` fail.
    pub fn fail_stop_once(&self, image: &str) {
        self.state.lock().unwrap().fail_stop_once.insert(image.to_string());
    }

    /// Containers of `image` exit as soon as they are started.
    pub fn exit_on_start(&self, image: &str) {
        self.state.lock().unwrap().exit_on_start.insert(image.to_string());
    }

    /// Make `list_containers` fail.
    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    /// Delete `path` once the first chunk of the next build context arrives.
    pub fn delete_during_build(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().delete_during_build = Some(path.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_start.clear();
        state.fail_stop.clear();
        state.fail_stop_once.clear();
        state.exit_on_start.clear();
        state.fail_list = false;
    }

    /// Archive entries of a built image.
    pub fn image_entries(&self, image: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().images.get(image).cloned()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_images.clone()
    }

    pub fn created_containers(&self) -> usize {
        self.state.lock().unwrap().created
    }

    /// Ids of running containers created from `image`.
    pub fn running_of(&self, image: &str) -> Vec<ContainerId> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<_> = state
            .containers
            .iter()
            .filter(|(_, c)| c.is_running() && c.image == image)
            .map(|(id, _)| ContainerId::new(id.clone()))
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn running_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.containers.values().filter(|c| c.is_running()).count()
    }

    /// Containers that exist, running or not.
    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    /// Image reference the listing reports for a container.
    pub fn reported_image(&self, id: &ContainerId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id.as_str())
            .map(|c| c.reported_image.clone())
    }

    pub fn is_running(&self, id: &ContainerId) -> bool {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id.as_str())
            .is_some_and(FakeContainer::is_running)
    }

    /// Start a container for `function` that this runtime did not create,
    /// as a crashed earlier process would have left behind.
    pub async fn spawn_stale(&self, function: &str, image: &str) -> ContainerId {
        let labels = HashMap::from([
            (FUNCTION_LABEL.to_string(), function.to_string()),
            (IMAGE_LABEL.to_string(), image.to_string()),
        ]);
        self.spawn_running(image, labels).await
    }

    /// Start an unlabelled container that has nothing to do with slrun.
    pub async fn spawn_foreign(&self, image: &str) -> ContainerId {
        self.spawn_running(image, HashMap::new()).await
    }

    async fn spawn_running(&self, image: &str, labels: HashMap<String, String>) -> ContainerId {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve(listener, image.to_string()));

        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                image: image.to_string(),
                reported_image: image.to_string(),
                labels,
                container_port: 80,
                host_port: Some(port),
                server: Some(server),
            },
        );
        ContainerId::new(id)
    }
}

fn next_id(state: &mut EngineState) -> String {
    state.next_id += 1;
    format!("{:016x}{:048}", state.next_id, 0)
}

fn missing(resource: EngineResource, id: &str) -> EngineError {
    EngineError::NotFound {
        resource,
        id: id.to_string(),
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn remove_image(&self, image: &ImageTag) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.images.remove(image.as_str()).is_none() {
            return Err(missing(EngineResource::Image, image.as_str()));
        }
        state.removed_images.push(image.to_string());

        // Containers keep the untagged image and are reported by its id.
        state.next_image_id += 1;
        let image_id = format!("sha256:{:064x}", state.next_image_id);
        for container in state.containers.values_mut() {
            if container.image == image.as_str() {
                container.reported_image = image_id.clone();
            }
        }
        Ok(())
    }

    async fn build_image(&self, image: &ImageTag, mut context: ContextStream) -> Result<(), EngineError> {
        let mut delete = self.state.lock().unwrap().delete_during_build.take();
        let mut archive = Vec::new();
        while let Some(chunk) = context.next().await {
            if let Some(path) = delete.take() {
                std::fs::remove_file(path).unwrap();
            }
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(e) => {
                    return Err(EngineError::BuildFailed {
                        image: image.clone(),
                        message: e.to_string(),
                    })
                }
            }
        }

        let mut entries = Vec::new();
        let mut reader = tar::Archive::new(archive.as_slice());
        let iter = reader.entries().map_err(|e| EngineError::BuildFailed {
            image: image.clone(),
            message: e.to_string(),
        })?;
        for entry in iter {
            let entry = entry.map_err(|e| EngineError::BuildFailed {
                image: image.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path().map(|p| p.to_string_lossy().into_owned());
            entries.push(path.unwrap_or_default());
        }

        self.state
            .lock()
            .unwrap()
            .images
            .insert(image.to_string(), entries);
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(EngineError::Api {
                operation: "list_containers",
                message: "injected list failure".to_string(),
            });
        }

        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.is_running() && c.labels.contains_key(FUNCTION_LABEL))
            .map(|(id, c)| ContainerSummary {
                id: ContainerId::new(id.clone()),
                image: c.reported_image.clone(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError> {
        let mut state = self.state.lock().unwrap();
        if !state.images.contains_key(spec.image.as_str()) {
            return Err(missing(EngineResource::Image, spec.image.as_str()));
        }

        let id = next_id(&mut state);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                image: spec.image.to_string(),
                reported_image: spec.image.to_string(),
                labels: spec.labels(),
                container_port: spec.container_port.value(),
                host_port: None,
                server: None,
            },
        );
        state.created += 1;
        Ok(ContainerId::new(id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), EngineError> {
        let image = {
            let state = self.state.lock().unwrap();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| missing(EngineResource::Container, id.as_str()))?;
            if state.fail_start.contains(&container.image) {
                return Err(EngineError::Api {
                    operation: "start_container",
                    message: format!("injected start failure for {}", container.image),
                });
            }
            if state.exit_on_start.contains(&container.image) {
                return Ok(());
            }
            container.image.clone()
        };

        let listener = TcpListener::bind((LOOPBACK, 0))
            .await
            .map_err(|e| EngineError::Api {
                operation: "start_container",
                message: e.to_string(),
            })?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(0);
        let server = tokio::spawn(serve(listener, image));

        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id.as_str()) {
            Some(container) => {
                container.host_port = Some(port);
                container.server = Some(server);
                Ok(())
            }
            None => {
                server.abort();
                Err(missing(EngineResource::Container, id.as_str()))
            }
        }
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, EngineError> {
        let state = self.state.lock().unwrap();
        let container = state
            .containers
            .get(id.as_str())
            .ok_or_else(|| missing(EngineResource::Container, id.as_str()))?;

        let bindings = container
            .host_port
            .map(|host_port| PortBinding {
                container_port: container.container_port,
                host_ip: Some(LOOPBACK),
                host_port,
            })
            .into_iter()
            .collect();

        Ok(ContainerInspection {
            running: container.is_running(),
            bindings,
        })
    }

    async fn stop_container(&self, id: &ContainerId, _grace: Duration) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let image = state
            .containers
            .get(id.as_str())
            .map(|c| c.image.clone())
            .ok_or_else(|| missing(EngineResource::Container, id.as_str()))?;

        if state.fail_stop.contains(&image) || state.fail_stop_once.remove(&image) {
            return Err(EngineError::Api {
                operation: "stop_container",
                message: format!("injected stop failure for {}", image),
            });
        }

        if let Some(container) = state.containers.get_mut(id.as_str()) {
            if let Some(server) = container.server.take() {
                server.abort();
            }
            container.host_port = None;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .remove(id.as_str())
            .ok_or_else(|| missing(EngineResource::Container, id.as_str()))?;
        if let Some(server) = container.server {
            server.abort();
        }
        Ok(())
    }
}

/// Accept loop of a fake function container.
async fn serve(listener: TcpListener, image: String) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let image = image.clone();
        tokio::spawn(async move {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = String::from_utf8_lossy(&request);
            let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
            let method = request_line.next().unwrap_or_default().to_string();
            let path = request_line.next().unwrap_or("/").to_string();

            let (status, body) = if path == "/missing" {
                ("404 Not Found", "not here".to_string())
            } else {
                ("200 OK", format!("{} {} {}", image, method, path))
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}

/// Create a function source tree under `root`.
pub fn function_tree(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("Dockerfile"), "FROM busybox\nCOPY src /app\n").unwrap();
    std::fs::write(dir.join("src").join("app.sh"), format!("echo {}\n", name)).unwrap();
    dir
}

/// Configuration with one function per name, each with its own tree.
pub fn config(root: &Path, names: &[&str]) -> Config {
    Config {
        runtime: RuntimeConfig {
            invoke_timeout: Duration::from_secs(5),
            ..RuntimeConfig::default()
        },
        functions: names
            .iter()
            .map(|name| FunctionConfig {
                name: FunctionId::new(*name).unwrap(),
                build_dir: function_tree(root, name),
            })
            .collect(),
    }
}

/// Runtime over `engine` with one function per name.
pub fn runtime(engine: &Arc<FakeEngine>, root: &Path, names: &[&str]) -> Runtime {
    let engine: Arc<dyn ContainerEngine> = engine.clone();
    Runtime::new(config(root, names), engine).unwrap()
}

pub fn id(name: &str) -> FunctionId {
    FunctionId::new(name).unwrap()
}
