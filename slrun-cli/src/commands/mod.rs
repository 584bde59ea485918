// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod build;
pub mod down;
pub mod list;
pub mod up;
pub mod validate;

use std::sync::Arc;

use slrun_core::{Config, ConfigLoader, ContainerEngine, DockerEngine, Runtime};

/// Load the configuration, connect to the engine and create the runtime.
pub(crate) async fn load_runtime(config_path: &str) -> Result<Runtime, Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;
    tracing::info!(
        functions = config.functions.len(),
        "Configuration validated successfully"
    );

    let engine = connect_engine(&config).await?;
    Ok(Runtime::new(config, engine)?)
}

async fn connect_engine(config: &Config) -> Result<Arc<dyn ContainerEngine>, Box<dyn std::error::Error>> {
    let docker_host = config.runtime.docker_host.as_deref();
    let engine = DockerEngine::connect(docker_host)?;
    engine.ping().await?;

    tracing::debug!(docker_host = docker_host.unwrap_or("local default"), "Connected to container engine");
    Ok(Arc::new(engine))
}
