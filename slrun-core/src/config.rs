// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Validates the function list and runtime settings at boot-up time.
//! Any invalid field results in a HardValidationError that prevents startup.
//! JSON documents are accepted as well, since they parse as YAML.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, SlrunError, SlrunResult};
use crate::types::{FunctionId, ImageTag, Port};

/// Raw function entry as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawFunctionConfig {
    name: String,
    build_dir: String,
}

/// Raw runtime settings.
#[derive(Debug, Deserialize)]
struct RawRuntimeConfig {
    #[serde(default = "default_image_prefix")]
    image_prefix: String,
    #[serde(default = "default_container_port")]
    container_port: u16,
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,
    #[serde(default = "default_invoke_timeout_ms")]
    invoke_timeout_ms: u64,
    #[serde(default)]
    docker_host: Option<String>,
}

fn default_image_prefix() -> String {
    "slrun-".to_string()
}

fn default_container_port() -> u16 {
    Port::HTTP.value()
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_invoke_timeout_ms() -> u64 {
    30000 // 30 seconds
}

impl Default for RawRuntimeConfig {
    fn default() -> Self {
        Self {
            image_prefix: default_image_prefix(),
            container_port: default_container_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
            docker_host: None,
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    runtime: RawRuntimeConfig,
    functions: Vec<RawFunctionConfig>,
}

/// Validated function configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: FunctionId,
    pub build_dir: PathBuf,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub image_prefix: String,
    /// Port each function listens on inside its container.
    pub container_port: Port,
    /// Grace period for in-flight requests when the gateway shuts down.
    pub shutdown_timeout: Duration,
    pub invoke_timeout: Duration,
    pub docker_host: Option<String>,
}

impl RuntimeConfig {
    /// Image tag for a function under this configuration.
    pub fn image_tag(&self, id: &FunctionId) -> ImageTag {
        ImageTag::for_function(&self.image_prefix, id)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image_prefix: default_image_prefix(),
            container_port: Port::HTTP,
            shutdown_timeout: Duration::from_secs(default_shutdown_timeout_secs()),
            invoke_timeout: Duration::from_millis(default_invoke_timeout_ms()),
            docker_host: None,
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub functions: Vec<FunctionConfig>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    ///
    /// Relative `build_dir` entries are resolved against the directory
    /// holding the file.
    pub fn load_file(path: impl AsRef<Path>) -> SlrunResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SlrunError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SlrunError::Io {
            context: "reading config file",
            source: e,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::load_string_in(&content, base_dir)
    }

    /// Load and validate configuration from a YAML string.
    /// Relative build directories stay relative to the working directory.
    pub fn load_string(content: &str) -> SlrunResult<Config> {
        Self::load_string_in(content, Path::new(""))
    }

    fn load_string_in(content: &str, base_dir: &Path) -> SlrunResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| SlrunError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw, base_dir)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig, base_dir: &Path) -> SlrunResult<Config> {
        let runtime = Self::validate_runtime(raw.runtime)?;

        let mut functions = Vec::with_capacity(raw.functions.len());
        let mut seen_names = HashSet::new();

        for (index, raw_func) in raw.functions.into_iter().enumerate() {
            let func = Self::validate_function(raw_func, index, base_dir)?;

            if !seen_names.insert(func.name.clone()) {
                return Err(HardValidationError::DuplicateFunctionName {
                    name: func.name.to_string(),
                }
                .into());
            }

            functions.push(func);
        }

        if functions.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one function must be defined".to_string(),
            }
            .into());
        }

        Ok(Config { runtime, functions })
    }

    /// Validate runtime settings.
    fn validate_runtime(raw: RawRuntimeConfig) -> SlrunResult<RuntimeConfig> {
        // The prefix plus any valid name must stay a legal repository name.
        // Names are complete path components, so the shortest one stands in
        // for all of them.
        let prefix_ok = !raw.image_prefix.is_empty()
            && ImageTag::is_valid_repository(&format!("{}a", raw.image_prefix));
        if !prefix_ok {
            return Err(HardValidationError::InvalidFieldValue {
                field: "image_prefix",
                value: raw.image_prefix,
                reason: "Must be non-empty and form a legal repository name when followed by a function name".to_string(),
            }
            .into());
        }

        let container_port = Port::new(raw.container_port)?;

        if raw.shutdown_timeout_secs == 0 || raw.shutdown_timeout_secs > 300 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "shutdown_timeout_secs",
                value: raw.shutdown_timeout_secs.to_string(),
                reason: "Must be between 1 and 300".to_string(),
            }
            .into());
        }

        if raw.invoke_timeout_ms == 0 || raw.invoke_timeout_ms > 900_000 {
            // 15 minutes max
            return Err(HardValidationError::InvalidFieldValue {
                field: "invoke_timeout_ms",
                value: raw.invoke_timeout_ms.to_string(),
                reason: "Must be between 1 and 900000 (15 minutes)".to_string(),
            }
            .into());
        }

        if raw.docker_host.as_deref().is_some_and(str::is_empty) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "docker_host",
                value: String::new(),
                reason: "Omit the field to use the local engine defaults".to_string(),
            }
            .into());
        }

        Ok(RuntimeConfig {
            image_prefix: raw.image_prefix,
            container_port,
            shutdown_timeout: Duration::from_secs(raw.shutdown_timeout_secs),
            invoke_timeout: Duration::from_millis(raw.invoke_timeout_ms),
            docker_host: raw.docker_host,
        })
    }

    /// Validate a single function entry.
    fn validate_function(
        raw: RawFunctionConfig,
        index: usize,
        base_dir: &Path,
    ) -> SlrunResult<FunctionConfig> {
        let name = FunctionId::new(&raw.name)?;

        // Existence is checked at build time, the directory may be generated.
        if raw.build_dir.trim().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "build_dir",
                context: format!("function '{}' at index {}", name, index),
            }
            .into());
        }

        let build_dir = PathBuf::from(&raw.build_dir);
        let build_dir = if build_dir.is_relative() {
            base_dir.join(build_dir)
        } else {
            build_dir
        };

        Ok(FunctionConfig { name, build_dir })
    }
}
