// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Maximum function name length, leaves room for the image prefix.
const MAX_FUNCTION_ID_LEN: usize = 64;
/// Longest repository name the engine accepts.
const MAX_REPOSITORY_LEN: usize = 255;

/// Whether `component` is one `/`-separated path component of a
/// repository name: lowercase alphanumeric runs joined by a single `.`,
/// `_`, `__` or any number of `-`.
fn is_path_component(component: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let mut rest = component;
    loop {
        let run = rest.find(|c: char| !alnum(c)).unwrap_or(rest.len());
        if run == 0 {
            return false;
        }
        rest = &rest[run..];
        if rest.is_empty() {
            return true;
        }

        let sep_len = rest.find(alnum).unwrap_or(rest.len());
        let separator = &rest[..sep_len];
        let legal = matches!(separator, "." | "_" | "__") || separator.chars().all(|c| c == '-');
        if !legal {
            return false;
        }
        rest = &rest[sep_len..];
    }
}

/// Whether `domain` is a registry host, optionally with a port.
fn is_registry_domain(domain: &str) -> bool {
    let (host, port) = match domain.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    let host_ok = host.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let port_ok = match port {
        Some(port) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
        None => true,
    };
    host_ok && port_ok
}

/// Validated function identifier.
///
/// One repository path component, max 64 chars: lowercase ASCII
/// alphanumerics joined by `.`, `_`, `__` or runs of `-`, never starting or
/// ending with a separator. The derived image tag must be a legal
/// repository name, which also rules out uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionId(String);

impl FunctionId {
    /// Create a new FunctionId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: id,
                reason: "Function name cannot be empty".to_string(),
            });
        }

        if id.len() > MAX_FUNCTION_ID_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: id.clone(),
                reason: format!(
                    "Function name too long: {} chars (max {})",
                    id.len(),
                    MAX_FUNCTION_ID_LEN
                ),
            });
        }

        if !is_path_component(&id) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: id,
                reason: "Function name must be lowercase letters and digits, separated by a single '.', '_', '__' or a run of '-'".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FunctionId {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FunctionId> for String {
    fn from(id: FunctionId) -> Self {
        id.0
    }
}

/// Image tag in the engine's image store.
///
/// Always `prefix + function name`, so rebuilding a function targets the
/// same image slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageTag(String);

impl ImageTag {
    /// Derive the image tag for a function.
    pub fn for_function(prefix: &str, id: &FunctionId) -> Self {
        Self(format!("{}{}", prefix, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `name` is a legal repository name: an optional registry
    /// domain followed by `/`-separated path components.
    pub fn is_valid_repository(name: &str) -> bool {
        if name.is_empty() || name.len() > MAX_REPOSITORY_LEN {
            return false;
        }

        let mut components = name.split('/').peekable();
        if let Some(first) = components.next() {
            let has_path = components.peek().is_some();
            let is_domain = has_path
                && (first.contains(['.', ':'])
                    || first == "localhost"
                    || first.chars().any(|c| c.is_ascii_uppercase()));
            let first_ok = if is_domain {
                is_registry_domain(first)
            } else {
                is_path_component(first)
            };
            if !first_ok {
                return false;
            }
        }
        components.all(is_path_component)
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a container instance as issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Validated network port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Plain HTTP, the default listening port inside function containers.
    pub const HTTP: Port = Port(80);

    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// Loopback address at which a running function accepts invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(SocketAddrV4);

impl Endpoint {
    /// Endpoint on 127.0.0.1 at the given engine-allocated host port.
    pub fn loopback(port: Port) -> Self {
        Self(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port.value()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.0)
    }

    /// URL for a request path on this endpoint.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}{}", self.0, path)
        } else {
            format!("http://{}/{}", self.0, path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_id_valid() {
        assert!(FunctionId::new("my-function").is_ok());
        assert!(FunctionId::new("function_123").is_ok());
        assert!(FunctionId::new("echo.v2").is_ok());
        assert!(FunctionId::new("9lives").is_ok());
        assert!(FunctionId::new("a__b").is_ok());
        assert!(FunctionId::new("a---b").is_ok());
    }

    #[test]
    fn test_function_id_invalid() {
        assert!(FunctionId::new("").is_err());
        assert!(FunctionId::new("a".repeat(65)).is_err());
        assert!(FunctionId::new("MyFunc").is_err());
        assert!(FunctionId::new("-leading").is_err());
        assert!(FunctionId::new("func name").is_err());
        assert!(FunctionId::new("func/name").is_err());
    }

    #[test]
    fn test_function_id_separator_grammar() {
        for name in ["echo.", "echo-", "echo_", "a..b", "a___b", "a._b", "a-.b", "a_-b"] {
            assert!(FunctionId::new(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_repository_names() {
        assert!(ImageTag::is_valid_repository("slrun-echo"));
        assert!(ImageTag::is_valid_repository("team/slrun-echo"));
        assert!(ImageTag::is_valid_repository("registry.local:5000/team/slrun-echo"));
        assert!(ImageTag::is_valid_repository("localhost/echo"));

        assert!(!ImageTag::is_valid_repository(""));
        assert!(!ImageTag::is_valid_repository("slrun//echo"));
        assert!(!ImageTag::is_valid_repository("slrun-_echo"));
        assert!(!ImageTag::is_valid_repository("/echo"));
        assert!(!ImageTag::is_valid_repository("team/"));
        assert!(!ImageTag::is_valid_repository("Team/Echo"));
        assert!(!ImageTag::is_valid_repository("registry.local:port/echo"));
        assert!(!ImageTag::is_valid_repository(&"a".repeat(256)));
    }

    #[test]
    fn test_image_tag_derivation() {
        let id = FunctionId::new("echo").unwrap();
        let tag = ImageTag::for_function("slrun-", &id);
        assert_eq!(tag.as_str(), "slrun-echo");
        assert_eq!(tag, ImageTag::for_function("slrun-", &id));
    }

    #[test]
    fn test_container_id_short_display() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.to_string(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").to_string(), "abc");
    }

    #[test]
    fn test_port_invalid() {
        assert!(Port::new(0).is_err());
        assert!(Port::new(65535).is_ok());
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint::loopback(Port::new(49153).unwrap());
        assert_eq!(endpoint.to_string(), "127.0.0.1:49153");
        assert_eq!(endpoint.url("/"), "http://127.0.0.1:49153/");
        assert_eq!(endpoint.url("hello?x=1"), "http://127.0.0.1:49153/hello?x=1");
    }
}
