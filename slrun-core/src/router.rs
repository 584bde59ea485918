// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Invocation router.
//!
//! Resolves a function name to the endpoint of its running container and
//! forwards a call there over loopback HTTP/1.1. The response body is
//! returned as-is whatever the HTTP status; only transport failures are
//! errors.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HOST;
use reqwest::Client;

use crate::error::InvokeError;
use crate::registry::FunctionRegistry;
use crate::types::{Endpoint, FunctionId};

pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};

/// A call to forward to a function.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: Method,
    /// Path and query relative to the function's root.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Invocation {
    /// Plain `GET` with no headers or body.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// A function's answer to an [`Invocation`].
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Find the endpoint of a running function.
///
/// Unknown names fail with [`InvokeError::NotFound`]; known functions
/// without a live endpoint fail with [`InvokeError::NotRunning`].
pub fn resolve(registry: &FunctionRegistry, name: &str) -> Result<(FunctionId, Endpoint), InvokeError> {
    let id = registry
        .resolve(name)
        .ok_or_else(|| InvokeError::NotFound(name.to_string()))?;

    match registry.endpoint(&id) {
        Ok(Some(endpoint)) => Ok((id, endpoint)),
        Ok(None) => Err(InvokeError::NotRunning(id)),
        Err(_) => Err(InvokeError::NotFound(name.to_string())),
    }
}

/// HTTP client for function endpoints.
#[derive(Debug, Clone)]
pub struct Invoker {
    client: Client,
}

impl Invoker {
    /// Create an invoker whose calls give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self { client })
    }

    /// `GET` `path` on a function's endpoint and return the response body.
    pub async fn invoke(
        &self,
        function: &FunctionId,
        endpoint: Endpoint,
        path: &str,
    ) -> Result<Bytes, InvokeError> {
        self.forward(function, endpoint, Invocation::get(path))
            .await
            .map(|response| response.body)
    }

    /// Forward a full request to a function's endpoint.
    ///
    /// The caller's `Host` header is dropped; the client sets the endpoint's.
    pub async fn forward(
        &self,
        function: &FunctionId,
        endpoint: Endpoint,
        invocation: Invocation,
    ) -> Result<InvocationResponse, InvokeError> {
        let url = endpoint.url(&invocation.path);
        let transport = |source| InvokeError::Transport {
            function: function.clone(),
            source,
        };

        let mut headers = invocation.headers;
        headers.remove(HOST);

        tracing::debug!(function = %function, method = %invocation.method, url = %url, "Forwarding invocation");

        let response = self
            .client
            .request(invocation.method, &url)
            .headers(headers)
            .body(invocation.body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?;

        tracing::debug!(function = %function, status = %status, bytes = body.len(), "Invocation returned");

        Ok(InvocationResponse {
            status,
            headers,
            body,
        })
    }
}
