// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slrun up` command - Build, start and serve every function.
//!
//! Startup: build all images (abort on the first failure), reconcile so each
//! function has exactly one running container, then serve the gateway.
//! Shutdown on SIGINT/SIGTERM: stop accepting, let in-flight requests finish
//! within the configured grace period, then stop every container.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use slrun_core::FunctionState;

use crate::{gateway, metrics};

pub async fn execute(
    config_path: &str,
    host: IpAddr,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting slrun");

    let runtime = Arc::new(super::load_runtime(config_path).await?);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                       SLRUN RUNTIME                          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    for id in runtime.registry().function_ids() {
        println!("▶ Building function: {}", id);
        match runtime.build(id).await {
            Ok(image) => println!("  ✓ {} built as {}", id, image),
            Err(e) => {
                println!("  ✗ {} failed: {}", id, e);
                tracing::error!(function = %id, error = %e, "Build failed, aborting startup");
                return Err(e.into());
            }
        }
    }

    // Anything a failed start leaves running is stopped before returning.
    if let Err(e) = runtime.launch().await {
        tracing::error!(error = %e, "Cannot start functions");
        return Err(e.into());
    }

    let addr = SocketAddr::new(host, port);
    print_status(&runtime, addr);
    metrics::init();
    metrics::RUNNING_FUNCTIONS.set(runtime.registry().len() as i64);

    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let grace = runtime.config().shutdown_timeout;
    let served = gateway::serve(addr, Arc::clone(&runtime), shutdown_signal(), grace).await;

    println!();
    println!("Shutting down...");
    tracing::info!("Stopping functions");

    // Containers are stopped even when the gateway failed.
    let stopped = runtime.stop().await;
    metrics::RUNNING_FUNCTIONS.set(0);

    if let Err(e) = &served {
        eprintln!("✗ Gateway failed: {}", e);
    }

    match stopped {
        Ok(count) => {
            println!("  ✓ Stopped {} function(s)", count);
            println!();
            println!("slrun stopped.");
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            return Err(e.into());
        }
    }

    served.map_err(|e| e as Box<dyn std::error::Error>)
}

fn print_status(runtime: &slrun_core::Runtime, addr: SocketAddr) {
    let statuses = runtime.statuses();
    let running = statuses.iter().filter(|s| s.running).count();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ Status: {} functions running                                 ║", running);
    println!("╠══════════════════════════════════════════════════════════════╣");

    for status in &statuses {
        let status_icon = if status.state == FunctionState::Running {
            "●"
        } else {
            "○"
        };
        let endpoint = status
            .endpoint
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "║ {} {:<20} → http://{}/function/{} ({})",
            status_icon, status.name, addr, status.name, endpoint
        );
    }

    println!("╚══════════════════════════════════════════════════════════════╝");
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
