// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slrun down` command - Stop containers left behind by an earlier run.
//!
//! Matches running containers to configured functions by image and stops
//! them. Nothing is built or started.

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Tearing down function containers...");

    let runtime = super::load_runtime(config_path).await?;
    let stopped = runtime.teardown().await?;

    if stopped == 0 {
        println!("No function containers running.");
    } else {
        println!("✓ Stopped {} container(s)", stopped);
    }
    Ok(())
}
