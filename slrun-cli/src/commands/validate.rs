// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slrun validate` command - Validate configuration file.

use slrun_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Runtime Settings:");
            println!("  Image Prefix:       {}", config.runtime.image_prefix);
            println!("  Container Port:     {}/tcp", config.runtime.container_port);
            println!(
                "  Shutdown Timeout:   {}s",
                config.runtime.shutdown_timeout.as_secs()
            );
            println!(
                "  Invoke Timeout:     {}ms",
                config.runtime.invoke_timeout.as_millis()
            );
            println!(
                "  Docker Host:        {}",
                config.runtime.docker_host.as_deref().unwrap_or("(local default)")
            );
            println!();
            println!("Functions ({}):", config.functions.len());

            let mut missing = 0;
            for func in &config.functions {
                let image = config.runtime.image_tag(&func.name);
                if func.build_dir.is_dir() {
                    println!("  - {} ({}, from {})", func.name, image, func.build_dir.display());
                } else {
                    missing += 1;
                    println!(
                        "  ! {} ({}, build directory {} not found)",
                        func.name,
                        image,
                        func.build_dir.display()
                    );
                }
            }

            if missing > 0 {
                println!();
                println!(
                    "⚠ {} build director{} missing; `slrun up` will fail until they exist",
                    missing,
                    if missing == 1 { "y is" } else { "ies are" }
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
