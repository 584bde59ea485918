// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slrun list` command - List functions from configuration.
//!
//! Lists functions defined in the configuration file with the image tag
//! each one builds into.

use slrun_core::ConfigLoader;

pub async fn execute(config_path: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;

    if json {
        let functions: Vec<_> = config
            .functions
            .iter()
            .map(|func| {
                serde_json::json!({
                    "name": func.name,
                    "image": config.runtime.image_tag(&func.name),
                    "build_dir": func.build_dir,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                           CONFIGURED FUNCTIONS                               ║");
    println!("╠═══════════════════╦═════════════════════════╦════════════════════════════════╣");
    println!("║ Name              ║ Image                   ║ Build Directory                ║");
    println!("╠═══════════════════╬═════════════════════════╬════════════════════════════════╣");

    for func in &config.functions {
        println!(
            "║ {:<17} ║ {:<23} ║ {:<30} ║",
            func.name.as_str(),
            config.runtime.image_tag(&func.name).as_str(),
            func.build_dir.display().to_string()
        );
    }

    println!("╚═══════════════════╩═════════════════════════╩════════════════════════════════╝");
    println!();
    println!("Total: {} function(s)", config.functions.len());

    Ok(())
}
