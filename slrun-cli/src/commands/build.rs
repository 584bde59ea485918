// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slrun build` command - Build every function image without starting.

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = super::load_runtime(config_path).await?;

    for id in runtime.registry().function_ids() {
        print!("▶ Building {}... ", id);
        match runtime.build(id).await {
            Ok(image) => println!("✓ {}", image),
            Err(e) => {
                println!("✗");
                return Err(e.into());
            }
        }
    }

    println!();
    println!("Built {} image(s).", runtime.registry().len());
    Ok(())
}
