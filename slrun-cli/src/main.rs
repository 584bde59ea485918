// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! slrun CLI
//!
//! Command-line interface for the slrun function runtime.

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod gateway;
mod metrics;

/// slrun - Build functions into containers and invoke them by name
#[derive(Parser)]
#[command(name = "slrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "slrun.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, start and serve every configured function
    Up {
        /// Gateway listen address
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Gateway listen port
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },

    /// Build every function image without starting containers
    Build,

    /// Stop containers left running by an earlier run
    Down,

    /// List configured functions
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Up { host, port } => commands::up::execute(&cli.config, host, port).await,
        Commands::Build => commands::build::execute(&cli.config).await,
        Commands::Down => commands::down::execute(&cli.config).await,
        Commands::List { json } => commands::list::execute(&cli.config, json).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
