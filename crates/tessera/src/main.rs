// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tessera - a dashboard plugin runtime.
//!
//! This is the binary entry point for the Tessera host.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod check;
mod plugins;
mod serve;
mod state;

/// Tessera - a dashboard plugin runtime.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the plugin runtime host.
    Serve,
    /// List discovered plugins.
    Plugins,
    /// Validate a single plugin manifest.
    Check {
        /// Path to a `plugin.toml` file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match tessera_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tessera_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Some(Commands::Serve) => match serve::run_serve(config).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        },
        Some(Commands::Plugins) => plugins::run_plugins(&config),
        Some(Commands::Check { path }) => check::run_check(&path),
        None => {
            println!("tessera: use --help for available commands");
            0
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    #[serial_test::serial]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed)
        let config = tessera_config::load_and_validate()
            .expect("default config should be valid");
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.lifecycle.restart_ceiling, 3);
    }
}
