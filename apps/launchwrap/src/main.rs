//! # launchwrap - Module Launcher
//!
//! The main binary: bootstraps plugin bundles against the unit loader, then
//! hands control to the launch target.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                apps/launchwrap (THE BINARY)              │
//! │                                                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────┐  │
//! │  │    CLI      │   │   Config    │   │ Built-in units│  │
//! │  │  (clap)     │   │   (toml)    │   │  (registry)   │  │
//! │  └──────┬──────┘   └──────┬──────┘   └───────┬───────┘  │
//! │         └─────────────────┼──────────────────┘          │
//! │                           ▼                             │
//! │                  ┌─────────────────┐                    │
//! │                  │ launchwrap-core │                    │
//! │                  │  (THE LOADER)   │                    │
//! │                  └─────────────────┘                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! launchwrap --gameDir ./run --tweakClass ext.mods.ModTweaker --width 800
//! ```

use launchwrap::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // LAUNCHWRAP_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("LAUNCHWRAP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "launchwrap=info,launchwrap_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = match cli::Cli::parse_args(std::env::args()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    tracing::info!("Loading launchwrap v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
