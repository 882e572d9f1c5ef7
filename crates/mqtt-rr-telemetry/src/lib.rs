//! # mqtt-rr telemetry
//!
//! Structured logging for mqtt-rr services.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mqtt_rr_telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("mqtt-rr-node");
//! let _guard = init_tracing(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RR_SERVICE_NAME` | `mqtt-rr` | Service name on the startup line |
//! | `RR_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `RR_JSON_LOGS` | `false` (`true` in containers) | JSON output |
//! | `RR_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::{env_filter, init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Global subscriber already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
