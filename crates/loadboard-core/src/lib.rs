//! Core types and configuration for the `loadboard` ice loading dashboard
//!
//! Holds everything that does not talk to the backend: the selection enums the
//! backend uses for requests and vehicles, the predicate (domain) model, the
//! dispatch-time [`DateRange`], the tile catalogue and [`DashboardConfig`].

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod tile;
pub mod types;

// Re-export commonly used types
pub use config::{DashboardConfig, LoggingConfig, RealtimeMode};
pub use error::{Error, Result};
pub use tile::StatTile;
pub use types::{
    Condition, DateRange, Domain, DomainValue, LoadingState, Many2One, Model, Operator, Priority,
    VehicleStatus,
};

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `config.level`; `config.format` selects
/// JSON (`"json"`) or human readable output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let result = if config.format == "json" {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };

    result.map_err(|e| Error::configuration(format!("Failed to initialise logging: {e}")))
}
