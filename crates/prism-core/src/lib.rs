// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;

pub use config::{load_toml, ConfigError};

/// Installs the global fmt subscriber.
///
/// `directive` wins over `RUST_LOG`; with neither set the filter is `info`.
/// Safe to call more than once, later calls are ignored.
pub fn init_tracing(directive: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match directive {
        Some(d) => EnvFilter::new(d),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
