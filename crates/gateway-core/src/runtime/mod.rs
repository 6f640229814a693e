//! Running configuration and its hot-reload holder.
//!
//! A [`RunningConfiguration`] is built once from a [`GatewayConfig`] and never
//! mutated afterwards. Changing configuration means building a new snapshot and
//! swapping it into the [`ConfigHandle`]:
//!
//! ```no_run
//! use gateway_core::{config::AppConfig, metrics::MetricsCollector, runtime::ConfigHandle};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let handle = ConfigHandle::new(
//!     &config.gateway,
//!     config.timings.clone(),
//!     Arc::new(MetricsCollector::new()),
//! )?;
//!
//! // later, e.g. on SIGHUP
//! let config = AppConfig::load()?;
//! handle.reload(&config.gateway)?;
//!
//! // on exit
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! [`GatewayConfig`]: crate::config::GatewayConfig

mod builder;
mod lifecycle;

pub use builder::{BuildError, RunningConfiguration};
pub use lifecycle::ConfigHandle;
