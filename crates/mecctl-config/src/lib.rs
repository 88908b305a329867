//! CLI flags, topology profile loading, and logging bootstrap (C8's configuration
//! surface; the actual bus-connect/subscribe wiring lives in `bin/mecctl`).

pub mod cli;
pub mod error;
pub mod logging;
pub mod profile;

pub use cli::{Args, LogLevel, MigrateMethodArg, PlannerArg};
pub use error::{ConfigError, Result};
pub use profile::{ProfileServer, TopologyProfile};
