pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod model;
pub mod nodemanager;
pub mod plugin;
pub mod simulate;

pub use error::{Result, SkoopError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
