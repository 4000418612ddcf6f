// Agentwatch Core - Domain Logic, Ports & Scanners
// NO infrastructure dependencies: OS probes and log files are adapters

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
