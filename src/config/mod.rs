//! Configuration module for Frame-Archiver
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use frame_archiver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("archiver.toml")).unwrap();
//! println!("Fetching with concurrency {}", config.scheduler.max_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, OutputConfig, SchedulerConfig, WindowConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
