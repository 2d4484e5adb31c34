//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the comic library core:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the storage and sync
//! crates depend on. It establishes the logging conventions and the validated
//! configuration shared by the scan pipeline.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
