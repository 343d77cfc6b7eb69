//! Picks Common - shared configuration, validation and logging for the
//! daily picks service.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Logging setup
//! - Utility functions

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    CacheControlConfig, Config, NewsConfig, ObservabilityConfig, PicksConfig, ScoringConfig,
    ServerConfig, StoreBackend, StoreConfig, UpstreamConfig,
};
pub use validation::{Validate, ValidationError, ValidationResult};
