//! Configuration module for rustmatch
//!
//! This module provides configuration management for the matchers and the
//! capture session.

pub mod config;
pub mod params;

pub use config::{ConfigError, ConfigLoader, MatchConfig};
pub use params::{ExtractorParams, MatchStrategy, MatcherParams, SessionParams};
