//! # zcpublish core
//!
//! Core types, error handling, and configuration for the zcpublish
//! service announcer.
//!
//! - **Types**: endpoint identities, endpoint kinds and the sample
//!   specification (format, rate, channels, channel map) that is published
//!   for every sink and source.
//! - **Errors**: `thiserror` based errors for the few failures that reach the
//!   caller, chiefly configuration errors at startup.
//! - **Configuration**: YAML files, environment overrides and validation.
//!
//! ## Example
//!
//! ```
//! use zcpublish_core::types::{Endpoint, EndpointKind};
//! use zcpublish_core::config::PublishConfig;
//!
//! let sink = Endpoint::builder(7, EndpointKind::Sink, "alsa_output.pci")
//!     .description("Built-in Audio")
//!     .build();
//! assert_eq!(sink.kind.service_type(), "_pulse-sink._tcp");
//!
//! assert!(PublishConfig::with_port(0).validate().is_err());
//! ```

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{AppConfig, LogFormat, LoggingConfig, PublishConfig};
pub use error::{ConfigError, Result, ZcError};
pub use types::{Endpoint, EndpointId, EndpointKind, EndpointRef, SampleFormat, SampleSpec};
