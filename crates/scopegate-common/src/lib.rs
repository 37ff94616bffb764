//! ---
//! sg_section: "06-configuration"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Shared configuration and tracing setup."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! Runtime configuration loading and production tracing setup shared by
//! the scopegate binaries.

pub mod config;
pub mod logging;

pub use config::{AppConfig, AuthzConfig, LoadedAppConfig, LoggingConfig, MetricsConfig};
pub use logging::{init_tracing, LogFormat};
