//! # Core Runtime Module
//!
//! Runtime infrastructure shared by every agent crate:
//! - Logging and tracing setup
//! - Agent configuration
//! - Event bus
//!
//! ## Overview
//!
//! Nothing in here knows about samples or uploads; it establishes the logging
//! conventions, configuration validation and event broadcasting the domain crates
//! build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AgentConfig, AgentConfigBuilder, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
