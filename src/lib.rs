//! Resilient client for a feature-flag management API.
//!
//! - `credentials` - token validation (construction gate and strict format check)
//! - `config` - client options, defaults and clamps
//! - `http` - rate limiting, request execution, classification and retry
//! - `health` - rolling-window health tracking
//! - `flags` - flag operations and the [`FlagClient`]

pub mod config;
pub mod credentials;
pub mod env;
pub mod error;
pub mod flags;
pub mod health;
pub mod http;

pub use config::{ClientConfig, ClientOptions};
pub use error::{ApiResult, ConfigurationError, ErrorKind, RequestError};
pub use flags::{FeatureFlag, FlagClient, FlagList, FlagService, FlagStatus};
pub use health::{HealthMonitor, HealthStatus};
