//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → handed to CircuitBreaker / RetryPolicy / TimeoutGuard constructors
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; executors copy what they need
//! - All fields have defaults to allow minimal configs
//! - Durations are stored as integer milliseconds, exposed as `Duration`
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::CircuitBreakerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ResilienceConfig;
pub use schema::RetryConfig;
pub use schema::TimeoutConfig;
pub use validation::{validate_config, ValidationError};
