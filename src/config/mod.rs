//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command-line flags override file values (cli.rs)
//!     → validation.rs (semantic checks, every error reported)
//!     → SyncConfig (validated, immutable)
//!     → moved into the startup context
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::CliArgs;
pub use loader::{load_config, resolve, ConfigError};
pub use schema::SyncConfig;
pub use validation::{validate_config, ValidationError};
