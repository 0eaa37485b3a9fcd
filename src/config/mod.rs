pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigOverrides, DEFAULT_CONFIG_TOML, load_config};
pub use models::*;
pub use validation::{ForwarderConfigValidator, ValidationError, ValidationResult};
