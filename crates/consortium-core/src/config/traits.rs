//! Core configuration trait

use crate::errors::ConsortiumError;
use std::path::Path;

/// Configuration types loadable from TOML with environment overrides
pub trait Config: Clone + Default + Send + Sync + 'static {
    /// Error type for configuration operations
    type Error: Into<ConsortiumError> + From<ConsortiumError>;

    /// Default configuration values
    fn defaults() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    fn load_from_file(path: &Path) -> Result<Self, Self::Error>;

    /// Defaults or `path`, then environment overrides, then validation
    fn load(path: Option<&Path>) -> Result<Self, Self::Error> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::defaults(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    fn merge_with_env(&mut self) -> Result<(), Self::Error> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from an explicit set of variables
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = (String, String)>;

    /// Set a single `section.key` value from a string
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), Self::Error>;
}
