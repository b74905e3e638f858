// Configuration management module
// TOML settings plus the resolvers that turn connection names into connection strings

pub mod interactive;
pub mod resolver;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use resolver::{ConfigNameResolver, EnvNameResolver, LayeredResolver, NameResolver};
pub use settings::{Config, ConfigError, SearchConfig, StoreConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
