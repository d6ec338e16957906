// Configuration management module
// TOML settings for the embedding service, language model, retrieval and HTTP server

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, LlmConfig, OllamaConfig, RetrievalConfig, ServerConfig,
};

/// Resolve the configuration directory, falling back to the default location
#[inline]
pub fn resolve_config_dir(
    explicit: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    explicit.map_or_else(Config::default_dir, Ok)
}
