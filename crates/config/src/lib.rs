//! Configuration for the persona conversation pipeline
//!
//! Settings load in layers: `config/default.yaml`, then
//! `config/{env}.yaml`, then `AVATAR_*` environment variables (double
//! underscore as the section separator, e.g. `AVATAR_LLM__API_KEY`).

mod settings;

pub use settings::{
    AgentSettings, FeatureFlags, ImageGenSettings, LlmSettings, ObservabilitySettings,
    PersistenceSettings, PersonaSourceSettings, ProductsSettings, RuntimeEnvironment,
    ServerSettings, Settings, StorageSettings, SttSettings, TtsSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Load settings for the given environment name.
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` >
/// built-in defaults. Missing files are not an error.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder.add_source(config::File::with_name(&format!("config/{env}")).required(false));
    }

    let loaded = builder
        .add_source(config::Environment::with_prefix("AVATAR").separator("__"))
        .build()?;

    let settings: Settings = loaded.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
