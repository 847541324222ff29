mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{
    AdminSettings, AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings,
    Environment, GithubSettings, RuntimeSettings, SecuritySettings, Settings, TelemetrySettings,
};
