use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a settings field to the environment variable that supplies it,
/// e.g. `api_key` -> `PALAVER_PROVIDER__API_KEY` style names.
pub fn to_env_var(field: &str) -> String {
    format!("PALAVER_{}", field.replace('.', "__").to_uppercase())
}
