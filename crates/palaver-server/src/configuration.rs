use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use palaver::providers::configs::{AnthropicProviderConfig, ProviderConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_max_tokens")]
        max_tokens: i32,
    },
}

impl ProviderSettings {
    // Convert to the palaver ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StorageSettings {
    Memory,
    File {
        #[serde(default = "default_data_dir")]
        path: String,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthSettings {
    /// Comma-separated `token=owner` pairs.
    #[serde(default)]
    pub tokens: String,
}

impl AuthSettings {
    pub fn token_map(&self) -> HashMap<String, String> {
        self.tokens
            .split(',')
            .filter_map(|pair| {
                let (token, owner) = pair.split_once('=')?;
                let token = token.trim();
                let owner = owner.trim();
                if token.is_empty() || owner.is_empty() {
                    return None;
                }
                Some((token.to_string(), owner.to_string()))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default = "default_storage")]
    pub storage: StorageSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.host", default_anthropic_host())?
            .set_default("provider.model", default_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("PALAVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Surface missing fields as the env var the operator has to set
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_anthropic_host() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_max_tokens() -> i32 {
    1024
}

fn default_data_dir() -> String {
    "./data/conversations".to_string()
}

fn default_storage() -> StorageSettings {
    StorageSettings::Memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("PALAVER_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        env::set_var("PALAVER_PROVIDER__TYPE", "anthropic");
        env::set_var("PALAVER_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert!(matches!(settings.storage, StorageSettings::Memory));
        assert!(settings.auth.token_map().is_empty());

        let ProviderSettings::Anthropic {
            host,
            api_key,
            model,
            max_tokens,
        } = settings.provider;
        assert_eq!(host, "https://api.anthropic.com");
        assert_eq!(api_key, "test-key");
        assert_eq!(model, "claude-haiku-4-5-20251001");
        assert_eq!(max_tokens, 1024);

        env::remove_var("PALAVER_PROVIDER__TYPE");
        env::remove_var("PALAVER_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("PALAVER_SERVER__PORT", "8080");
        env::set_var("PALAVER_PROVIDER__TYPE", "anthropic");
        env::set_var("PALAVER_PROVIDER__API_KEY", "test-key");
        env::set_var("PALAVER_PROVIDER__MODEL", "claude-sonnet-4-5");
        env::set_var("PALAVER_PROVIDER__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);

        let ProviderSettings::Anthropic {
            model, max_tokens, ..
        } = settings.provider;
        assert_eq!(model, "claude-sonnet-4-5");
        assert_eq!(max_tokens, 2000);

        env::remove_var("PALAVER_SERVER__PORT");
        env::remove_var("PALAVER_PROVIDER__TYPE");
        env::remove_var("PALAVER_PROVIDER__API_KEY");
        env::remove_var("PALAVER_PROVIDER__MODEL");
        env::remove_var("PALAVER_PROVIDER__MAX_TOKENS");
    }

    #[test]
    #[serial]
    fn test_file_storage_settings() {
        clean_env();
        env::set_var("PALAVER_PROVIDER__TYPE", "anthropic");
        env::set_var("PALAVER_PROVIDER__API_KEY", "test-key");
        env::set_var("PALAVER_STORAGE__TYPE", "file");
        env::set_var("PALAVER_STORAGE__PATH", "/tmp/palaver-test");

        let settings = Settings::new().unwrap();
        match settings.storage {
            StorageSettings::File { path } => assert_eq!(path, "/tmp/palaver-test"),
            other => panic!("expected file storage, got {:?}", other),
        }

        env::remove_var("PALAVER_PROVIDER__TYPE");
        env::remove_var("PALAVER_PROVIDER__API_KEY");
        env::remove_var("PALAVER_STORAGE__TYPE");
        env::remove_var("PALAVER_STORAGE__PATH");
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();
        env::set_var("PALAVER_PROVIDER__TYPE", "anthropic");

        let result = Settings::new();
        assert!(matches!(result, Err(ConfigError::MissingEnvVar { .. })));

        env::remove_var("PALAVER_PROVIDER__TYPE");
    }

    #[test]
    fn test_token_map_parsing() {
        let auth = AuthSettings {
            tokens: "abc=alice, def=bob,=ignored,broken".to_string(),
        };
        let map = auth.token_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["abc"], "alice");
        assert_eq!(map["def"], "bob");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
