//! Configuration from environment variables.

use std::time::Duration;

use tenfold_gateway::OpenAiConfig;

use crate::error::AppError;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODELS: &str = "gpt-4o-mini";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration.
///
/// Providers are configured in failover order: the `openai`-named primary
/// from `OPENAI_*`, and an optional `fallback` from `FALLBACK_*` pointing
/// at any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL URL; unset keeps sessions in process memory.
    pub database_url: Option<String>,
    /// HS256 secret shared with the login service.
    pub secret_key: String,
    /// Shared secret for the admin surface; unset disables it.
    pub admin_token: Option<String>,
    pub providers: Vec<OpenAiConfig>,
    /// Provider tried first for narrative turns, if named.
    pub provider_preference: Option<String>,
    /// Provider used for abuse review, typically a cheaper model.
    pub review_preference: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a required variable is missing or
    /// unparsable.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = lookup("PORT")
            .unwrap_or_else(|| "8000".to_owned())
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;

        let secret_key = lookup("SECRET_KEY")
            .ok_or_else(|| AppError::Config("SECRET_KEY must be set".to_owned()))?;

        let mut providers = Vec::new();
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            providers.push(OpenAiConfig {
                name: "openai".to_owned(),
                base_url: lookup("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned()),
                api_key,
                models: split_models(
                    &lookup("OPENAI_MODELS").unwrap_or_else(|| DEFAULT_MODELS.to_owned()),
                ),
                connect_timeout: CONNECT_TIMEOUT,
            });
        }
        if let Some(api_key) = lookup("FALLBACK_API_KEY") {
            let base_url = lookup("FALLBACK_BASE_URL").ok_or_else(|| {
                AppError::Config("FALLBACK_BASE_URL must be set with FALLBACK_API_KEY".to_owned())
            })?;
            providers.push(OpenAiConfig {
                name: "fallback".to_owned(),
                base_url,
                api_key,
                models: split_models(
                    &lookup("FALLBACK_MODELS").unwrap_or_else(|| DEFAULT_MODELS.to_owned()),
                ),
                connect_timeout: CONNECT_TIMEOUT,
            });
        }
        if providers.is_empty() {
            return Err(AppError::Config(
                "at least one completion provider must be configured (OPENAI_API_KEY)".to_owned(),
            ));
        }

        Ok(Self {
            host,
            port,
            database_url: lookup("DATABASE_URL"),
            secret_key,
            admin_token: lookup("ADMIN_TOKEN"),
            providers,
            provider_preference: lookup("AI_PROVIDER"),
            review_preference: lookup("REVIEW_PROVIDER"),
        })
    }
}

fn split_models(raw: &str) -> Vec<String> {
    let models: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .collect();
    if models.is_empty() {
        vec![DEFAULT_MODELS.to_owned()]
    } else {
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_minimal_configuration() {
        let config = config_from(&[("SECRET_KEY", "s3cret"), ("OPENAI_API_KEY", "sk-test")])
            .unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "openai");
        assert_eq!(config.providers[0].base_url, DEFAULT_OPENAI_BASE_URL);
        assert!(config.database_url.is_none());
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_missing_secret_key_is_rejected() {
        let err = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_missing_providers_are_rejected() {
        let err = config_from(&[("SECRET_KEY", "s3cret")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_fallback_provider_requires_base_url() {
        let err = config_from(&[
            ("SECRET_KEY", "s3cret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("FALLBACK_API_KEY", "sk-fallback"),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_full_configuration_orders_providers() {
        let config = config_from(&[
            ("SECRET_KEY", "s3cret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODELS", "gpt-4o, gpt-4o-mini"),
            ("FALLBACK_API_KEY", "sk-fallback"),
            ("FALLBACK_BASE_URL", "https://fallback.example/v1"),
            ("AI_PROVIDER", "fallback"),
            ("REVIEW_PROVIDER", "fallback"),
            ("ADMIN_TOKEN", "hunter2"),
        ])
        .unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].models, vec!["gpt-4o", "gpt-4o-mini"]);
        assert_eq!(config.providers[1].name, "fallback");
        assert_eq!(config.provider_preference.as_deref(), Some("fallback"));
        assert_eq!(config.admin_token.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[
            ("SECRET_KEY", "s3cret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "not-a-port"),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
