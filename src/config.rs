//! Shared provider configuration and builder.

use std::marker::PhantomData;
use std::time::Duration;

use rquest::Client;

use crate::error::Result;

/// Environment variable consulted by [`debug_from_env`].
pub const DEBUG_ENV: &str = "CAPTCHA_AIO_DEBUG";

/// Read the debug toggle from the process environment.
///
/// Accepts `1`, `true`, `yes` or `on`, case-insensitively. The result is
/// meant to be passed into [`ProviderBuilder::debug`], not stored globally.
pub fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Settings every provider adapter carries.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Client software identifier credited by the vendor
    pub soft_id: Option<String>,
    /// Overall HTTP timeout per request
    pub timeout: Option<Duration>,
    /// Log raw vendor responses
    pub debug: bool,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            soft_id: None,
            timeout: None,
            debug: false,
        }
    }

    pub(crate) fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

/// Constructs a provider from shared configuration.
pub trait FromConfig: Sized {
    fn from_config(config: ProviderConfig, client: Client) -> Self;
}

/// Builder for creating a provider adapter.
///
/// # Example
/// ```ignore
/// use captcha_aio::TwoCaptcha;
/// use std::time::Duration;
///
/// let provider = TwoCaptcha::builder("your_api_key")
///     .soft_id("4580")
///     .timeout(Duration::from_secs(30))
///     .debug(captcha_aio::config::debug_from_env())
///     .build()?;
/// ```
pub struct ProviderBuilder<P> {
    config: ProviderConfig,
    _provider: PhantomData<fn() -> P>,
}

impl<P: FromConfig> ProviderBuilder<P> {
    /// Create a new builder with the required API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            config: ProviderConfig::new(api_key),
            _provider: PhantomData,
        }
    }

    /// Set the client software identifier.
    pub fn soft_id(mut self, soft_id: impl Into<String>) -> Self {
        self.config.soft_id = Some(soft_id.into());
        self
    }

    /// Set the HTTP timeout applied to every vendor request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Log raw vendor responses at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the provider.
    pub fn build(self) -> Result<P> {
        let client = self.config.http_client()?;
        Ok(P::from_config(self.config, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" on "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("captchaaiodebug=1"));
    }

    #[test]
    fn test_config_defaults() {
        let config = ProviderConfig::new("key");
        assert_eq!(config.api_key, "key");
        assert!(config.soft_id.is_none());
        assert!(config.timeout.is_none());
        assert!(!config.debug);
    }
}
