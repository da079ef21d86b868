//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `BOOKSTORE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; without either the server runs on the in-memory store)
//! - `BOOKSTORE_HOST` - Bind address (default: 127.0.0.1)
//! - `BOOKSTORE_PORT` - Listen port (default: 3000)
//! - `BOOKSTORE_BASE_URL` - Public URL, used for provider return URLs
//!   (default: `http://{host}:{port}`)
//! - `PAYMENT_CURRENCY` - ISO currency for every charge (default: USD)
//! - `PAYMENT_TIMEOUT_SECS` - Timeout for each provider call (default: 10)
//! - `STRIPE_SECRET_KEY` - Enables Stripe
//! - `PAYSTACK_SECRET_KEY` - Enables Paystack
//! - `FLUTTERWAVE_SECRET_KEY` - Enables Flutterwave
//! - `CATALOG_CACHE_TTL_SECS` - Catalog cache entry lifetime (default: 3600)
//! - `CATALOG_CACHE_CAPACITY` - Catalog cache entry limit (default: 1000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use bookstore_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: Url,
    /// Payment provider configuration
    pub payments: PaymentConfig,
    /// Catalog cache configuration
    pub cache: CacheConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Payment provider configuration.
///
/// A provider is enabled exactly when its secret key is set. Implements
/// `Debug` manually to redact the keys.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Currency every order is charged in
    pub currency: CurrencyCode,
    /// Upper bound on a single provider call
    pub timeout: Duration,
    pub stripe_secret_key: Option<SecretString>,
    pub paystack_secret_key: Option<SecretString>,
    pub flutterwave_secret_key: Option<SecretString>,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<SecretString>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("PaymentConfig")
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .field("stripe_secret_key", &redact(&self.stripe_secret_key))
            .field("paystack_secret_key", &redact(&self.paystack_secret_key))
            .field("flutterwave_secret_key", &redact(&self.flutterwave_secret_key))
            .finish()
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            timeout: Duration::from_secs(10),
            stripe_secret_key: None,
            paystack_secret_key: None,
            flutterwave_secret_key: None,
        }
    }
}

/// Catalog cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long a cached listing or book stays valid
    pub ttl: Duration,
    /// Maximum number of cached entries
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            capacity: 1000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if variables are invalid, or if a provider key
    /// fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("BOOKSTORE_DATABASE_URL");
        let host = get_env_or_default("BOOKSTORE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BOOKSTORE_HOST".to_string(), e.to_string()))?;
        let port: u16 = get_parsed_or_default("BOOKSTORE_PORT", 3000)?;
        let base_url = get_env_or_default("BOOKSTORE_BASE_URL", &format!("http://{host}:{port}"));
        let base_url = Url::parse(&base_url)
            .map(with_trailing_slash)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("BOOKSTORE_BASE_URL".to_string(), e.to_string())
            })?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            payments: PaymentConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("PAYMENT_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("PAYMENT_CURRENCY".to_string(), e))?;
        let timeout_secs: u64 = get_parsed_or_default("PAYMENT_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PAYMENT_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            currency,
            timeout: Duration::from_secs(timeout_secs),
            stripe_secret_key: get_optional_validated_secret("STRIPE_SECRET_KEY")?,
            paystack_secret_key: get_optional_validated_secret("PAYSTACK_SECRET_KEY")?,
            flutterwave_secret_key: get_optional_validated_secret("FLUTTERWAVE_SECRET_KEY")?,
        })
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ttl: Duration::from_secs(get_parsed_or_default("CATALOG_CACHE_TTL_SECS", 3600)?),
            capacity: get_parsed_or_default("CATALOG_CACHE_CAPACITY", 1000)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
/// Make the path end in `/` so relative joins land under it.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn get_database_url(primary_key: &str) -> Option<SecretString> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment, if it is set.
fn get_optional_validated_secret(key: &str) -> Result<Option<SecretString>, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(None);
    };
    validate_secret_strength(&value, key)?;
    Ok(Some(SecretString::from(value)))
}
