//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (fallback: `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (used in email links)
//! - `STORAGE_URL` - Object storage project URL
//! - `STORAGE_SERVICE_KEY` - Object storage service key (high entropy)
//! - `STORAGE_BUCKET` - Bucket holding the printable PDFs
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `ORDER_NUMBER_PREFIX` - Order number prefix (default: ORD)
//! - `CHECKOUT_PRICE_POLICY` - `reject` or `reprice` on client price mismatch (default: reject)
//! - `DOWNLOAD_URL_TTL_SECS` - Signed URL lifetime (default: 60)
//! - `RESET_TOKEN_TTL_MINUTES` - Password reset token lifetime (default: 60)
//! - `RATE_LIMIT_ENABLED` - Per-IP rate limiting on write endpoints (default: true)
//! - `CATALOG_CACHE_TTL_SECS` - Product cache lifetime (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//!
//! ## Email (all of `SMTP_HOST`, `EMAIL_FROM` and `CONTACT_INBOX` enable it)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`
//! - `EMAIL_FROM` - Sender mailbox
//! - `CONTACT_INBOX` - Recipient of contact form messages

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use printshelf_core::OrderNumber;
use secrecy::SecretString;
use thiserror::Error;

use crate::services::orders::PricePolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
    /// Signed download URL lifetime
    pub download_url_ttl: Duration,
    /// Password reset token lifetime
    pub reset_token_ttl: Duration,
    /// Whether per-IP rate limiting is applied
    pub rate_limit_enabled: bool,
    /// Product cache lifetime
    pub catalog_cache_ttl: Duration,
    /// SMTP configuration; `None` disables outgoing email
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Object storage configuration.
///
/// Implements `Debug` manually to redact the service key.
#[derive(Clone)]
pub struct StorageConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,
    /// Service role key
    pub service_key: SecretString,
    /// Bucket holding product files
    pub bucket: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Checkout configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Prefix of generated order numbers
    pub order_prefix: String,
    /// What to do when a client-submitted price disagrees with the catalog
    pub price_policy: PricePolicy,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    /// Sender mailbox, e.g. `Printshelf <hello@printshelf.shop>`
    pub from: String,
    /// Where contact form messages are delivered
    pub contact_inbox: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field(
                "smtp_password",
                &self.smtp_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("from", &self.from)
            .field("contact_inbox", &self.contact_inbox)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_url_env("STOREFRONT_BASE_URL")?;

        let storage = StorageConfig::from_env()?;
        let checkout = CheckoutConfig::from_env()?;

        let download_url_ttl =
            Duration::from_secs(parse_env_or_default::<u64>("DOWNLOAD_URL_TTL_SECS", "60")?);
        let reset_token_ttl = Duration::from_secs(
            parse_env_or_default::<u64>("RESET_TOKEN_TTL_MINUTES", "60")? * 60,
        );
        let rate_limit_enabled = parse_env_or_default::<bool>("RATE_LIMIT_ENABLED", "true")?;
        let catalog_cache_ttl =
            Duration::from_secs(parse_env_or_default::<u64>("CATALOG_CACHE_TTL_SECS", "30")?);

        let email = EmailConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            storage,
            checkout,
            download_url_ttl,
            reset_token_ttl,
            rate_limit_enabled,
            catalog_cache_ttl,
            email,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: get_url_env("STORAGE_URL")?,
            service_key: get_validated_secret("STORAGE_SERVICE_KEY")?,
            bucket: get_required_env("STORAGE_BUCKET")?,
        })
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            order_prefix: validate_order_prefix(&get_env_or_default("ORDER_NUMBER_PREFIX", "ORD"))?,
            price_policy: parse_env_or_default::<PricePolicy>("CHECKOUT_PRICE_POLICY", "reject")?,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(smtp_host), Some(from), Some(contact_inbox)) = (
            get_optional_env("SMTP_HOST"),
            get_optional_env("EMAIL_FROM"),
            get_optional_env("CONTACT_INBOX"),
        ) else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default::<u16>("SMTP_PORT", "587")?,
            smtp_username: get_optional_env("SMTP_USERNAME"),
            smtp_password: get_optional_env("SMTP_PASSWORD").map(SecretString::from),
            from,
            contact_inbox,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required absolute http(s) URL, without its trailing slash.
fn get_url_env(key: &str) -> Result<String, ConfigError> {
    let raw = get_required_env(key)?;
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an http(s) URL".to_string(),
        ));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn validate_order_prefix(prefix: &str) -> Result<String, ConfigError> {
    let prefix = prefix.trim();
    if !OrderNumber::is_valid_prefix(prefix) {
        return Err(ConfigError::InvalidEnvVar(
            "ORDER_NUMBER_PREFIX".to_string(),
            format!(
                "must be 1-{} ASCII letters or digits, got {prefix:?}",
                OrderNumber::MAX_PREFIX_LEN
            ),
        ));
    }
    Ok(prefix.to_uppercase())
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-service-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_storage_config_debug_redacts_key() {
        let config = StorageConfig {
            url: "https://abc.supabase.co".to_string(),
            service_key: SecretString::from("very_private_service_key"),
            bucket: "printables".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("printables"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("very_private_service_key"));
    }

    #[test]
    fn test_validate_order_prefix() {
        assert_eq!(validate_order_prefix(" ps ").unwrap(), "PS");
        assert_eq!(validate_order_prefix("Shop2").unwrap(), "SHOP2");

        for bad in ["", "PS SHOP", "PS-1", "CAFÉ", "ABCDEFGHIJKLMNOPQ"] {
            assert!(
                matches!(
                    validate_order_prefix(bad),
                    Err(ConfigError::InvalidEnvVar(ref key, _)) if key == "ORDER_NUMBER_PREFIX"
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_email_config_debug_redacts_password() {
        let config = EmailConfig {
            smtp_host: "smtp.example.net".to_string(),
            smtp_port: 587,
            smtp_username: Some("mailer".to_string()),
            smtp_password: Some(SecretString::from("hunter2hunter2")),
            from: "shop@printshelf.test".to_string(),
            contact_inbox: "owner@printshelf.test".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("mailer"));
        assert!(!debug_output.contains("hunter2hunter2"));
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            storage: StorageConfig {
                url: "http://localhost:54321".to_string(),
                service_key: SecretString::from("key"),
                bucket: "printables".to_string(),
            },
            checkout: CheckoutConfig {
                order_prefix: "ORD".to_string(),
                price_policy: PricePolicy::Reject,
            },
            download_url_ttl: Duration::from_secs(60),
            reset_token_ttl: Duration::from_secs(3600),
            rate_limit_enabled: true,
            catalog_cache_ttl: Duration::from_secs(30),
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}
