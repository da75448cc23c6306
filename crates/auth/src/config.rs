//! Auth configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AUTH_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `AUTH_BASE_URL` - Canonical public URL used to build verification links
//! - `AUTH_SECRET` - Session signing secret (min 32 chars, high entropy).
//!   In development a missing value falls back to an insecure default with a
//!   loud warning; in production it is a startup failure.
//!
//! ## Optional
//! - `APP_ENV` - `development` (default) or `production`
//! - `SMTP_HOST` - SMTP server hostname (enables outbound email)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SMTP_USERNAME` - SMTP authentication username
//! - `SMTP_PASSWORD` - SMTP authentication password
//! - `SMTP_FROM` - Email sender address

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Fallback signing secret for local development only.
const DEV_FALLBACK_SECRET: &str = "papillon-dev-only-secret-do-not-deploy-0000";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
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

/// Deployment environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development: insecure fallbacks are tolerated, loudly.
    #[default]
    Development,
    /// Production: configuration gaps are fatal at startup.
    Production,
}

impl Environment {
    fn from_env() -> Result<Self, ConfigError> {
        match get_env_or_default("APP_ENV", "development").as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvVar(
                "APP_ENV".to_string(),
                format!("unknown environment '{other}'"),
            )),
        }
    }
}

/// Auth subsystem configuration.
///
/// Constructed once at process start and passed by reference into the
/// services; core logic never reads ambient environment state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Canonical public base URL, used to build verification links
    pub base_url: Url,
    /// Session signing secret
    pub secret: SecretString,
    /// Deployment environment
    pub environment: Environment,
    /// Email configuration (absent disables outbound delivery)
    pub email: Option<EmailConfig>,
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    /// In development a missing `AUTH_SECRET` is downgraded to a warning
    /// plus an insecure fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = Environment::from_env()?;
        let database_url = get_database_url("AUTH_DATABASE_URL")?;
        let base_url = get_required_env("AUTH_BASE_URL")?
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("AUTH_BASE_URL".to_string(), e.to_string()))?;
        let secret = load_signing_secret(environment, get_optional_env("AUTH_SECRET"))?;
        let email = EmailConfig::from_env()?;

        Ok(Self {
            database_url,
            base_url,
            secret,
            environment,
            email,
        })
    }

    /// Build the redemption URL for a link-credential secret.
    ///
    /// The secret travels as a query parameter so the path component of the
    /// base URL stays configurable per deployment.
    #[must_use]
    pub fn verification_url(&self, secret: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("token", secret);
        url
    }

    /// Returns a reference to the email configuration (if configured).
    #[must_use]
    pub const fn email(&self) -> Option<&EmailConfig> {
        self.email.as_ref()
    }
}

impl EmailConfig {
    /// Load SMTP configuration from environment.
    ///
    /// Returns `None` when `SMTP_HOST` is unset (delivery disabled); the
    /// remaining variables are then required together.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_validated_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

/// Validate the signing secret per environment policy.
///
/// `value` is the raw `AUTH_SECRET` environment value, if any; taking it as
/// a parameter keeps both policy branches testable without touching process
/// environment state.
fn load_signing_secret(
    environment: Environment,
    value: Option<String>,
) -> Result<SecretString, ConfigError> {
    match value {
        Some(value) => {
            validate_secret_strength(&value, "AUTH_SECRET")?;
            let secret = SecretString::from(value);
            validate_secret_length(&secret, "AUTH_SECRET")?;
            Ok(secret)
        }
        None if environment == Environment::Production => {
            Err(ConfigError::MissingEnvVar("AUTH_SECRET".to_string()))
        }
        None => {
            tracing::warn!(
                "AUTH_SECRET is not set; using an INSECURE development fallback. \
                 Sessions signed with it must never reach production."
            );
            Ok(SecretString::from(DEV_FALLBACK_SECRET))
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like signing keys have high entropy)
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

    fn test_config() -> AuthConfig {
        AuthConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            base_url: "https://papillon.example/verify".parse().unwrap(),
            secret: SecretString::from("x".repeat(32)),
            environment: Environment::Development,
            email: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-signing-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_secret_length_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_secret_length(&secret, "TEST_SECRET").is_err());
    }

    #[test]
    fn test_missing_secret_is_fatal_in_production() {
        let err = load_signing_secret(Environment::Production, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "AUTH_SECRET"));
    }

    #[test]
    fn test_missing_secret_falls_back_in_development() {
        let secret = load_signing_secret(Environment::Development, None).unwrap();
        assert_eq!(secret.expose_secret(), DEV_FALLBACK_SECRET);
    }

    #[test]
    fn test_provided_secret_is_still_validated() {
        // A present but weak value fails in every environment.
        let err = load_signing_secret(
            Environment::Development,
            Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));

        let secret = load_signing_secret(
            Environment::Production,
            Some("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6q".to_owned()),
        )
        .unwrap();
        assert_eq!(secret.expose_secret().len(), 32);
    }

    #[test]
    fn test_verification_url_appends_token() {
        let config = test_config();
        let url = config.verification_url("abc_-123");
        assert_eq!(
            url.as_str(),
            "https://papillon.example/verify?token=abc_-123"
        );
    }

    #[test]
    fn test_verification_url_escapes_token() {
        let config = test_config();
        let url = config.verification_url("a b&c");
        assert_eq!(url.query(), Some("token=a+b%26c"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "mailer@papillon.example".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "noreply@papillon.example".to_string(),
        };

        let debug_output = format!("{config:?}");

        // Public fields should be visible
        assert!(debug_output.contains("smtp.example.com"));
        assert!(debug_output.contains("587"));

        // Secret fields should be redacted
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }
}
