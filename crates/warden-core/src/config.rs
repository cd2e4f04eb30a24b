use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL (e.g. sqlite://warden.db, postgres://...)
    pub database_url: String,

    /// Server host (default: 127.0.0.1)
    pub server_host: String,

    /// Server port (default: 5000)
    pub server_port: u16,

    /// Environment: development, production, test
    pub environment: String,

    /// Minimum accepted password length (default: 8)
    pub min_password_length: u64,

    pub token: TokenConfig,

    pub rbac: RbacConfig,

    pub reset: ResetConfig,

    pub mail: MailConfig,
}

/// Signing material and caching for the token service.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// HS256 signing secret. Changing it invalidates every outstanding token.
    pub secret: String,

    /// How long a revocation lookup may be served from memory.
    /// Zero means every validation consults the store.
    pub revocation_cache_ttl: Duration,

    /// Upper bound on cached revocation lookups (default: 10000).
    pub revocation_cache_capacity: usize,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        TokenConfig {
            secret: secret.into(),
            revocation_cache_ttl: Duration::ZERO,
            revocation_cache_capacity: 10_000,
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("revocation_cache_ttl", &self.revocation_cache_ttl)
            .field("revocation_cache_capacity", &self.revocation_cache_capacity)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RbacConfig {
    /// Lifetime of a cached effective-permission set (default: 5 minutes)
    pub cache_ttl: Duration,
}

impl Default for RbacConfig {
    fn default() -> Self {
        RbacConfig {
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Links and sender used by the password reset mail.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// API base the reset link points at (default: http://localhost:5000/api/v1)
    pub base_server_url: String,

    /// Frontend the reset landing page redirects to (default: http://localhost:3000)
    pub frontend_url: String,

    /// Sender address (default: noreply@localhost)
    pub mail_from: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        ResetConfig {
            base_server_url: "http://localhost:5000/api/v1".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            mail_from: "noreply@localhost".to_string(),
        }
    }
}

/// Which transport outgoing mail takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// Record to/subject in the log and drop the message.
    #[default]
    Log,
    Smtp,
}

impl std::str::FromStr for MailTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(MailTransport::Log),
            "smtp" => Ok(MailTransport::Smtp),
            other => Err(format!("unknown MAIL_TRANSPORT '{}' (expected log or smtp)", other)),
        }
    }
}

/// SMTP relay settings, used when the transport is `smtp`.
#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// STARTTLS submission port (default: 587)
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub smtp: SmtpConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();

        let environment = env_or("ENVIRONMENT", "development");
        let secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "production" => {
                return Err("JWT_SECRET must be set in production".into());
            }
            _ => "warden-dev-secret-change-me".to_string(),
        };

        let transport: MailTransport = env_or("MAIL_TRANSPORT", "log").parse()?;
        if transport == MailTransport::Log && environment == "production" {
            return Err("MAIL_TRANSPORT=smtp is required in production".into());
        }
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Ok(Config {
            database_url: env_or("DATABASE_URL", "sqlite://warden.db?mode=rwc"),
            server_host: env_or("SERVER_HOST", "127.0.0.1"),
            server_port: env_parse("SERVER_PORT", 5000),
            environment,
            min_password_length: env_parse("MIN_PASSWORD_LENGTH", 8),
            token: TokenConfig {
                secret,
                revocation_cache_ttl: Duration::from_secs(env_parse(
                    "REVOCATION_CACHE_TTL_SECS",
                    0,
                )),
                revocation_cache_capacity: env_parse("REVOCATION_CACHE_CAPACITY", 10_000),
            },
            rbac: RbacConfig {
                cache_ttl: Duration::from_secs(env_parse("RBAC_CACHE_TTL_SECS", 300)),
            },
            reset: ResetConfig {
                base_server_url: env_or("BASE_SERVER_URL", "http://localhost:5000/api/v1"),
                frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
                mail_from: env_or("MAIL_FROM", "noreply@localhost"),
            },
            mail: MailConfig {
                transport,
                smtp: SmtpConfig {
                    host: env_or("SMTP_HOST", "localhost"),
                    port: env_parse("SMTP_PORT", 587),
                    username: non_empty("SMTP_USERNAME"),
                    password: non_empty("SMTP_PASSWORD"),
                },
            },
        })
    }

    /// Isolated configuration for tests: in-memory SQLite, fixed secret,
    /// no caching.
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            min_password_length: 8,
            token: TokenConfig::new("warden-test-secret"),
            rbac: RbacConfig {
                cache_ttl: Duration::ZERO,
            },
            reset: ResetConfig::default(),
            mail: MailConfig::default(),
        }
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
