/// Configuration management for the API server
///
/// Loaded from environment variables (and a `.env` file in development).
///
/// # Environment Variables
///
/// | Variable | Default | |
/// |---|---|---|
/// | `API_HOST` | `0.0.0.0` | bind host |
/// | `API_PORT` | `8080` | bind port |
/// | `CORS_ORIGINS` | `*` | comma-separated allowed origins |
/// | `APP_ENV` | `development` | `production` enables HSTS and strict CORS |
/// | `PUBLIC_URL` | `http://localhost:3000` | base for links in emails |
/// | `DATABASE_URL` | required | PostgreSQL connection string |
/// | `DATABASE_MAX_CONNECTIONS` | `10` | pool size |
/// | `JWT_SECRET` | required | HS256 key, at least 32 characters |
/// | `JWT_ACCESS_TTL_MINUTES` | `60` | access token lifetime |
/// | `JWT_REFRESH_TTL_DAYS` | `7` | refresh token lifetime |
/// | `MAIL_API_URL`, `MAIL_API_KEY` | unset | HTTP mail API; unset logs mail instead |
/// | `MAIL_FROM` | `TenantDesk <no-reply@tenantdesk.local>` | sender |
/// | `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET` | unset | image uploads; all three or none |
///
/// # Example
///
/// ```no_run
/// use tenantdesk_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};
use tenantdesk_shared::auth::session::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub mail: MailConfig,

    /// None disables image uploads (503)
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS, no permissive CORS fallback)
    pub production: bool,

    /// Front-end base URL used to build links in emails
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint accepting `{from, to, subject, text}`; None logs mail instead
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .with_context(|| format!("{} has an invalid value: {:?}", name, raw))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing, a value does not parse,
    /// the JWT secret is shorter than 32 characters, or the Cloudinary
    /// variables are only partly set.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let cloudinary = match (
            optional_var("CLOUDINARY_CLOUD_NAME"),
            optional_var("CLOUDINARY_API_KEY"),
            optional_var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set together"
            ),
        };

        let config = Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", "8080")?,
                cors_origins,
                production,
                public_url: env::var("PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_ttl_minutes: parse_var("JWT_ACCESS_TTL_MINUTES", "60")?,
                refresh_ttl_days: parse_var("JWT_REFRESH_TTL_DAYS", "7")?,
            },
            mail: MailConfig {
                api_url: optional_var("MAIL_API_URL"),
                api_key: optional_var("MAIL_API_KEY"),
                from: env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "TenantDesk <no-reply@tenantdesk.local>".to_string()),
            },
            cloudinary,
        };

        if config.jwt.access_ttl_minutes <= 0 || config.jwt.refresh_ttl_days <= 0 {
            anyhow::bail!("JWT lifetimes must be positive");
        }

        if config.api.production && config.api.cors_origins.iter().any(|o| o == "*") {
            anyhow::bail!("CORS_ORIGINS must list explicit origins when APP_ENV=production");
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Signing key and token lifetimes for the session module
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            jwt_secret: self.jwt.secret.clone(),
            access_ttl: Duration::minutes(self.jwt.access_ttl_minutes),
            refresh_ttl: Duration::days(self.jwt.refresh_ttl_days),
        }
    }

    /// Front-end link carrying a token, e.g. `/verify-email?token=...`
    pub fn public_link(&self, path: &str, token: &str) -> String {
        format!("{}{}?token={}", self.api.public_url, path, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                production: false,
                public_url: "https://app.tenantdesk.example".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                access_ttl_minutes: 15,
                refresh_ttl_days: 7,
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "TenantDesk <no-reply@tenantdesk.local>".to_string(),
            },
            cloudinary: None,
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(sample().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_session_lifetimes_follow_config() {
        let session = sample().session();
        assert_eq!(session.access_ttl, Duration::minutes(15));
        assert_eq!(session.refresh_ttl, Duration::days(7));
    }

    #[test]
    fn test_public_link() {
        assert_eq!(
            sample().public_link("/verify-email", "tdv_abc"),
            "https://app.tenantdesk.example/verify-email?token=tdv_abc"
        );
    }

    #[test]
    fn test_secrets_not_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json["jwt"].get("secret").is_none());
        assert!(json["mail"].get("api_key").is_none());
    }
}
