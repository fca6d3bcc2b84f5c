use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

/// Ten years; longer lifetimes are almost certainly a misconfiguration.
pub const MAX_EXPIRATION_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub expiration_hours: i64,
}

impl JwtConfig {
    /// Only the shared-secret (HMAC) family can be driven by a single secret string.
    pub fn new(secret: impl Into<String>, algorithm: Algorithm, expiration_hours: i64) -> anyhow::Result<Self> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            anyhow::bail!("unsupported JWT algorithm {:?}: expected HS256, HS384 or HS512", algorithm);
        }
        if !(1..=MAX_EXPIRATION_HOURS).contains(&expiration_hours) {
            anyhow::bail!(
                "JWT_EXPIRATION_HOURS must be between 1 and {}, got {}",
                MAX_EXPIRATION_HOURS,
                expiration_hours
            );
        }
        Ok(Self {
            secret: secret.into(),
            algorithm,
            expiration_hours,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let algorithm = std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into());
        let algorithm = Algorithm::from_str(&algorithm)
            .with_context(|| format!("invalid JWT_ALGORITHM {:?}", algorithm))?;
        let jwt = JwtConfig::new(
            std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            algorithm,
            std::env::var("JWT_EXPIRATION_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24),
        )?;

        Ok(Self {
            database_url,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            jwt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_config_accepts_hmac_algorithms() {
        for alg in [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512] {
            let cfg = JwtConfig::new("secret", alg, 24).expect("hmac is supported");
            assert_eq!(cfg.algorithm, alg);
        }
    }

    #[test]
    fn jwt_config_rejects_asymmetric_algorithms() {
        let err = JwtConfig::new("secret", Algorithm::RS256, 24).unwrap_err();
        assert!(err.to_string().contains("unsupported JWT algorithm"));
    }

    #[test]
    fn jwt_config_rejects_non_positive_expiry() {
        assert!(JwtConfig::new("secret", Algorithm::HS256, 0).is_err());
    }

    #[test]
    fn jwt_config_caps_expiry() {
        assert!(JwtConfig::new("secret", Algorithm::HS256, MAX_EXPIRATION_HOURS).is_ok());
        let err = JwtConfig::new("secret", Algorithm::HS256, 100_000_000).unwrap_err();
        assert!(err.to_string().contains("JWT_EXPIRATION_HOURS must be between"));
    }
}
