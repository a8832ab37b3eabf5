// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup into a typed
//! [`AppConfig`]. Nothing below reads the environment after that, so tests
//! build configs directly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for file storage and the ledger | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; HTTPS when both set | Optional |
//! | `CERTIFICATE_KEY_SALT` | Salt for certificate key derivation | **Required** |
//! | `CERTIFICATE_KDF_ITERATIONS` | PBKDF2 iterations (minimum 100000) | `100000` |
//! | `PENDING_PAYMENT_TTL_HOURS` | Lifetime of a pending payment | `24` |
//! | `PENDING_SWEEP_MAX_AGE_HOURS` | Age after which pending records are reaped | `48` |
//! | `CERTIFICATE_RETENTION_DAYS` | Age after which certificate files are removed | Disabled |
//! | `MAINTENANCE_INTERVAL_SECS` | Maintenance cycle period | `300` |
//! | `CURRENCY` | ISO currency code sent to gateways | `USD` |
//! | `CLUB_ID` | Club id recorded on purchases | `1` |
//! | `CLUB_NAME` | Club name printed on certificates | `Club Social` |
//! | `AUTH_JWKS_URL` | JWKS endpoint for JWT verification | Required for production |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Required for production |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Gateway credentials (`STRIPE_*`, `PAYPAL_*`, `MERCADOPAGO_*`) are read by
//! each gateway client; a gateway whose credentials are absent is simply not
//! registered.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default data root.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Lower bound for PBKDF2 iterations.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// JWT verification settings.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// PEM file locations for HTTPS.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Typed application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsSettings>,
    pub certificate_key_salt: String,
    pub kdf_iterations: u32,
    pub pending_ttl: Duration,
    pub sweep_max_age: Duration,
    pub certificate_retention: Option<Duration>,
    pub maintenance_interval: StdDuration,
    pub currency: String,
    pub club_id: u64,
    pub club_name: String,
    pub auth: AuthSettings,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let certificate_key_salt =
            get("CERTIFICATE_KEY_SALT").ok_or(ConfigError::Missing("CERTIFICATE_KEY_SALT"))?;

        let kdf_iterations =
            parse_or("CERTIFICATE_KDF_ITERATIONS", get("CERTIFICATE_KDF_ITERATIONS"), MIN_KDF_ITERATIONS)?;
        if kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(ConfigError::Invalid {
                var: "CERTIFICATE_KDF_ITERATIONS",
                reason: format!("must be at least {MIN_KDF_ITERATIONS}"),
            });
        }

        let pending_ttl_hours: i64 =
            parse_or("PENDING_PAYMENT_TTL_HOURS", get("PENDING_PAYMENT_TTL_HOURS"), 24)?;
        let sweep_hours: i64 =
            parse_or("PENDING_SWEEP_MAX_AGE_HOURS", get("PENDING_SWEEP_MAX_AGE_HOURS"), 48)?;
        if pending_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "PENDING_PAYMENT_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }
        if sweep_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "PENDING_SWEEP_MAX_AGE_HOURS",
                reason: "must be positive".to_string(),
            });
        }

        let certificate_retention = match get("CERTIFICATE_RETENTION_DAYS") {
            Some(raw) => {
                let days: i64 = parse("CERTIFICATE_RETENTION_DAYS", &raw)?;
                if days <= 0 {
                    return Err(ConfigError::Invalid {
                        var: "CERTIFICATE_RETENTION_DAYS",
                        reason: "must be positive".to_string(),
                    });
                }
                Some(Duration::days(days))
            }
            None => None,
        };

        let interval_secs: u64 =
            parse_or("MAINTENANCE_INTERVAL_SECS", get("MAINTENANCE_INTERVAL_SECS"), 300)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "MAINTENANCE_INTERVAL_SECS",
                reason: "must be positive".to_string(),
            });
        }

        let tls = match (get("TLS_CERT_PATH"), get("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsSettings {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("TLS_KEY_PATH")),
            (None, Some(_)) => return Err(ConfigError::Missing("TLS_CERT_PATH")),
        };

        let currency = get("CURRENCY").unwrap_or_else(|| "USD".to_string()).to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                var: "CURRENCY",
                reason: "must be a 3-letter ISO code".to_string(),
            });
        }

        Ok(Self {
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 8080)?,
            tls,
            certificate_key_salt,
            kdf_iterations,
            pending_ttl: Duration::hours(pending_ttl_hours),
            sweep_max_age: Duration::hours(sweep_hours),
            certificate_retention,
            maintenance_interval: StdDuration::from_secs(interval_secs),
            currency,
            club_id: parse_or("CLUB_ID", get("CLUB_ID"), 1)?,
            club_name: get("CLUB_NAME").unwrap_or_else(|| "Club Social".to_string()),
            auth: AuthSettings {
                jwks_url: get("AUTH_JWKS_URL"),
                issuer: get("AUTH_ISSUER"),
                audience: get("AUTH_AUDIENCE"),
            },
        })
    }

    /// Config rooted at `data_dir` with the documented defaults and the given salt.
    pub fn with_defaults(data_dir: impl Into<PathBuf>, certificate_key_salt: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
            certificate_key_salt: certificate_key_salt.into(),
            kdf_iterations: MIN_KDF_ITERATIONS,
            pending_ttl: Duration::hours(24),
            sweep_max_age: Duration::hours(48),
            certificate_retention: None,
            maintenance_interval: StdDuration::from_secs(300),
            currency: "USD".to_string(),
            club_id: 1,
            club_name: "Club Social".to_string(),
            auth: AuthSettings::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => parse(var, &value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn salt_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("CERTIFICATE_KEY_SALT"));
        assert_eq!(
            load(&[("CERTIFICATE_KEY_SALT", "   ")]).unwrap_err(),
            ConfigError::Missing("CERTIFICATE_KEY_SALT")
        );
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("CERTIFICATE_KEY_SALT", "s3cret")]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.kdf_iterations, 100_000);
        assert_eq!(config.pending_ttl, Duration::hours(24));
        assert_eq!(config.sweep_max_age, Duration::hours(48));
        assert!(config.certificate_retention.is_none());
        assert_eq!(config.maintenance_interval, StdDuration::from_secs(300));
        assert_eq!(config.currency, "USD");
        assert_eq!(config.club_id, 1);
        assert!(config.tls.is_none());
        assert!(config.auth.jwks_url.is_none());
    }

    #[test]
    fn weak_kdf_is_rejected() {
        let err = load(&[
            ("CERTIFICATE_KEY_SALT", "s3cret"),
            ("CERTIFICATE_KDF_ITERATIONS", "1000"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CERTIFICATE_KDF_ITERATIONS", .. }));
    }

    #[test]
    fn retention_and_overrides_parse() {
        let config = load(&[
            ("CERTIFICATE_KEY_SALT", "s3cret"),
            ("CERTIFICATE_RETENTION_DAYS", "365"),
            ("PORT", "9000"),
            ("CURRENCY", "ars"),
            ("AUTH_JWKS_URL", "https://auth.example.com/.well-known/jwks.json"),
        ])
        .unwrap();
        assert_eq!(config.certificate_retention, Some(Duration::days(365)));
        assert_eq!(config.port, 9000);
        assert_eq!(config.currency, "ARS");
        assert!(config.auth.jwks_url.is_some());
    }

    #[test]
    fn half_configured_tls_is_rejected() {
        let err = load(&[("CERTIFICATE_KEY_SALT", "s3cret"), ("TLS_CERT_PATH", "/tls/cert.pem")])
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("TLS_KEY_PATH"));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = load(&[("CERTIFICATE_KEY_SALT", "s3cret"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }
}
