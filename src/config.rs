//! Service configuration from the environment.

use std::env;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_COOKIE_DAYS: i64 = 30;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const MAX_COOKIE_DAYS: i64 = 3650;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL URL. Without one the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Lifetime of the selected-location cookie, at most [`MAX_COOKIE_DAYS`].
    pub cookie_days: i64,
    /// Shared secret the host platform sends with lifecycle hook calls.
    pub hook_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            port: DEFAULT_PORT,
            nats_url: None,
            cookie_days: DEFAULT_COOKIE_DAYS,
            hook_secret: None,
        }
    }
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset and
    /// unparsable numbers fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| get(key).and_then(|v| match v.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(key, value = %v, "Ignoring invalid number in environment");
                None
            }
        });

        let defaults = Self::default();
        Self {
            database_url: get("DATABASE_URL"),
            max_connections: number("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            port: number("PORT").and_then(|n| u16::try_from(n).ok()).unwrap_or(defaults.port),
            nats_url: get("NATS_URL"),
            cookie_days: number("WCMLS_COOKIE_DAYS")
                .filter(|n| *n > 0)
                .map(|n| n.min(MAX_COOKIE_DAYS))
                .unwrap_or(defaults.cookie_days),
            hook_secret: get("WCMLS_HOOK_SECRET"),
        }
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8083");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("PORT", "9000"),
            ("NATS_URL", "nats://localhost:4222"),
            ("WCMLS_COOKIE_DAYS", "7"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("WCMLS_HOOK_SECRET", "s3cret"),
        ]);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/stock"));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(cfg.cookie_days, 7);
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.hook_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_cookie_days_capped() {
        assert_eq!(config(&[("WCMLS_COOKIE_DAYS", "99999999999")]).cookie_days, MAX_COOKIE_DAYS);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[("DATABASE_URL", "  "), ("PORT", "http"), ("WCMLS_COOKIE_DAYS", "-3"), ("DATABASE_MAX_CONNECTIONS", "0")]);
        assert_eq!(cfg, Config::default());
    }
}
