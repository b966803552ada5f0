// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,
    /// Days a delivered order waits before it is completed on the client's behalf. 0 disables.
    pub auto_complete_after_days: i64,
}

const DEFAULT_ORIGINS: &str = "http://localhost:5173,http://localhost:3000,http://localhost:8000";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

impl Config {
    pub fn init() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET_KEY")?;
        let jwt_maxage = parse_var("JWT_MAXAGE", Some(required("JWT_MAXAGE")?), 0i64)?;
        if jwt_maxage <= 0 {
            return Err(ConfigError::Invalid("JWT_MAXAGE", jwt_maxage.to_string()));
        }

        let port = parse_var("PORT", lookup("PORT"), 8000u16)?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), 20u32)?;
        let auto_complete_after_days =
            parse_var("AUTO_COMPLETE_AFTER_DAYS", lookup("AUTO_COMPLETE_AFTER_DAYS"), 14i64)?;
        if auto_complete_after_days < 0 {
            return Err(ConfigError::Invalid(
                "AUTO_COMPLETE_AFTER_DAYS",
                auto_complete_after_days.to_string(),
            ));
        }

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_maxage,
            port,
            allowed_origins,
            db_max_connections,
            auto_complete_after_days,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/hirely"),
        ("JWT_SECRET_KEY", "secret"),
        ("JWT_MAXAGE", "60"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = Config::from_lookup(lookup_from(&BASE)).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.auto_complete_after_days, 14);
        assert_eq!(config.allowed_origins.len(), 3);
    }

    #[test]
    fn missing_required_var_is_reported() {
        let err = Config::from_lookup(lookup_from(&BASE[..2])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_MAXAGE"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Invalid("PORT", "eighty".to_string()));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ALLOWED_ORIGINS", "https://hirely.app, http://localhost:5173,"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://hirely.app".to_string(), "http://localhost:5173".to_string()]
        );
    }

    #[test]
    fn non_positive_token_lifetime_is_rejected() {
        let pairs = [BASE[0], BASE[1], ("JWT_MAXAGE", "0")];
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }
}
