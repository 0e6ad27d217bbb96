use crate::db::StoreOptions;
use crate::domain::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub db_busy_timeout_ms: u64,
    pub db_max_connections: u32,
    pub partner_api_url: String,
    pub partner_timeout_ms: u64,
    pub sync_cooldown_secs: u64,
    pub min_lock_ninety: Decimal,
    pub min_lock_three_sixty: Decimal,
    /// Upper bound for any single credit: webhooks, purchases and manual credits.
    pub max_credit_amount: Decimal,
    pub webhook_secret: Option<String>,
    /// 0 disables the background release sweep.
    pub lock_sweep_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", "8080", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let db_busy_timeout_ms =
            parse_or(&env_map, "DB_BUSY_TIMEOUT_MS", "5000", "must be a valid u64")?;
        let db_max_connections: u32 =
            parse_or(&env_map, "DB_MAX_CONNECTIONS", "5", "must be a valid u32")?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let partner_api_url = env_map
            .get("PARTNER_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| ConfigError::MissingEnv("PARTNER_API_URL".to_string()))?;

        let partner_timeout_ms: u64 =
            parse_or(&env_map, "PARTNER_TIMEOUT_MS", "10000", "must be a valid u64")?;
        if partner_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "PARTNER_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let sync_cooldown_secs =
            parse_or(&env_map, "SYNC_COOLDOWN_SECS", "60", "must be a valid u64")?;
        let min_lock_ninety = parse_amount(&env_map, "MIN_LOCK_NINETY", "100")?;
        let min_lock_three_sixty = parse_amount(&env_map, "MIN_LOCK_THREE_SIXTY", "100")?;
        let max_credit_amount = parse_amount(&env_map, "MAX_CREDIT_AMOUNT", "1000000")?;
        if !max_credit_amount.is_positive() {
            return Err(ConfigError::InvalidValue(
                "MAX_CREDIT_AMOUNT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let webhook_secret = env_map
            .get("WEBHOOK_SECRET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let lock_sweep_interval_secs = parse_or(
            &env_map,
            "LOCK_SWEEP_INTERVAL_SECS",
            "3600",
            "must be a valid u64",
        )?;

        Ok(Config {
            port,
            database_path,
            db_busy_timeout_ms,
            db_max_connections,
            partner_api_url,
            partner_timeout_ms,
            sync_cooldown_secs,
            min_lock_ninety,
            min_lock_three_sixty,
            max_credit_amount,
            webhook_secret,
            lock_sweep_interval_secs,
        })
    }

    pub fn partner_timeout(&self) -> Duration {
        Duration::from_millis(self.partner_timeout_ms)
    }

    pub fn sync_cooldown(&self) -> Duration {
        Duration::from_secs(self.sync_cooldown_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.db_busy_timeout_ms),
            max_connections: self.db_max_connections,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expectation: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string()))
}

fn parse_amount(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let amount: Decimal = parse_or(env_map, key, default, "must be a decimal amount")?;
    if amount.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "PARTNER_API_URL".to_string(),
            "https://partner.example/".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.partner_api_url, "https://partner.example");
        assert_eq!(config.sync_cooldown_secs, 60);
        assert_eq!(config.partner_timeout(), Duration::from_secs(10));
        assert_eq!(config.min_lock_ninety, Decimal::from(100u32));
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.lock_sweep_interval_secs, 3600);
        assert_eq!(config.max_credit_amount, Decimal::from(1_000_000u32));
        assert_eq!(config.store_options(), StoreOptions::default());
    }

    #[test]
    fn test_store_options_from_env() {
        let mut env_map = setup_required_env();
        env_map.insert("DB_BUSY_TIMEOUT_MS".to_string(), "250".to_string());
        env_map.insert("DB_MAX_CONNECTIONS".to_string(), "9".to_string());
        let options = Config::from_env_map(env_map).unwrap().store_options();
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
        assert_eq!(options.max_connections, 9);
    }

    #[test]
    fn test_zero_max_credit_amount_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("MAX_CREDIT_AMOUNT".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAX_CREDIT_AMOUNT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_partner_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("PARTNER_API_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "PARTNER_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("PARTNER_TIMEOUT_MS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PARTNER_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_negative_minimum_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("MIN_LOCK_NINETY".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MIN_LOCK_NINETY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_blank_webhook_secret_is_unset() {
        let mut env_map = setup_required_env();
        env_map.insert("WEBHOOK_SECRET".to_string(), "   ".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert!(config.webhook_secret.is_none());
    }
}
