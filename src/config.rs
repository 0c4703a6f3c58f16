use anyhow::{Context, Result};
use std::env;

/// Process configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        Ok(Self {
            database_url,
            port: parse_or("PORT", 8000),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10),
            token_ttl_hours: parse_or("TOKEN_TTL_HOURS", 10),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_fall_back_to_default() {
        env::set_var("LEARNHUB_TEST_PORT", "not-a-port");
        assert_eq!(parse_or::<u16>("LEARNHUB_TEST_PORT", 8000), 8000);
        env::set_var("LEARNHUB_TEST_PORT", "9001");
        assert_eq!(parse_or::<u16>("LEARNHUB_TEST_PORT", 8000), 9001);
        assert_eq!(parse_or::<i64>("LEARNHUB_TEST_UNSET", 10), 10);
    }
}
