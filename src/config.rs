//! Environment-driven application configuration

use std::env;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// PRE_OPEN phase duration before the book locks for the auction.
    pub preopen: Duration,
    /// LOCKED phase duration before the auction executes.
    pub locked: Duration,
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub rotation: String,
    pub use_json: bool,
}

impl AppConfig {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "postgresql://{}:{}@{}:{}/{}",
                env_or("DB_USER", "bursa"),
                env_or("DB_PASSWORD", "bursa"),
                env_or("DB_HOST", "localhost"),
                env_or("DB_PORT", "5432"),
                env_or("DB_NAME", "bursa"),
            )
        });

        Self {
            database_url,
            port: env_parse("PORT", 8080),
            jwt_secret: env_or("JWT_SECRET", "dev-secret-change-me"),
            preopen: Duration::from_secs(env_parse("PREOPEN_SECS", 15)),
            locked: Duration::from_secs(env_parse("LOCKED_SECS", 5)),
            log_level: env_or("LOG_LEVEL", "info"),
            log_dir: env_or("LOG_DIR", "./logs"),
            log_file: env_or("LOG_FILE", "bursa.log"),
            rotation: env_or("LOG_ROTATION", "daily"),
            use_json: env_parse("LOG_JSON", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        // Unset/garbage values fall back to the default.
        assert_eq!(env_parse("BURSA_TEST_MISSING_KEY", 42u64), 42);
    }

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("BURSA_TEST_MISSING_KEY_2", "x"), "x");
    }
}
