//! Application settings loaded from environment variables.

use std::env;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_APP_NAME, DEFAULT_DATABASE_URL, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
};

/// The bound settings section: primary connection string and application name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    pub default_db: String,
    pub app_name: String,
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("default_db", &"[REDACTED]")
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppSettings,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            app: AppSettings {
                default_db: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                app_name: env::var("APP_NAME").unwrap_or_else(|_| DEFAULT_APP_NAME.to_string()),
            },
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SERVER_PORT),
        }
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_connection_string() {
        let config = Config {
            app: AppSettings {
                default_db: "postgres://user:secret@db/app".to_string(),
                app_name: "Demo".to_string(),
            },
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
        };

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("Demo"));
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }
}
