//! Extension pour intégrer le client GNX dans gnxconfig
//!
//! Ce module fournit le trait `GnxApiConfigExt` qui ajoute à
//! `gnxconfig::Config` les réglages du client HTTP (section `api`).
//!
//! # Exemple
//!
//! ```no_run
//! use gnxconfig::get_config;
//! use gnxapi::GnxApiConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! println!("Backend: {}", config.get_api_base_url()?);
//! # Ok(())
//! # }
//! ```

use crate::client::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use anyhow::Result;
use gnxconfig::Config;
use serde_yaml::Value;

const BASE_URL_PATH: &[&str] = &["api", "base_url"];
const TIMEOUT_PATH: &[&str] = &["api", "request_timeout_secs"];
const USER_AGENT_PATH: &[&str] = &["api", "user_agent"];

/// Trait d'extension pour la configuration du client GNX
///
/// # Auto-persist des valeurs par défaut
///
/// Les getters persistent automatiquement les valeurs par défaut dans la
/// configuration si elles n'existent pas encore.
pub trait GnxApiConfigExt {
    /// URL de base de l'API (défaut `http://localhost:8080/api`)
    fn get_api_base_url(&self) -> Result<String>;

    fn set_api_base_url(&self, url: &str) -> Result<()>;

    /// Timeout des requêtes HTTP en secondes (défaut 30)
    fn get_api_request_timeout_secs(&self) -> Result<u64>;

    fn set_api_request_timeout_secs(&self, secs: u64) -> Result<()>;

    fn get_api_user_agent(&self) -> Result<String>;

    fn set_api_user_agent(&self, user_agent: &str) -> Result<()>;
}

impl GnxApiConfigExt for Config {
    fn get_api_base_url(&self) -> Result<String> {
        self.get_string_or(BASE_URL_PATH, DEFAULT_BASE_URL)
    }

    fn set_api_base_url(&self, url: &str) -> Result<()> {
        self.set_value(BASE_URL_PATH, Value::String(url.to_string()))
    }

    fn get_api_request_timeout_secs(&self) -> Result<u64> {
        let secs = self.get_u64_or(TIMEOUT_PATH, DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if secs == 0 {
            // Un timeout nul rendrait toutes les requêtes impossibles
            self.set_api_request_timeout_secs(DEFAULT_REQUEST_TIMEOUT_SECS)?;
            return Ok(DEFAULT_REQUEST_TIMEOUT_SECS);
        }
        Ok(secs)
    }

    fn set_api_request_timeout_secs(&self, secs: u64) -> Result<()> {
        self.set_value(
            TIMEOUT_PATH,
            Value::Number(serde_yaml::Number::from(secs)),
        )
    }

    fn get_api_user_agent(&self) -> Result<String> {
        self.get_string_or(USER_AGENT_PATH, DEFAULT_USER_AGENT)
    }

    fn set_api_user_agent(&self, user_agent: &str) -> Result<()> {
        self.set_value(USER_AGENT_PATH, Value::String(user_agent.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_from_embedded_yaml() {
        let (_dir, config) = temp_config();
        assert_eq!(config.get_api_base_url().unwrap(), DEFAULT_BASE_URL);
        assert_eq!(
            config.get_api_request_timeout_secs().unwrap(),
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
        assert_eq!(config.get_api_user_agent().unwrap(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_set_and_get() {
        let (_dir, config) = temp_config();
        config.set_api_base_url("http://gnx.test/api").unwrap();
        config.set_api_request_timeout_secs(5).unwrap();
        assert_eq!(config.get_api_base_url().unwrap(), "http://gnx.test/api");
        assert_eq!(config.get_api_request_timeout_secs().unwrap(), 5);
    }

    #[test]
    fn test_zero_timeout_falls_back() {
        let (_dir, config) = temp_config();
        config.set_api_request_timeout_secs(0).unwrap();
        assert_eq!(
            config.get_api_request_timeout_secs().unwrap(),
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
    }
}
