//! Extension pour intégrer les réglages du lecteur dans gnxconfig
//!
//! Les budgets de polling et de retry sont stockés sous la clé `reader` :
//!
//! ```yaml
//! reader:
//!   image_polling:
//!     max_attempts: 30
//!     interval_ms: 2000
//!   audio_fetch:
//!     retry_count: 3
//!     backoff_step_ms: 1000
//! ```

use std::time::Duration;

use anyhow::Result;
use gnxconfig::Config;
use serde_yaml::{Number, Value};

use crate::poller::{
    DEFAULT_AUDIO_BACKOFF_STEP, DEFAULT_AUDIO_RETRY_COUNT, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_MAX_ATTEMPTS,
};
use crate::settings::ReaderSettings;

const POLL_ATTEMPTS_PATH: &[&str] = &["reader", "image_polling", "max_attempts"];
const POLL_INTERVAL_PATH: &[&str] = &["reader", "image_polling", "interval_ms"];
const AUDIO_RETRY_PATH: &[&str] = &["reader", "audio_fetch", "retry_count"];
const AUDIO_BACKOFF_PATH: &[&str] = &["reader", "audio_fetch", "backoff_step_ms"];

/// Trait d'extension pour la configuration du lecteur
///
/// Les getters persistent automatiquement les valeurs par défaut.
pub trait ReaderConfigExt {
    fn get_reader_poll_max_attempts(&self) -> Result<u32>;
    fn set_reader_poll_max_attempts(&self, attempts: u32) -> Result<()>;

    fn get_reader_poll_interval_ms(&self) -> Result<u64>;
    fn set_reader_poll_interval_ms(&self, interval_ms: u64) -> Result<()>;

    fn get_reader_audio_retry_count(&self) -> Result<u32>;
    fn set_reader_audio_retry_count(&self, count: u32) -> Result<()>;

    fn get_reader_audio_backoff_step_ms(&self) -> Result<u64>;
    fn set_reader_audio_backoff_step_ms(&self, step_ms: u64) -> Result<()>;

    /// Tous les réglages du lecteur en une fois
    fn get_reader_settings(&self) -> Result<ReaderSettings>;
}

/// Un budget à zéro tentative rendrait le chargement impossible
fn attempts_or(value: u64, default: u32) -> u32 {
    match u32::try_from(value) {
        Ok(0) | Err(_) => default,
        Ok(v) => v,
    }
}

impl ReaderConfigExt for Config {
    fn get_reader_poll_max_attempts(&self) -> Result<u32> {
        let value = self.get_u64_or(POLL_ATTEMPTS_PATH, DEFAULT_POLL_MAX_ATTEMPTS as u64)?;
        Ok(attempts_or(value, DEFAULT_POLL_MAX_ATTEMPTS))
    }

    fn set_reader_poll_max_attempts(&self, attempts: u32) -> Result<()> {
        self.set_value(POLL_ATTEMPTS_PATH, Value::Number(Number::from(attempts)))
    }

    fn get_reader_poll_interval_ms(&self) -> Result<u64> {
        self.get_u64_or(POLL_INTERVAL_PATH, DEFAULT_POLL_INTERVAL.as_millis() as u64)
    }

    fn set_reader_poll_interval_ms(&self, interval_ms: u64) -> Result<()> {
        self.set_value(POLL_INTERVAL_PATH, Value::Number(Number::from(interval_ms)))
    }

    fn get_reader_audio_retry_count(&self) -> Result<u32> {
        let value = self.get_u64_or(AUDIO_RETRY_PATH, DEFAULT_AUDIO_RETRY_COUNT as u64)?;
        Ok(attempts_or(value, DEFAULT_AUDIO_RETRY_COUNT))
    }

    fn set_reader_audio_retry_count(&self, count: u32) -> Result<()> {
        self.set_value(AUDIO_RETRY_PATH, Value::Number(Number::from(count)))
    }

    fn get_reader_audio_backoff_step_ms(&self) -> Result<u64> {
        self.get_u64_or(
            AUDIO_BACKOFF_PATH,
            DEFAULT_AUDIO_BACKOFF_STEP.as_millis() as u64,
        )
    }

    fn set_reader_audio_backoff_step_ms(&self, step_ms: u64) -> Result<()> {
        self.set_value(AUDIO_BACKOFF_PATH, Value::Number(Number::from(step_ms)))
    }

    fn get_reader_settings(&self) -> Result<ReaderSettings> {
        Ok(ReaderSettings::default()
            .with_image_polling(
                self.get_reader_poll_max_attempts()?,
                Duration::from_millis(self.get_reader_poll_interval_ms()?),
            )
            .with_audio_fetch(
                self.get_reader_audio_retry_count()?,
                Duration::from_millis(self.get_reader_audio_backoff_step_ms()?),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::RetryPolicy;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_default_settings_match_builtin_policies() {
        let (_dir, config) = temp_config();
        assert_eq!(config.get_reader_settings().unwrap(), ReaderSettings::default());
    }

    #[test]
    fn test_custom_settings() {
        let (_dir, config) = temp_config();
        config.set_reader_poll_max_attempts(10).unwrap();
        config.set_reader_poll_interval_ms(500).unwrap();
        config.set_reader_audio_retry_count(5).unwrap();

        let settings = config.get_reader_settings().unwrap();
        assert_eq!(
            settings.image_polling,
            RetryPolicy::constant(10, Duration::from_millis(500))
        );
        assert_eq!(
            settings.audio_fetch,
            RetryPolicy::linear(5, Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_zero_attempts_fall_back_to_default() {
        let (_dir, config) = temp_config();
        config.set_reader_poll_max_attempts(0).unwrap();
        assert_eq!(
            config.get_reader_poll_max_attempts().unwrap(),
            DEFAULT_POLL_MAX_ATTEMPTS
        );
    }
}
