use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::DEFAULT_BASE_URL;
use crate::health::RetryPolicy;

/// How the health monitor retries while the voice server is down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Delay before the first retry, in milliseconds.
    pub interval_ms: u64,
    /// Growth factor applied per failed attempt (1.0 = fixed interval).
    pub multiplier: f64,
    /// Upper bound on the retry delay, in milliseconds.
    pub max_interval_ms: u64,
    /// Give up after this many consecutive failures; `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            multiplier: 1.0,
            max_interval_ms: 30_000,
            max_attempts: None,
        }
    }
}

/// Floor for the retry interval so a zero in the config cannot spin.
const MIN_INTERVAL_MS: u64 = 100;

impl HealthConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.interval_ms.max(MIN_INTERVAL_MS)),
            multiplier: self.multiplier,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub connect_timeout_ms: u64,
    /// Abandon a single-shot capture after this many seconds.
    pub listen_timeout_secs: Option<u64>,
    /// Case-insensitive trigger phrase looked for in transcripts.
    pub wake_word: String,
    /// What Jarvis says back when it hears the wake word.
    pub wake_reply: String,
    /// Phrase used by the speech test.
    pub demo_phrase: String,
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_BASE_URL.into(),
            connect_timeout_ms: 1500,
            listen_timeout_secs: None,
            wake_word: "jarvis".into(),
            wake_reply: "Bola sir".into(),
            demo_phrase: "Hello, I am Jarvis. Your personal assistant.".into(),
            health: HealthConfig::default(),
        }
    }
}

impl Config {
    /// Directory: ~/.config/jarvis-desk/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("jarvis-desk");
        p
    }

    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, writing the defaults out on first run.
    pub fn load_or_create() -> Self {
        Self::load_or_create_at(&Self::path())
    }

    fn load_or_create_at(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match config.save_to(path) {
                Ok(()) => log::info!("Wrote default config to {}", path.display()),
                Err(e) => log::warn!("Failed to write default config: {e}"),
            }
            return config;
        }
        Self::load_from(path)
    }

    /// Load from `path`, returning defaults if it is unreadable or invalid.
    fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => Self::from_json(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Option<Duration> {
        self.listen_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let cfg = Config::from_json(r#"{"wake_word":"friday","health":{"max_attempts":5}}"#)
            .unwrap();
        assert_eq!(cfg.wake_word, "friday");
        assert_eq!(cfg.server_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.health.max_attempts, Some(5));
        assert_eq!(cfg.health.interval_ms, 2000);
    }

    #[test]
    fn default_retry_policy_is_fixed_two_seconds_forever() {
        let policy = Config::default().health.retry_policy();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.delay(1), policy.delay(10));
    }

    #[test]
    fn round_trips_through_json() {
        let mut cfg = Config::default();
        cfg.listen_timeout_secs = Some(20);
        let data = serde_json::to_string_pretty(&cfg).unwrap();
        assert_eq!(Config::from_json(&data).unwrap(), cfg);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let health = HealthConfig {
            interval_ms: 0,
            ..HealthConfig::default()
        };
        assert_eq!(
            health.retry_policy().interval,
            Duration::from_millis(MIN_INTERVAL_MS)
        );
        assert_eq!(health.retry_policy().delay(1), Duration::from_millis(100));
    }

    #[test]
    fn first_run_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jarvis-desk").join("config.json");

        let created = Config::load_or_create_at(&path);
        assert_eq!(created, Config::default());
        assert!(path.exists());

        let mut edited = created.clone();
        edited.wake_word = "friday".into();
        edited.save_to(&path).unwrap();
        assert_eq!(Config::load_or_create_at(&path), edited);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults_and_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Config::load_or_create_at(&path), Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
