use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub translation: TranslationConfig,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub frame_samples: usize,
}

/// Conversation session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Language-accent pair, e.g. "english-us".
    pub language_accent: String,
    /// Prebuilt voice name; None picks the accent's default.
    pub voice: Option<String>,
    pub processing_debounce_ms: u64,
}

/// Translation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            frame_samples: defaults::CAPTURE_FRAME_SAMPLES,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language_accent: "english-us".to_string(),
            voice: None,
            processing_debounce_ms: defaults::PROCESSING_DEBOUNCE_MS,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: defaults::TRANSLATION_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PARLO_API_KEY → translation.api_key
    /// - PARLO_LANGUAGE → session.language_accent
    /// - PARLO_AUDIO_DEVICE → audio.input_device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(api_key) = std::env::var("PARLO_API_KEY")
            && !api_key.is_empty()
        {
            self.translation.api_key = Some(api_key);
        }

        if let Ok(language) = std::env::var("PARLO_LANGUAGE")
            && !language.is_empty()
        {
            self.session.language_accent = language;
        }

        if let Ok(device) = std::env::var("PARLO_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.input_device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/parlo/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("parlo")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_parlo_env() {
        remove_env("PARLO_API_KEY");
        remove_env("PARLO_LANGUAGE");
        remove_env("PARLO_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.input_device, None);
        assert_eq!(config.audio.frame_samples, 4096);

        assert_eq!(config.session.language_accent, "english-us");
        assert_eq!(config.session.voice, None);
        assert_eq!(config.session.processing_debounce_ms, 1200);

        assert_eq!(config.translation.api_key, None);
        assert_eq!(config.translation.model, defaults::TRANSLATION_MODEL);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            input_device = "pipewire"
            frame_samples = 2048

            [session]
            language_accent = "spanish-mx"
            voice = "Puck"
            processing_debounce_ms = 800

            [translation]
            api_key = "k-123"
            model = "gemini-2.5-pro"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.input_device, Some("pipewire".to_string()));
        assert_eq!(config.audio.frame_samples, 2048);

        assert_eq!(config.session.language_accent, "spanish-mx");
        assert_eq!(config.session.voice, Some("Puck".to_string()));
        assert_eq!(config.session.processing_debounce_ms, 800);

        assert_eq!(config.translation.api_key, Some("k-123".to_string()));
        assert_eq!(config.translation.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [session]
            language_accent = "french-ca"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.session.language_accent, "french-ca");

        assert_eq!(config.audio.input_device, None);
        assert_eq!(config.audio.frame_samples, 4096);
        assert_eq!(config.session.voice, None);
        assert_eq!(config.translation.api_key, None);
    }

    #[test]
    fn test_env_override_api_key() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parlo_env();

        set_env("PARLO_API_KEY", "k-env");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.translation.api_key, Some("k-env".to_string()));
        assert_eq!(config.session.language_accent, "english-us"); // Not overridden

        clear_parlo_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parlo_env();

        set_env("PARLO_API_KEY", "k-env");
        set_env("PARLO_LANGUAGE", "malay-my");
        set_env("PARLO_AUDIO_DEVICE", "pulse");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.translation.api_key, Some("k-env".to_string()));
        assert_eq!(config.session.language_accent, "malay-my");
        assert_eq!(config.audio.input_device, Some("pulse".to_string()));

        clear_parlo_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parlo_env();

        set_env("PARLO_LANGUAGE", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.session.language_accent, "english-us");

        clear_parlo_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            input_device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(result.is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("parlo"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_parlo_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_propagates_invalid_toml() {
        let invalid_toml = r#"
            [audio
            input_device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }
}
