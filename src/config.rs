use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Top-level configuration, loaded from `~/.voicedrop.toml`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Push-to-talk hotkey binding
    pub hotkey: HotkeyConfig,
    /// Audio capture settings
    pub audio: AudioConfig,
    /// Transcription backend selection and parameters
    pub transcription: TranscriptionConfig,
    /// Clipboard insertion tuning
    pub insertion: InsertionConfig,
    /// Artifact retention policy
    pub recordings: RecordingConfig,
    /// Log file settings
    pub telemetry: TelemetryConfig,
}

/// Hotkey binding: modifier list plus a key name
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Modifier names ("Control", "Option", "Command", "Shift")
    pub modifiers: Vec<String>,
    /// Key name (single letter)
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            modifiers: vec!["Control".to_owned(), "Option".to_owned()],
            key: "Z".to_owned(),
        }
    }
}

/// Audio capture settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate handed to the transcription backends
    pub sample_rate: u32,
    /// Directory for captured artifact WAVs
    pub recordings_dir: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            recordings_dir: "~/.voicedrop/recordings".to_owned(),
        }
    }
}

/// Which transcription backend is active
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionMode {
    /// On-device whisper model
    Local,
    /// OpenAI-compatible remote endpoint
    Remote,
}

/// Transcription backend selection and parameters
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Active backend
    pub mode: TranscriptionMode,
    /// Target language code, or "auto" for detection
    pub language: String,
    /// On-device model settings
    pub local: LocalModelConfig,
    /// Remote endpoint settings
    pub remote: RemoteConfig,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            mode: TranscriptionMode::Local,
            language: "auto".to_owned(),
            local: LocalModelConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl TranscriptionConfig {
    /// Language code for the backends (`None` = auto-detect)
    #[must_use]
    pub fn language_code(&self) -> Option<&str> {
        if self.language.is_empty() || self.language == "auto" {
            None
        } else {
            Some(&self.language)
        }
    }
}

/// On-device whisper model settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LocalModelConfig {
    /// Path to the ggml model file
    pub model_path: String,
    /// Inference threads
    pub threads: usize,
    /// Beam search width (1 = greedy)
    pub beam_size: usize,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_path: "~/.voicedrop/models/ggml-small.bin".to_owned(),
            threads: 4,
            beam_size: 5,
        }
    }
}

/// Remote OpenAI-compatible endpoint settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    /// Endpoint base URL (empty = unconfigured)
    pub endpoint: String,
    /// Model name sent to the server
    pub model: String,
    /// API key; falls back to the `VOICEDROP_API_KEY` env var
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "whisper-1".to_owned(),
            api_key: None,
            temperature: 0.0,
            timeout_secs: 30,
        }
    }
}

/// Clipboard insertion tuning
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InsertionConfig {
    /// Write-verify attempts before giving up
    pub max_attempts: u32,
    /// How long to poll the clipboard revision counter per attempt (ms)
    pub commit_timeout_ms: u64,
    /// How long the target app gets to read the clipboard after paste (ms)
    pub settle_ms: u64,
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            commit_timeout_ms: 200,
            settle_ms: 300,
        }
    }
}

/// Artifact retention policy
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecordingConfig {
    /// Delete artifacts older than this many days (0 = no age limit)
    pub retention_days: u32,
    /// Keep at most this many artifacts (0 = no count limit)
    pub max_count: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            max_count: 20,
        }
    }
}

/// Log file settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Write logs to a file instead of stdout
    pub enabled: bool,
    /// Log file location
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.voicedrop/voicedrop.log".to_owned(),
        }
    }
}

impl Config {
    /// Load config from `~/.voicedrop.toml`, creating the default file on first run
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".voicedrop.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        let default_config = r#"[hotkey]
modifiers = ["Control", "Option"]
key = "Z"

[audio]
sample_rate = 16000
recordings_dir = "~/.voicedrop/recordings"

[transcription]
mode = "local"
language = "auto"

[transcription.local]
model_path = "~/.voicedrop/models/ggml-small.bin"
threads = 4
beam_size = 5

[transcription.remote]
endpoint = ""
model = "whisper-1"
temperature = 0.0
timeout_secs = 30

[insertion]
max_attempts = 3
commit_timeout_ms = 200
settle_ms = 300

[recordings]
retention_days = 7
max_count = 20

[telemetry]
enabled = true
log_path = "~/.voicedrop/voicedrop.log"
"#;
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if HOME is unset while the path starts with `~/`
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
