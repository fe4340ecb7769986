//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Transcoder/muxer binary, also used for cover extraction
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    /// Prober binary
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// Folder scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanConfig {
    /// Descend into subdirectories (default false)
    #[serde(default)]
    pub recursive: bool,
}

/// Output container configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Stream-copy the audio (true) or re-encode to AAC (false)
    #[serde(default = "default_copy_audio")]
    pub copy_audio: bool,
    /// AAC bitrate used when re-encoding
    #[serde(default = "default_aac_bitrate")]
    pub aac_bitrate: String,
    /// File extension of produced audiobooks, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Directory for produced audiobooks (None = the job's source folder)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_copy_audio() -> bool {
    true
}

fn default_aac_bitrate() -> String {
    "128k".to_string()
}

fn default_extension() -> String {
    "m4b".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            copy_audio: default_copy_audio(),
            aac_bitrate: default_aac_bitrate(),
            extension: default_extension(),
            output_dir: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Parses a boolean environment value, accepting "true"/"1"/"yes" and "false"/"0"/"no".
fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - M4B_FFMPEG -> tools.ffmpeg
    /// - M4B_FFPROBE -> tools.ffprobe
    /// - M4B_SCAN_RECURSIVE -> scan.recursive
    /// - M4B_COPY_AUDIO -> output.copy_audio
    /// - M4B_AAC_BITRATE -> output.aac_bitrate
    /// - M4B_OUTPUT_DIR -> output.output_dir
    ///
    /// Empty or unparseable values leave the existing setting untouched.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("M4B_FFMPEG") {
            if !val.trim().is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("M4B_FFPROBE") {
            if !val.trim().is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("M4B_SCAN_RECURSIVE") {
            if let Some(recursive) = parse_bool(&val) {
                self.scan.recursive = recursive;
            }
        }

        if let Ok(val) = env::var("M4B_COPY_AUDIO") {
            if let Some(copy) = parse_bool(&val) {
                self.output.copy_audio = copy;
            }
        }

        if let Ok(val) = env::var("M4B_AAC_BITRATE") {
            if !val.trim().is_empty() {
                self.output.aac_bitrate = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("M4B_OUTPUT_DIR") {
            if !val.trim().is_empty() {
                self.output.output_dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults (plus overrides).
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
