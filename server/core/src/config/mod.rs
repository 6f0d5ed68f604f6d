//! TOML Configuration File Support
//!
//! Centralized configuration loading for the partty daemon, with an optional
//! TOML file at `~/.config/partty/partty.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`PARTTY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 2222
//! max_connections = 1024
//! handshake_timeout_ms = 5000
//! shutdown_grace_ms = 500
//! stats_interval_secs = 60
//!
//! [animation]
//! fps = 15
//! frames_dir = "/usr/share/partty/frames"
//! write_timeout_ms = 2000
//! seed = 42
//!
//! [palette]
//! colors = ["#FF0000", "#FFFF00", "#00FF00", "#0247FE", "#FF00FF", "#00FFFF", "#FFFFFF"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, Color, StylePalette, DEFAULT_COLORS};
use crate::runtime::{RuntimeConfig, DEFAULT_FPS};
use crate::transport::TransportConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// An explicitly requested config file does not exist
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<CatalogError> for ConfigError {
    fn from(e: CatalogError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address to listen on
    pub bind: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Maximum simultaneous connections
    pub max_connections: Option<usize>,
    /// Handshake deadline in milliseconds
    pub handshake_timeout_ms: Option<u64>,
    /// Shutdown grace period in milliseconds
    pub shutdown_grace_ms: Option<u64>,
    /// Interval between stats log lines, in seconds (0 disables)
    pub stats_interval_secs: Option<u64>,
}

/// `[animation]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationToml {
    /// Frames per second
    pub fps: Option<u32>,
    /// Directory of `*.txt` frames replacing the bundled set
    pub frames_dir: Option<PathBuf>,
    /// Per-write timeout in milliseconds
    pub write_timeout_ms: Option<u64>,
    /// Seed for reproducible color sequences
    pub seed: Option<u64>,
}

/// `[palette]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteToml {
    /// Foreground colors as `#RRGGBB`
    pub colors: Option<Vec<Color>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyToml {
    /// Listener settings
    pub server: ServerToml,
    /// Animation settings
    pub animation: AnimationToml,
    /// Color settings
    pub palette: PaletteToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for the daemon
#[derive(Clone, Debug)]
pub struct PartyConfig {
    /// Address to listen on
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum simultaneous connections
    pub max_connections: usize,
    /// Handshake deadline
    pub handshake_timeout: Duration,
    /// How long shutdown waits for sessions to say goodbye
    pub shutdown_grace: Duration,
    /// Interval between stats log lines; zero disables them
    pub stats_interval: Duration,
    /// Frames per second
    pub fps: u32,
    /// Directory of frames replacing the bundled set
    pub frames_dir: Option<PathBuf>,
    /// Per-write timeout
    pub write_timeout: Duration,
    /// Seed for reproducible color sequences
    pub seed: Option<u64>,
    /// Palette colors
    pub colors: Vec<Color>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 2222,
            max_connections: 1024,
            handshake_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_millis(500),
            stats_interval: Duration::from_secs(60),
            fps: DEFAULT_FPS,
            frames_dir: None,
            write_timeout: Duration::from_secs(2),
            seed: None,
            colors: DEFAULT_COLORS.to_vec(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PartyConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority layer that set any value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// `bind:port`, ready for a listener
    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    /// Reject values no server could run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::ValidationError("bind address is empty".into()));
        }
        if self.fps == 0 {
            return Err(ConfigError::ValidationError(
                "fps must be greater than zero".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than zero".into(),
            ));
        }
        if self.colors.is_empty() {
            return Err(ConfigError::ValidationError(
                "palette needs at least one color".into(),
            ));
        }
        if self.write_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Session runtime settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `fps` is zero.
    pub fn runtime_config(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = RuntimeConfig::from_fps(self.fps)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?
            .with_write_timeout(self.write_timeout);
        config.seed = self.seed;
        Ok(config)
    }

    /// Per-connection transport settings
    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            handshake_timeout: self.handshake_timeout,
            ..TransportConfig::default()
        }
    }

    /// Palette built from the configured colors
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if no colors are configured.
    pub fn palette(&self) -> Result<StylePalette, ConfigError> {
        Ok(StylePalette::from_colors(self.colors.iter().copied())?)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/partty/partty.toml`, typically
/// `~/.config/partty/partty.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("partty").join("partty.toml"))
}

/// Load configuration from the default file and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<PartyConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref())
}

/// Load configuration from an optional file and the environment
///
/// A missing file is skipped.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<PartyConfig, ConfigError> {
    load_with(path, false, |key| std::env::var(key).ok())
}

/// Load configuration from a file that must exist, then the environment
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if the file is missing, otherwise as
/// [`load_config_from_path`].
pub fn load_required_config(path: &Path) -> Result<PartyConfig, ConfigError> {
    load_with(Some(path), true, |key| std::env::var(key).ok())
}

fn load_with<F>(path: Option<&Path>, required: bool, env: F) -> Result<PartyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PartyConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;

            let toml_config: PartyToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else if required {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PartyConfig, toml: &PartyToml) {
    if let Some(ref bind) = toml.server.bind {
        config.bind.clone_from(bind);
    }
    if let Some(port) = toml.server.port {
        config.port = port;
    }
    if let Some(max) = toml.server.max_connections {
        config.max_connections = max;
    }
    if let Some(ms) = toml.server.handshake_timeout_ms {
        config.handshake_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.server.shutdown_grace_ms {
        config.shutdown_grace = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.server.stats_interval_secs {
        config.stats_interval = Duration::from_secs(secs);
    }

    if let Some(fps) = toml.animation.fps {
        config.fps = fps;
    }
    if toml.animation.frames_dir.is_some() {
        config.frames_dir.clone_from(&toml.animation.frames_dir);
    }
    if let Some(ms) = toml.animation.write_timeout_ms {
        config.write_timeout = Duration::from_millis(ms);
    }
    if toml.animation.seed.is_some() {
        config.seed = toml.animation.seed;
    }

    if let Some(ref colors) = toml.palette.colors {
        config.colors.clone_from(colors);
    }
}

/// Parse one environment variable, warning about values that do not parse
fn env_value<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut PartyConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = env("PARTTY_BIND") {
        config.bind = bind;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env_value(&env, "PARTTY_PORT") {
        config.port = port;
        config.source = ConfigSource::Env;
    }
    if let Some(fps) = env_value(&env, "PARTTY_FPS") {
        config.fps = fps;
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = env("PARTTY_FRAMES_DIR") {
        config.frames_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(seed) = env_value(&env, "PARTTY_SEED") {
        config.seed = Some(seed);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = env_value(&env, "PARTTY_MAX_CONNECTIONS") {
        config.max_connections = max;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub bind: Option<String>,
    /// Port override
    pub port: Option<u16>,
    /// FPS override
    pub fps: Option<u32>,
    /// Frames directory override
    pub frames_dir: Option<PathBuf>,
    /// Seed override
    pub seed: Option<u64>,
    /// Connection limit override
    pub max_connections: Option<usize>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = Some(bind.into());
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set FPS override
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set frames directory override
    #[must_use]
    pub fn with_frames_dir(mut self, dir: PathBuf) -> Self {
        self.frames_dir = Some(dir);
        self
    }

    /// Set seed override
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set connection limit override
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    fn is_empty(&self) -> bool {
        self.bind.is_none()
            && self.port.is_none()
            && self.fps.is_none()
            && self.frames_dir.is_none()
            && self.seed.is_none()
            && self.max_connections.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PartyConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref bind) = self.bind {
            config.bind.clone_from(bind);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if self.frames_dir.is_some() {
            config.frames_dir.clone_from(&self.frames_dir);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PartyConfig::default();

        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 2222);
        assert_eq!(config.fps, 15);
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.colors, DEFAULT_COLORS.to_vec());
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_with(Some(Path::new("/nonexistent/partty.toml")), false, no_env).unwrap();
        assert_eq!(config.port, 2222);
        assert!(config.config_file_path.is_none());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_missing_required_file_is_an_error() {
        let result = load_with(Some(Path::new("/nonexistent/partty.toml")), true, no_env);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_full_toml() {
        let file = write_toml(
            r##"
[server]
bind = "127.0.0.1"
port = 3000
max_connections = 8
handshake_timeout_ms = 250
shutdown_grace_ms = 100
stats_interval_secs = 0

[animation]
fps = 30
frames_dir = "/tmp/frames"
write_timeout_ms = 500
seed = 42

[palette]
colors = ["#112233", "#AABBCC"]
"##,
        );

        let config = load_with(Some(file.path()), true, no_env).unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:3000");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.shutdown_grace, Duration::from_millis(100));
        assert_eq!(config.stats_interval, Duration::ZERO);
        assert_eq!(config.fps, 30);
        assert_eq!(config.frames_dir, Some(PathBuf::from("/tmp/frames")));
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        assert_eq!(config.seed, Some(42));
        assert_eq!(
            config.colors,
            vec![Color::rgb(0x11, 0x22, 0x33), Color::rgb(0xAA, 0xBB, 0xCC)]
        );
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let file = write_toml("[animation]\nfps = 10\n");
        let config = load_with(Some(file.path()), true, no_env).unwrap();

        assert_eq!(config.fps, 10);
        assert_eq!(config.port, 2222);
        assert_eq!(config.colors.len(), 7);
    }

    #[test]
    fn test_bad_color_fails_to_parse() {
        let file = write_toml("[palette]\ncolors = [\"red\"]\n");
        let result = load_with(Some(file.path()), true, no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let file = write_toml("[server\nport = ");
        assert!(matches!(
            load_with(Some(file.path()), true, no_env),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[server]\nport = 3000\n[animation]\nfps = 30\n");
        let env = env_of(&[
            ("PARTTY_PORT", "4000"),
            ("PARTTY_SEED", "9"),
            ("PARTTY_FPS", "not-a-number"),
        ]);

        let config = load_with(Some(file.path()), true, env).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.seed, Some(9));
        // unparsable values are ignored, not fatal
        assert_eq!(config.fps, 30);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_everything() {
        let env = env_of(&[("PARTTY_PORT", "4000"), ("PARTTY_BIND", "10.0.0.1")]);
        let mut config = load_with(None, false, env).unwrap();

        ConfigOverrides::new()
            .with_port(5000)
            .with_fps(5)
            .with_max_connections(2)
            .apply(&mut config);

        assert_eq!(config.port, 5000);
        assert_eq!(config.bind, "10.0.0.1");
        assert_eq!(config.fps, 5);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = PartyConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_fps = PartyConfig {
            fps: 0,
            ..PartyConfig::default()
        };
        assert!(matches!(
            zero_fps.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(zero_fps.runtime_config().is_err());

        let absurd_fps = PartyConfig {
            fps: u32::MAX,
            ..PartyConfig::default()
        };
        assert!(matches!(
            absurd_fps.runtime_config(),
            Err(ConfigError::ValidationError(_))
        ));

        let no_colors = PartyConfig {
            colors: Vec::new(),
            ..PartyConfig::default()
        };
        assert!(no_colors.validate().is_err());
        assert!(no_colors.palette().is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = PartyConfig {
            fps: 20,
            seed: Some(3),
            handshake_timeout: Duration::from_secs(1),
            ..PartyConfig::default()
        };

        let runtime = config.runtime_config().unwrap();
        assert_eq!(runtime.tick_period, Duration::from_millis(50));
        assert_eq!(runtime.seed, Some(3));
        assert_eq!(runtime.write_timeout, Duration::from_secs(2));

        assert_eq!(
            config.transport_config().handshake_timeout,
            Duration::from_secs(1)
        );
        assert_eq!(config.palette().unwrap().len(), 7);
    }

    #[test]
    fn test_ipv6_listen_addr() {
        let config = PartyConfig {
            bind: "::1".to_string(),
            ..PartyConfig::default()
        };
        assert_eq!(config.listen_addr(), "[::1]:2222");
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("partty/partty.toml"));
        }
    }
}
