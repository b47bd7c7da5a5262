//! Settings for sluice.
//!
//! Settings are read once from `~/.config/sluice/config.toml` at startup and
//! shared as an immutable `Arc<Settings>`. If the file doesn't exist, a
//! default file with comments is created.

pub mod interval;

pub use interval::{format_interval, parse_interval};

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ImageBounds;

/// Main settings struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub grab: GrabSettings,
    pub smtp: SmtpSettings,
    pub exec: ExecSettings,
    pub mail: MailSettings,
    pub twitter: TwitterSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Fallback log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Upper bound on the worker pool size
    pub max_workers: usize,
    /// Marker file guarding against concurrent runs
    pub lock_file: PathBuf,
    /// Subjects longer than this are truncated with ` ...`
    pub subject_length: usize,
    /// Minimum spacing between two no-new-data alerts, in seconds
    pub alert_cooldown: i64,
    pub default_update_interval: i64,
    pub default_alert_interval: i64,
    pub default_destinations: Vec<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_workers: 4,
            lock_file: std::env::temp_dir().join("sluice.lock"),
            subject_length: 100,
            alert_cooldown: 86400,
            default_update_interval: 900,
            default_alert_interval: 604800,
            default_destinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrabSettings {
    /// Timeout for a single fetch or grab, in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Verify TLS certificates for feed fetches and grabs
    pub check_ssl: bool,
    pub headless: bool,
    pub wait_after_load_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
    pub image_min_width: u32,
    pub image_min_height: u32,
    pub image_max_width: u32,
    pub image_max_height: u32,
}

impl Default for GrabSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            check_ssl: true,
            headless: true,
            wait_after_load_ms: 1000,
            window_width: 1024,
            window_height: 768,
            image_min_width: 0,
            image_min_height: 0,
            image_max_width: 4096,
            image_max_height: 4096,
        }
    }
}

impl GrabSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }

    pub fn image_bounds(&self) -> ImageBounds {
        ImageBounds {
            min_width: self.image_min_width,
            min_height: self.image_min_height,
            max_width: self.image_max_width,
            max_height: self.image_max_height,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    /// Implicit TLS, falling back to STARTTLS when the handshake fails
    pub use_ssl: bool,
    pub auth: bool,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 25,
            use_ssl: false,
            auth: false,
            from: "sluice@localhost".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecSettings {
    /// Root under which per-message scratch directories are created
    pub scratch_path: PathBuf,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            scratch_path: std::env::temp_dir().join("sluice"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// Base file name of grabbed attachments
    pub attachment_name: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            attachment_name: "content".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitterSettings {
    pub api_base: String,
    pub bearer_token: Option<String>,
}

impl Default for TwitterSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.twitter.com/1.1".to_string(),
            bearer_token: None,
        }
    }
}

impl Settings {
    /// Load settings from the default path.
    ///
    /// A missing file is created with commented defaults. Missing fields
    /// take their default values; an unparsable file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// `~/.config/sluice/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("sluice").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn default_config_content() -> &'static str {
        r##"# sluice configuration
#
# Intervals are in seconds.

[general]
log_level = "info"
# Number of configurations processed in parallel
max_workers = 4
subject_length = 100
# Minimum time between two "no new data" alerts for one configuration
alert_cooldown = 86400
default_update_interval = 900
default_alert_interval = 604800
# Used by `create` when no --destination is given
default_destinations = []

[grab]
timeout_secs = 30
check_ssl = true
headless = true
wait_after_load_ms = 1000
window_width = 1024
window_height = 768
image_min_width = 0
image_min_height = 0
image_max_width = 4096
image_max_height = 4096

[smtp]
server = "localhost"
port = 25
use_ssl = false
auth = false
from = "sluice@localhost"
# username = ""
# password = ""
timeout_secs = 30

[mail]
attachment_name = "content"

[twitter]
api_base = "https://api.twitter.com/1.1"
# bearer_token = ""
"##
    }
}

/// Settings errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
