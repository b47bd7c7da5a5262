use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which source plugin feeds a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Twitter,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::Twitter => "twitter",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rss" => Ok(SourceKind::Rss),
            "twitter" => Ok(SourceKind::Twitter),
            other => Err(format!("This plugin is not supported: {}", other)),
        }
    }
}

/// Action keys a destination kind knows how to honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Grab,
    Priority,
    Subject,
    Tag,
}

/// Where an enriched message goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Destination {
    Mail(String),
    Exec(PathBuf),
}

impl Destination {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Destination::Mail(_) => &[
                Capability::Grab,
                Capability::Priority,
                Capability::Subject,
                Capability::Tag,
            ],
            Destination::Exec(_) => &[Capability::Grab, Capability::Tag],
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn is_mail(&self) -> bool {
        matches!(self, Destination::Mail(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Mail(address) => write!(f, "mail:{}", address),
            Destination::Exec(path) => write!(f, "exec:{}", path.display()),
        }
    }
}

impl FromStr for Destination {
    type Err = String;

    /// Accepts `mail:<address>`, `exec:<path>` or a bare mail address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let destination = if let Some(path) = s.strip_prefix("exec:") {
            if path.trim().is_empty() {
                return Err("Exec destination must name an executable".to_string());
            }
            Destination::Exec(PathBuf::from(path.trim()))
        } else {
            let address = s.strip_prefix("mail:").unwrap_or(s).trim();
            if address.parse::<lettre::Address>().is_err() {
                return Err(format!("Destination must be a valid email: {}", address));
            }
            Destination::Mail(address.to_string())
        };

        Ok(destination)
    }
}

/// Pixel bounds an image must fall within to be kept by an image grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBounds {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ImageBounds {
    fn default() -> Self {
        Self {
            min_width: 0,
            min_height: 0,
            max_width: u32::MAX,
            max_height: u32::MAX,
        }
    }
}

impl ImageBounds {
    pub fn contains(&self, width: u32, height: u32) -> bool {
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
    }
}

/// A persisted rule binding one source to its destinations.
///
/// Intervals and timestamps are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub id: i64,
    pub enabled: bool,
    pub plugin: SourceKind,
    pub source: String,
    pub destinations: Vec<Destination>,
    pub alert_interval: i64,
    pub update_interval: i64,
    pub description: Option<String>,
    pub patterns: Vec<String>,
    pub actions: Vec<String>,
    pub last_timestamp: i64,
    pub counter: i64,
    pub last_alert: i64,
    pub image_bounds: ImageBounds,
}

impl ConfigurationRecord {
    pub fn new(plugin: SourceKind, source: impl Into<String>, destinations: Vec<Destination>) -> Self {
        Self {
            id: 0,
            enabled: true,
            plugin,
            source: source.into(),
            destinations,
            alert_interval: 604800,
            update_interval: 900,
            description: None,
            patterns: Vec::new(),
            actions: Vec::new(),
            last_timestamp: 0,
            counter: 0,
            last_alert: 0,
            image_bounds: ImageBounds::default(),
        }
    }

    /// `id -> plugin -> source`, used in log lines and alerts.
    pub fn label(&self) -> String {
        format!("{} -> {} -> {}", self.id, self.plugin, self.source)
    }

    pub fn first_mail_destination(&self) -> Option<&str> {
        self.destinations.iter().find_map(|d| match d {
            Destination::Mail(address) => Some(address.as_str()),
            Destination::Exec(_) => None,
        })
    }
}

/// Partial update of a configuration's user-editable fields.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationUpdate {
    pub enabled: Option<bool>,
    pub plugin: Option<SourceKind>,
    pub source: Option<String>,
    pub destinations: Option<Vec<Destination>>,
    pub alert_interval: Option<i64>,
    pub update_interval: Option<i64>,
    pub description: Option<String>,
    pub patterns: Option<Vec<String>>,
    pub actions: Option<Vec<String>>,
    pub image_bounds: Option<ImageBounds>,
}

impl ConfigurationUpdate {
    /// Apply onto a record. A new source resets the timestamp and counter.
    pub fn apply(&self, record: &mut ConfigurationRecord) {
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
        if let Some(plugin) = self.plugin {
            record.plugin = plugin;
        }
        if let Some(ref source) = self.source {
            if *source != record.source {
                record.last_timestamp = 0;
                record.counter = 0;
            }
            record.source = source.clone();
        }
        if let Some(ref destinations) = self.destinations {
            record.destinations = destinations.clone();
        }
        if let Some(alert_interval) = self.alert_interval {
            record.alert_interval = alert_interval;
        }
        if let Some(update_interval) = self.update_interval {
            record.update_interval = update_interval;
        }
        if let Some(ref description) = self.description {
            record.description = Some(description.clone());
        }
        if let Some(ref patterns) = self.patterns {
            record.patterns = patterns.clone();
        }
        if let Some(ref actions) = self.actions {
            record.actions = actions.clone();
        }
        if let Some(bounds) = self.image_bounds {
            record.image_bounds = bounds;
        }
    }
}
