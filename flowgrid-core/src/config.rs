use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const FALLBACK_GESTURE_DURATION_MS: u64 = 500;
const FALLBACK_ENQUEUE_RETRIES: u32 = 8;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    history: HistoryConfig,
    #[serde(default)]
    queue: QueueFileConfig,
}

#[derive(Deserialize, Default)]
struct HistoryConfig {
    gesture_duration_ms: Option<u64>,
    max_depth: Option<usize>,
}

#[derive(Deserialize, Default)]
struct QueueFileConfig {
    capacity: Option<usize>,
    enqueue_retries: Option<u32>,
}

/// Settings the dispatcher reads once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Quiescence window closing a gesture.
    pub gesture_duration: Duration,
    /// Maximum number of gestures kept; 0 keeps all of them.
    pub max_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            gesture_duration: Duration::from_millis(FALLBACK_GESTURE_DURATION_MS),
            max_depth: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// 0 means unbounded.
    pub capacity: usize,
    pub enqueue_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            enqueue_retries: FALLBACK_ENQUEUE_RETRIES,
        }
    }
}

pub struct Config {
    history: HistoryConfig,
    queue: QueueFileConfig,
}

impl Config {
    /// Embedded defaults, overridden field-by-field by the user's config file.
    pub fn load() -> Self {
        let mut base = embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "flowgrid::config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "flowgrid::config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            history: base.history,
            queue: base.queue,
        }
    }

    /// Embedded defaults overridden by `contents`.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let mut base = embedded();
        merge(&mut base, toml::from_str(contents)?);
        Ok(Config {
            history: base.history,
            queue: base.queue,
        })
    }

    pub fn dispatch(&self) -> DispatchConfig {
        let fallback = DispatchConfig::default();
        DispatchConfig {
            gesture_duration: self
                .history
                .gesture_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.gesture_duration),
            max_depth: self.history.max_depth.unwrap_or(fallback.max_depth),
        }
    }

    pub fn queue(&self) -> QueueConfig {
        let fallback = QueueConfig::default();
        QueueConfig {
            capacity: self.queue.capacity.unwrap_or(fallback.capacity),
            enqueue_retries: self.queue.enqueue_retries.unwrap_or(fallback.enqueue_retries),
        }
    }
}

fn embedded() -> ConfigFile {
    match toml::from_str(DEFAULT_CONFIG) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "flowgrid::config", "embedded config.toml is malformed: {}", e);
            ConfigFile::default()
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("flowgrid").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.history.gesture_duration_ms.is_some() {
        base.history.gesture_duration_ms = user.history.gesture_duration_ms;
    }
    if user.history.max_depth.is_some() {
        base.history.max_depth = user.history.max_depth;
    }
    if user.queue.capacity.is_some() {
        base.queue.capacity = user.queue.capacity;
    }
    if user.queue.enqueue_retries.is_some() {
        base.queue.enqueue_retries = user.queue.enqueue_retries;
    }
}
