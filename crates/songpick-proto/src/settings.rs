//! User settings (debug flag, shortcut key) and the store that persists them
//! and announces every change to subscribers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::platform;
use crate::protocol::SettingsChanged;

pub const DEFAULT_SHORTCUT_KEY: &str = "=";
pub const MAX_SHORTCUT_LEN: usize = 20;

/// Key names that only make sense combined with another key.
const REJECTED_KEYS: &[&str] = &[
    "Shift", "Control", "Alt", "Meta", "CapsLock", "Tab", "Enter", "Escape",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_shortcut_key")]
    pub shortcut_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            shortcut_key: default_shortcut_key(),
        }
    }
}

fn default_shortcut_key() -> String {
    DEFAULT_SHORTCUT_KEY.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// Check a key picked by the user before it is offered to the store.
///
/// Single upper-case letters are stored lower-case: the upper-case form is
/// what Shift produces, and Shift is reserved for a forced refresh.
pub fn validate_shortcut_key(key: &str) -> Result<String, SettingsError> {
    if key.is_empty()
        || REJECTED_KEYS.contains(&key)
        || key.chars().count() > MAX_SHORTCUT_LEN
    {
        return Err(SettingsError::InvalidKey(key.to_string()));
    }
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_uppercase() => Ok(c.to_lowercase().collect()),
        _ => Ok(key.to_string()),
    }
}

/// Apply `patch` on top of `current` the way the store does: missing or empty
/// fields keep their value, long keys are cut to `MAX_SHORTCUT_LEN` chars.
pub fn sanitize(current: &Settings, patch: &SettingsChanged) -> Settings {
    let shortcut_key = patch
        .shortcut_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|k| k.chars().take(MAX_SHORTCUT_LEN).collect())
        .unwrap_or_else(|| current.shortcut_key.clone());

    Settings {
        debug: patch.debug.unwrap_or(current.debug),
        shortcut_key,
    }
}

fn diff(old: &Settings, new: &Settings) -> SettingsChanged {
    SettingsChanged {
        shortcut_key: (old.shortcut_key != new.shortcut_key).then(|| new.shortcut_key.clone()),
        debug: (old.debug != new.debug).then_some(new.debug),
    }
}

pub struct SettingsStore {
    current: RwLock<Settings>,
    /// `None` keeps settings in memory only.
    file: Option<PathBuf>,
    changes: broadcast::Sender<SettingsChanged>,
}

impl SettingsStore {
    pub fn open(file: PathBuf) -> Self {
        let settings = Self::load_file(&file);
        let (changes, _) = broadcast::channel(32);
        Self {
            current: RwLock::new(settings),
            file: Some(file),
            changes,
        }
    }

    pub fn in_memory(settings: Settings) -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            current: RwLock::new(settings),
            file: None,
            changes,
        }
    }

    pub fn default_path() -> PathBuf {
        platform::config_dir().join("settings.toml")
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Receive one `SettingsChanged` per store write that changed something.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChanged> {
        self.changes.subscribe()
    }

    /// Merge `patch` into the stored settings and return what actually changed.
    pub async fn update(&self, patch: SettingsChanged) -> Result<SettingsChanged, SettingsError> {
        let mut current = self.current.write().await;
        let next = sanitize(&current, &patch);
        let changed = diff(&current, &next);
        if changed.is_empty() {
            return Ok(changed);
        }

        if let Some(file) = &self.file {
            save_file(file, &next).await?;
        }
        *current = next;
        debug!("settings updated: {:?}", changed);

        // No subscribers is fine.
        let _ = self.changes.send(changed.clone());
        Ok(changed)
    }

    fn load_file(file: &Path) -> Settings {
        let Ok(content) = std::fs::read_to_string(file) else {
            return Settings::default();
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings file {:?}: {}", file, e);
                Settings::default()
            }
        }
    }
}

async fn save_file(file: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(file, toml::to_string_pretty(settings)?).await?;
    Ok(())
}
