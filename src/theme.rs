//! Persisted light/dark preference.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Storage key holding `"light"` or `"dark"`
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(ThemePreference::Light),
            "dark" => Some(ThemePreference::Dark),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Light,
        }
    }
}

/// Opaque string key-value persistence
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-process store, nothing survives a restart
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, rewritten on every `set`
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    /// `<config_dir>/fitbot/prefs.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("fitbot").join("prefs.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ChatError::Io(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Reads and writes the theme preference through a [`KeyValueStore`]
pub struct ThemeStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ThemeStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored preference, `Light` when nothing valid is stored
    pub fn get(&self) -> ThemePreference {
        self.store
            .get(THEME_KEY)
            .and_then(|v| ThemePreference::from_str(&v))
            .unwrap_or_default()
    }

    pub fn set(&mut self, pref: ThemePreference) -> Result<()> {
        tracing::debug!(theme = pref.as_str(), "persisting theme");
        self.store.set(THEME_KEY, pref.as_str())
    }

    /// Persist and return the opposite of the current preference
    pub fn toggle(&mut self) -> Result<ThemePreference> {
        let next = self.get().opposite();
        self.set(next)?;
        Ok(next)
    }
}
