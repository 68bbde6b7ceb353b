use crate::i18n::Language;
use crate::pagination::DEFAULT_ITEMS_PER_PAGE;
use crate::radio_browser::DEFAULT_MIRRORS;
use crate::storage::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mirrors: Vec<String>,
    pub user_agent: String,
    pub language: Language,
    pub items_per_page: usize,
    pub limit: u32,
    pub top_vote_count: u32,
    pub volume: u8,
    pub load_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS.iter().map(|s| s.to_string()).collect(),
            user_agent: "SoundPulse Radio/1.0".to_string(),
            language: Language::En,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            limit: crate::models::DEFAULT_LIMIT,
            top_vote_count: 5,
            volume: 50,
            load_timeout_secs: 15,
            data_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read config: {path:?}")),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut config: AppConfig =
            toml::from_str(&text).with_context(|| format!("Invalid config TOML: {path:?}"))?;
        config.volume = config.volume.min(100);
        Ok(config)
    }

    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let data = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, data.as_bytes())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::storage::default_data_dir(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config"))
        })
        .context("Could not determine XDG config directory")?;
    Ok(base.join("soundpulse").join("config.toml"))
}
