use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Favorites,
    DislikedStations,
    RegisteredUser,
    ActiveUser,
    LastPlayedStation,
    LastServer,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Favorites => "favorites",
            StorageKey::DislikedStations => "dislikedStations",
            StorageKey::RegisteredUser => "registeredUser",
            StorageKey::ActiveUser => "activeUser",
            StorageKey::LastPlayedStation => "lastPlayedStation",
            StorageKey::LastServer => "lastServer",
        }
    }
}

/// JSON blobs under fixed keys, one file per key.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_private_dir(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: StorageKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    pub fn load<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>> {
        let path = self.path(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
        };
        let value = serde_json::from_slice(&bytes).with_context(|| format!("Invalid JSON in {path:?}"))?;
        Ok(Some(value))
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)
            .with_context(|| format!("Failed to serialize {}", key.as_str()))?;
        write_atomic(&self.path(key), &data)
    }

    pub fn remove(&self, key: StorageKey) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {path:?}")),
        }
    }
}

/// Writes through a randomly named sibling temp file so readers never see a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().context("Path has no parent")?;
    ensure_private_dir(parent)?;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let tmp = parent.join(format!(
        ".{}.tmp.{suffix}",
        path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("data")
    ));

    {
        let mut file = fs::File::create(&tmp).with_context(|| format!("Create temp file: {tmp:?}"))?;
        file.write_all(data)
            .with_context(|| format!("Write temp file: {tmp:?}"))?;
        file.sync_all()
            .with_context(|| format!("Sync temp file: {tmp:?}"))?;
    }

    fs::rename(&tmp, path).with_context(|| format!("Atomic rename to: {path:?}"))?;

    let dir_file = fs::File::open(parent).with_context(|| format!("Open dir: {parent:?}"))?;
    let _ = dir_file.sync_all();

    Ok(())
}

pub fn ensure_private_dir(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).with_context(|| format!("Create dir: {path:?}"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Set permissions on dir: {path:?}"))?;
    }
    Ok(())
}

pub fn default_data_dir() -> Result<PathBuf> {
    let base = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
        })
        .context("Could not determine XDG data directory")?;
    Ok(base.join("soundpulse"))
}
