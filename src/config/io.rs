use std::env::{current_exe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::{ProjectDirs};
use tokio::fs::{File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to desk-panel.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // F:\desk-panel.exe => F:\desk-panel.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to desk-panel.json in an os dependent standard directory, such as %AppData% on
// windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "deskpanel", "desk-panel").map(|dirs| {
        dirs.config_dir().join("desk-panel.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if let Ok(attr) = std::fs::metadata(&path) {
            if attr.is_file() {
                return Ok(path);
            }
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) => Err(ConfigError::CanNotLock { source }),
        }
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Open the config file at `path`, or at the default location when `None`.
    pub fn new_sync(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => get_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory)?;
            }
        }

        // the caller obtains an exclusive lock through `locker()` so that this config file
        // (and the radio) is used by only one instance of this application.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    /// Read the config. An empty file yields the defaults.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read the config, writing the defaults back when the file was empty.
    pub async fn load_or_init(&self) -> Result<Config, ConfigError> {
        let is_empty = self.get_file()?.metadata().await?.len() == 0;
        let config = self.read().await?;

        if is_empty {
            info!("Config file is empty, writing defaults");
            self.save(&config).await?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_file_is_initialized_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("desk-panel.json");

        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();
        let config = config_io.load_or_init().await.unwrap();
        assert_eq!(config, Config::default());

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: Config = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[tokio::test]
    async fn saved_config_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk-panel.json");
        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();

        let mut config = Config::default();
        config.telemetry.simulate = true;
        config.alerts.humidity_min = 25.0;
        config_io.save(&config).await.unwrap();

        assert_eq!(config_io.read().await.unwrap(), config);
    }

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk-panel.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config_io = ConfigIO::new_sync(Some(&path)).unwrap();
        let result = config_io.read().await;
        assert!(matches!(result, Err(ConfigError::JsonError { .. })));
    }

    #[test]
    fn second_lock_on_the_same_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk-panel.json");

        let mut first = ConfigIO::new_sync(Some(&path)).unwrap();
        let mut first_locker = first.locker().unwrap();
        let _guard = first_locker.lock().unwrap();

        let mut second = ConfigIO::new_sync(Some(&path)).unwrap();
        let mut second_locker = second.locker().unwrap();
        assert!(matches!(second_locker.lock(), Err(ConfigError::CanNotLock { .. })));
    }
}
