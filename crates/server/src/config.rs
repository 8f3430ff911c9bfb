use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use server_api::SnapshotLocator;

pub const CONFIG_FILE: &str = "server.toml";

/// Upper bound for `max_frame_bytes`; larger or zero values are ignored.
pub const MAX_FRAME_BYTES_LIMIT: usize = 64 * 1024 * 1024;

fn frame_limit(v: usize) -> Option<usize> {
    (1..=MAX_FRAME_BYTES_LIMIT).contains(&v).then_some(v)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub snapshot_dir: Option<PathBuf>,
    pub restore_snapshot: Option<PathBuf>,
    pub max_frame_bytes: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            snapshot_dir: None,
            restore_snapshot: None,
            max_frame_bytes: 1024 * 1024,
            log_level: "info".into(),
        }
    }
}

/// Keys accepted in `server.toml`. Anything missing keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    snapshot_dir: Option<PathBuf>,
    restore_snapshot: Option<PathBuf>,
    max_frame_bytes: Option<usize>,
    log_level: Option<String>,
}

impl Settings {
    pub fn apply_file(&mut self, raw: &str) -> Result<(), toml::de::Error> {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file_cfg.snapshot_dir {
            self.snapshot_dir = Some(v);
        }
        if let Some(v) = file_cfg.restore_snapshot {
            self.restore_snapshot = Some(v);
        }
        if let Some(v) = file_cfg.max_frame_bytes.and_then(frame_limit) {
            self.max_frame_bytes = v;
        }
        if let Some(v) = file_cfg.log_level {
            self.log_level = v;
        }
        Ok(())
    }

    /// Later keys win, so `APP__*` overrides the short forms.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SERVER_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = var("APP__BIND_ADDR") {
            self.bind_addr = v;
        }

        if let Some(v) = var("SNAPSHOT_DIR") {
            self.snapshot_dir = Some(v.into());
        }
        if let Some(v) = var("APP__SNAPSHOT_DIR") {
            self.snapshot_dir = Some(v.into());
        }

        if let Some(v) = var("APP__RESTORE_SNAPSHOT") {
            self.restore_snapshot = Some(v.into());
        }

        if let Some(v) = var("APP__MAX_FRAME_BYTES") {
            if let Some(parsed) = v.trim().parse::<usize>().ok().and_then(frame_limit) {
                self.max_frame_bytes = parsed;
            }
        }

        if let Some(v) = var("APP__LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn snapshot_locator(&self) -> SnapshotLocator {
        match &self.snapshot_dir {
            Some(dir) => SnapshotLocator::within(dir),
            None => SnapshotLocator::anywhere(),
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file if it exists, then the environment.
pub fn load_settings_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => settings
            .apply_file(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    settings.apply_env(lookup);
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
