//! Process-start configuration.
//!
//! Per the "implicit global state → explicit configuration" redesign flag,
//! every install-time path and endpoint is collected into one
//! [`SystemConfig`] built once at startup. No module holds mutable
//! configuration state of its own; everything downstream takes a
//! `&SystemConfig` or an owned clone of the fields it needs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::types::SystemSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Base directory for the settings store and logs. Corresponds to the
    /// source's `RAVENS_PERCH_DIR` install-time path.
    pub data_dir: PathBuf,
    /// CPU score threshold below which the Profile Selector falls back to
    /// software encoding even when a hardware encoder is present (§4.4).
    pub cpu_threshold: u8,
    pub mediamtx: MediaMtxConfig,
    pub moonraker: MoonrakerConfig,
    pub log_level: String,
    pub base_host: String,
    pub reconcile_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub debounce_ms: u64,
    pub call_timeout_secs: u64,
    pub tick_budget_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMtxConfig {
    pub control_base_url: String,
    pub rtsp_port: u16,
    pub hls_port: u16,
    pub webrtc_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoonrakerConfig {
    pub base_url: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/ravens-perch"),
            cpu_threshold: 1,
            mediamtx: MediaMtxConfig {
                control_base_url: "http://127.0.0.1:9997".to_string(),
                rtsp_port: 8554,
                hls_port: 8888,
                webrtc_port: 8889,
            },
            moonraker: MoonrakerConfig {
                base_url: "http://127.0.0.1:7125".to_string(),
            },
            log_level: "info".to_string(),
            base_host: "localhost".to_string(),
            reconcile_interval_secs: 10,
            poll_interval_secs: 2,
            debounce_ms: 500,
            call_timeout_secs: 5,
            tick_budget_secs: 30,
        }
    }
}

impl SystemConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("cameras.db")
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("config file not found at {path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CoreError::BadRequest(format!("failed to read config file: {e}")))?;

        let config: SystemConfig = toml::from_str(&contents)
            .map_err(|e| CoreError::BadRequest(format!("failed to parse config file: {e}")))?;

        log::info!("loaded configuration from {path:?}");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::BadRequest(format!("failed to create config dir: {e}")))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CoreError::BadRequest(format!("failed to serialize config: {e}")))?;

        fs::write(path, toml_string)
            .map_err(|e| CoreError::BadRequest(format!("failed to write config file: {e}")))?;

        Ok(())
    }

    /// The admin-mutable subset of this config, used to seed the Settings
    /// Store's `SystemSettings` row the first time the Reconciler starts
    /// against a fresh store (§3, §6).
    pub fn default_settings(&self) -> SystemSettings {
        SystemSettings {
            cpu_threshold: self.cpu_threshold,
            orchestration_base_url: self.moonraker.base_url.clone(),
            log_level: self.log_level.clone(),
            base_host: self.base_host.clone(),
        }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("/etc/ravens-perch/config.toml")
    }

    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("failed to load config, using defaults: {e}");
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.cpu_threshold) {
            return Err("cpu_threshold must be between 1 and 10".to_string());
        }
        if self.mediamtx.control_base_url.is_empty() {
            return Err("mediamtx.control_base_url must not be empty".to_string());
        }
        if self.moonraker.base_url.is_empty() {
            return Err("moonraker.base_url must not be empty".to_string());
        }
        if self.reconcile_interval_secs == 0 {
            return Err("reconcile_interval_secs must be positive".to_string());
        }
        if self.call_timeout_secs == 0 || self.call_timeout_secs > self.tick_budget_secs {
            return Err("call_timeout_secs must be positive and <= tick_budget_secs".to_string());
        }
        Ok(())
    }
}
