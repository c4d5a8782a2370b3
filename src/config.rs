use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::Level;

use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "medscan";
const CONFIG_FILE_VAR: &str = "MEDSCAN_CONFIG";
const ENV_PREFIX: &str = "MEDSCAN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub service: ServiceSettings,
    pub capture: CaptureSettings,
    pub workflow: WorkflowSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub identify_path: String,
    pub lookup_path: String,
    pub ask_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub inbox_dir: PathBuf,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// When false, a reset during a request waits for the request to resolve.
    pub abort_in_flight: bool,
    pub intent_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub title: String,
    pub window_width: f32,
    pub window_height: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            service: ServiceSettings::default(),
            capture: CaptureSettings::default(),
            workflow: WorkflowSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
            identify_path: "/api/identificar".to_string(),
            lookup_path: "/api/medicamento".to_string(),
            ask_path: "/api/pregunta".to_string(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("photos"),
            max_dimension: 1600,
            jpeg_quality: 90,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            abort_in_flight: true,
            intent_buffer: 32,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            title: "MedScan - Identify Medicine".to_string(),
            window_width: 480.0,
            window_height: 800.0,
        }
    }
}

impl Settings {
    /// Loads defaults, then the optional config file, then `MEDSCAN__*` overrides.
    pub fn load() -> Result<Self, AppError> {
        let file_name =
            std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings: Settings = Config::builder()
            .add_source(File::with_name(&file_name).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.service.base_url.trim().is_empty() {
            return Err(AppError::InvalidSetting(
                "service.base_url",
                "must not be empty".to_string(),
            ));
        }
        if self.service.timeout_secs == 0 {
            return Err(AppError::InvalidSetting(
                "service.timeout_secs",
                "must be greater than zero".to_string(),
            ));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(AppError::InvalidSetting(
                "capture.jpeg_quality",
                format!("{} is outside 1-100", self.capture.jpeg_quality),
            ));
        }
        if self.workflow.intent_buffer == 0 {
            return Err(AppError::InvalidSetting(
                "workflow.intent_buffer",
                "must be greater than zero".to_string(),
            ));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, AppError> {
        self.log_level
            .parse::<Level>()
            .map_err(|e| AppError::InvalidSetting("log_level", e.to_string()))
    }
}

impl ServiceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
