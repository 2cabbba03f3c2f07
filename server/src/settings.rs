use std::{env, path::PathBuf, time::Duration};

use common::runner::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT, MIN_TIMEOUT};
use common::RunnerConfig;

pub const DEFAULT_PORT: u16 = 3000;

/// Configuración del servidor, armada desde variables de entorno.
/// - En Docker: PROJECT_ROOT=/app
/// - Local: el directorio actual
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub project_root: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub runner: RunnerConfig,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una función de lookup (para tests).
    pub fn from_vars<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_root = get("PROJECT_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut settings = Self::for_root(project_root);

        if let Some(port) = get("PORT").and_then(|s| s.parse::<u16>().ok()) {
            settings.port = port;
        }
        if let Some(path) = get("VINA_PATH") {
            settings.runner.vina_path = PathBuf::from(path);
        }
        if let Some(path) = get("DOCKING_CONFIG") {
            settings.runner.config_path = PathBuf::from(path);
        }
        if let Some(dir) = get("LOG_DIR") {
            settings.logs_dir = PathBuf::from(dir);
        }

        let timeout = get("DOCKING_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        // nunca por debajo del piso: vina tarda
        settings.runner.timeout = timeout.max(MIN_TIMEOUT);

        settings.runner.max_output_bytes = get("DOCKING_MAX_OUTPUT_BYTES")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES);

        settings.runner.synthesize_defaults = get("DOCKING_SYNTHESIZE_DEFAULTS")
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        settings
    }

    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        let runner = RunnerConfig::for_project(project_root);
        Self {
            port: DEFAULT_PORT,
            project_root: runner.project_root.clone(),
            output_dir: runner.output_dir.clone(),
            logs_dir: runner.project_root.join("logs"),
            runner,
        }
    }
}
