use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DockingError, DockingErrorKind};
use crate::pdbqt::OutputFileStats;
use crate::runner::{DockingOutcome, RunPhase, RunSummary, ToolProbe};
use crate::scores::{format_score, ResultMode};

/* --------- POST /run-docking --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingResponse {
    pub success: bool,
    pub message: String,
    pub docking_id: String,
    pub best_score: Option<f64>,
    /// `"-7.5 kcal/mol"` o `"N/A"`
    pub best_score_formatted: String,
    pub all_scores: Vec<f64>,
    pub modes: Vec<ResultMode>,
    pub file_stats: Option<OutputFileStats>,
    /// `None` si `out=` apunta fuera del directorio de salida
    pub download_url: Option<String>,
    pub log_url: Option<String>,
    /// Segundos con dos decimales y sufijo, ej: `"12.34s"`
    pub duration: String,
    pub timestamp: DateTime<Utc>,
}

impl DockingResponse {
    /// `base_url` es `protocolo://host` tal como lo vio el cliente. Sólo se
    /// arman URLs para archivos que `/output` puede servir, es decir los que
    /// están directamente en `output_dir`.
    pub fn from_outcome(outcome: &DockingOutcome, base_url: &str, output_dir: &Path) -> Self {
        let file_url = |path: &Path| {
            if path.parent() != Some(output_dir) {
                return None;
            }
            path.file_name()
                .map(|name| format!("{}/output/{}", base_url, name.to_string_lossy()))
        };

        Self {
            success: true,
            message: "Docking simulation completed successfully!".to_string(),
            docking_id: outcome.docking_id.clone(),
            best_score: outcome.best_score,
            best_score_formatted: format_score(outcome.best_score),
            all_scores: outcome.all_scores.clone(),
            modes: outcome.modes.clone(),
            file_stats: outcome.output_stats.clone(),
            download_url: file_url(&outcome.output_file),
            log_url: outcome.log_file.as_deref().and_then(file_url),
            duration: format_duration(outcome.duration_secs),
            timestamp: outcome.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingFailure {
    pub success: bool,
    pub error: String,
    pub kind: DockingErrorKind,
    pub details: String,
    pub docking_id: Option<String>,
    pub duration: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DockingFailure {
    pub fn from_error(err: &DockingError, docking_id: Option<String>) -> Self {
        let error = match err {
            DockingError::Busy => "Docking already in progress",
            e if e.is_validation() => "System validation failed",
            _ => "Docking simulation failed",
        };

        Self {
            success: false,
            error: error.to_string(),
            kind: err.kind(),
            details: err.details(),
            docking_id,
            duration: err.duration_secs().map(format_duration),
            timestamp: Utc::now(),
        }
    }
}

pub fn format_duration(secs: f64) -> String {
    format!("{:.2}s", secs)
}

/* --------- GET /health --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryHealth {
    pub path: String,
    pub writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub platform: String,
    pub arch: String,
    pub hostname: String,
    pub uptime_secs: u64,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthComponents {
    pub vina: ToolProbe,
    pub output: DirectoryHealth,
    pub logs: DirectoryHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub system: SystemInfo,
    pub components: HealthComponents,
    /// nombre → ruta
    pub endpoints: BTreeMap<String, String>,
}

/* --------- GET /files, DELETE /files/:name --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Extensión con punto, ej: `.pdbqt`
    #[serde(rename = "type")]
    pub file_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileList {
    pub success: bool,
    pub files: Vec<FileEntry>,
    pub count: usize,
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/* --------- GET /status --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub status: String,
    pub server_time: DateTime<Utc>,
    pub vina_ready: bool,
    pub config_exists: bool,
    pub output_writable: bool,
    pub logs_writable: bool,
    pub runner_phase: RunPhase,
    pub docking_in_progress: bool,
    pub last_run: Option<RunSummary>,
    /// Últimas líneas del log JSON del día
    pub recent_logs: Vec<Value>,
}
