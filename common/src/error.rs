use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallos de una corrida de docking. Todos son terminales: el runner no reintenta.
#[derive(Debug, Error)]
pub enum DockingError {
    #[error("vina executable not found at: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("vina is not executable and cannot fix permissions ({}): {reason}", path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    #[error("config file not found at: {}", path.display())]
    ConfigMissing { path: PathBuf },

    #[error("vina execution failed after {duration_secs:.2}s: {detail}")]
    ExecutionFailed {
        detail: String,
        stderr: String,
        duration_secs: f64,
        timed_out: bool,
    },

    #[error("docking completed but output file was not created: {}", path.display())]
    OutputFileMissing { path: PathBuf, duration_secs: f64 },

    #[error("another docking run is already in progress")]
    Busy,
}

/// Etiqueta estable de cada variante, para el JSON de respuesta y el estado del runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DockingErrorKind {
    ExecutableNotFound,
    PermissionDenied,
    ConfigMissing,
    ExecutionFailed,
    OutputFileMissing,
    Busy,
}

impl DockingError {
    pub fn kind(&self) -> DockingErrorKind {
        match self {
            DockingError::ExecutableNotFound { .. } => DockingErrorKind::ExecutableNotFound,
            DockingError::PermissionDenied { .. } => DockingErrorKind::PermissionDenied,
            DockingError::ConfigMissing { .. } => DockingErrorKind::ConfigMissing,
            DockingError::ExecutionFailed { .. } => DockingErrorKind::ExecutionFailed,
            DockingError::OutputFileMissing { .. } => DockingErrorKind::OutputFileMissing,
            DockingError::Busy => DockingErrorKind::Busy,
        }
    }

    /// Falló antes de lanzar el proceso (la herramienta no pudo correr).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DockingError::ExecutableNotFound { .. }
                | DockingError::PermissionDenied { .. }
                | DockingError::ConfigMissing { .. }
        )
    }

    /// Detalle para el cliente: stderr capturado si lo hay, si no el mensaje.
    pub fn details(&self) -> String {
        match self {
            DockingError::ExecutionFailed { stderr, detail, .. } if stderr.trim().is_empty() => {
                detail.clone()
            }
            DockingError::ExecutionFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match self {
            DockingError::ExecutionFailed { duration_secs, .. }
            | DockingError::OutputFileMissing { duration_secs, .. } => Some(*duration_secs),
            _ => None,
        }
    }
}

/// Error de `DockingRunner::run` con el id de la corrida que lo produjo.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    /// `None` cuando la corrida fue rechazada antes de arrancar
    pub docking_id: Option<String>,
    #[source]
    pub error: DockingError,
}

impl RunError {
    pub fn kind(&self) -> DockingErrorKind {
        self.error.kind()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected `key = value`")]
    MalformedLine { line: usize },

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid value for `{key}`: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_prefiere_stderr_y_cae_al_mensaje() {
        let con_stderr = DockingError::ExecutionFailed {
            detail: "exit status: 1".into(),
            stderr: "ERROR: could not open receptor".into(),
            duration_secs: 0.5,
            timed_out: false,
        };
        assert_eq!(con_stderr.details(), "ERROR: could not open receptor");

        let sin_stderr = DockingError::ExecutionFailed {
            detail: "exit status: 1".into(),
            stderr: "  \n".into(),
            duration_secs: 0.5,
            timed_out: false,
        };
        assert_eq!(sin_stderr.details(), "exit status: 1");
    }

    #[test]
    fn kind_se_serializa_en_mayusculas() {
        let err = DockingError::OutputFileMissing {
            path: PathBuf::from("output/output_docked.pdbqt"),
            duration_secs: 1.0,
        };
        assert_eq!(
            serde_json::to_value(err.kind()).unwrap(),
            serde_json::json!("OUTPUT_FILE_MISSING")
        );
        assert!(!err.is_validation());
        assert!(DockingError::ConfigMissing { path: PathBuf::new() }.is_validation());
    }
}
