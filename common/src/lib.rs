pub mod api;
pub mod config;
pub mod error;
pub mod pdbqt;
pub mod runner;
pub mod scores;

pub use api::{
    DeleteResponse, DirectoryHealth, DockingFailure, DockingResponse, ErrorBody, FileEntry,
    FileList, HealthComponents, HealthInfo, StatusInfo, SystemInfo,
};
pub use config::DockingConfig;
pub use error::{ConfigError, DockingError, DockingErrorKind, RunError};
pub use pdbqt::OutputFileStats;
pub use runner::{DockingOutcome, DockingRunner, RunPhase, RunSummary, RunnerConfig, ToolProbe};
pub use scores::{parse_scores, ResultMode, ScoreReport};
