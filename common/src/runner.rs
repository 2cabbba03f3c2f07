use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::Semaphore,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::config::{DockingConfig, DEFAULT_OUTPUT_FILE};
use crate::error::{DockingError, DockingErrorKind, RunError};
use crate::pdbqt::{OutputFileStats, PLACEHOLDER_LIGAND, PLACEHOLDER_RECEPTOR};
use crate::scores::{self, ResultMode};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Por debajo de esto vina no alcanza a terminar corridas normales.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 20 * 1024 * 1024;
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(windows)]
const VINA_BINARY: &str = "vina.exe";
#[cfg(not(windows))]
const VINA_BINARY: &str = "vina";

/// Todo lo que el runner necesita saber del disco. Se pasa al construirlo,
/// nada se lee de variables globales.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directorio de trabajo del proceso vina
    pub project_root: PathBuf,
    pub vina_path: PathBuf,
    pub config_path: PathBuf,
    /// Donde quedan las estructuras de salida y los logs de cada corrida
    pub output_dir: PathBuf,
    pub timeout: Duration,
    /// Tope por stream (stdout y stderr por separado)
    pub max_output_bytes: usize,
    /// Crear config y estructuras de relleno si faltan
    pub synthesize_defaults: bool,
}

impl RunnerConfig {
    /// Layout convencional: `tools/vina`, `config.txt`, `output/`.
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            vina_path: root.join("tools").join(VINA_BINARY),
            config_path: root.join("config.txt"),
            output_dir: root.join("output"),
            project_root: root,
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            synthesize_defaults: false,
        }
    }

    pub fn command_line(&self) -> String {
        format!(
            "\"{}\" --config \"{}\"",
            self.vina_path.display(),
            self.config_path.display()
        )
    }
}

/// Estado de una invocación. Cada `run()` arranca de cero; no hay reintentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    NotStarted,
    Validating,
    Running,
    Succeeded,
    Failed(DockingErrorKind),
}

/// Resultado de una corrida exitosa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingOutcome {
    pub docking_id: String,
    pub best_score: Option<f64>,
    pub min_score: Option<f64>,
    pub all_scores: Vec<f64>,
    pub modes: Vec<ResultMode>,
    pub duration_secs: f64,
    pub raw_stdout: String,
    pub raw_stderr: String,
    pub output_file: PathBuf,
    pub output_stats: Option<OutputFileStats>,
    pub log_file: Option<PathBuf>,
    pub command: String,
    pub finished_at: DateTime<Utc>,
}

/// Resumen de la última corrida, para /status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub docking_id: String,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub best_score: Option<f64>,
    pub error: Option<String>,
}

/// Qué tan lista está la herramienta, sin lanzar un docking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProbe {
    pub vina_path: PathBuf,
    pub exists: bool,
    pub executable: bool,
    pub version: Option<String>,
    pub config_path: PathBuf,
    pub config_exists: bool,
}

struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Ejecuta vina con la config fija del proceso.
///
/// Config y archivo de salida son únicos por proceso, así que sólo puede haber
/// una corrida en vuelo: una segunda llamada concurrente recibe
/// `DockingError::Busy` sin lanzar nada. Clonarlo es barato y comparte el estado.
#[derive(Clone)]
pub struct DockingRunner {
    shared: Arc<Shared>,
}

struct Shared {
    config: RunnerConfig,
    slot: Arc<Semaphore>,
    phase: Mutex<RunPhase>,
    last_run: Mutex<Option<RunSummary>>,
}

impl DockingRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                slot: Arc::new(Semaphore::new(1)),
                phase: Mutex::new(RunPhase::NotStarted),
                last_run: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> RunPhase {
        *lock(&self.shared.phase)
    }

    pub fn is_running(&self) -> bool {
        self.shared.slot.available_permits() == 0
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        lock(&self.shared.last_run).clone()
    }

    /// Archivo que vina debería escribir según el `out=` de la config.
    pub fn expected_output(&self) -> PathBuf {
        self.shared.expected_output()
    }

    /// Estado de vina y de la config para /health.
    pub async fn probe(&self) -> ToolProbe {
        self.shared.probe().await
    }

    /// Lanza una corrida y espera su resultado.
    ///
    /// La corrida vive en su propia tarea: si quien llama suelta el future
    /// (p. ej. el cliente HTTP se desconecta) vina sigue hasta terminar o
    /// hasta el timeout, y fase y último resumen quedan registrados igual.
    pub async fn run(&self) -> Result<DockingOutcome, RunError> {
        // se toma el permiso antes de cualquier await
        let permit = match self.shared.slot.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                warn!("docking rechazado: ya hay una corrida en vuelo");
                return Err(RunError {
                    docking_id: None,
                    error: DockingError::Busy,
                });
            }
        };

        let docking_id = uuid::Uuid::new_v4().to_string();
        let shared = Arc::clone(&self.shared);
        let job = tokio::spawn({
            let docking_id = docking_id.clone();
            async move {
                let _permit = permit;
                shared.run_job(&docking_id).await
            }
        });

        let result = match job.await {
            Ok(result) => result,
            Err(e) => {
                // la tarea entró en pánico: el permiso ya se liberó al desarmarla
                warn!(docking_id = %docking_id, "la tarea de docking terminó mal: {}", e);
                let error = DockingError::ExecutionFailed {
                    detail: format!("docking task aborted: {}", e),
                    stderr: String::new(),
                    duration_secs: 0.0,
                    timed_out: false,
                };
                self.shared.set_phase(RunPhase::Failed(error.kind()));
                Err(error)
            }
        };

        result.map_err(|error| RunError {
            docking_id: Some(docking_id),
            error,
        })
    }
}

impl Shared {
    fn expected_output(&self) -> PathBuf {
        match DockingConfig::load(&self.config.config_path) {
            Ok(cfg) => cfg.output_path(&self.config.project_root),
            Err(e) => {
                debug!("no se pudo leer out= de la config ({}), usando default", e);
                self.config.project_root.join(DEFAULT_OUTPUT_FILE)
            }
        }
    }

    async fn run_job(&self, docking_id: &str) -> Result<DockingOutcome, DockingError> {
        let started_at = Utc::now();
        let start = Instant::now();

        info!(docking_id, "docking iniciado");

        let result = self.run_inner(docking_id, start).await;

        let duration_secs = start.elapsed().as_secs_f64();
        let phase = match &result {
            Ok(outcome) => {
                info!(
                    docking_id,
                    best_score = ?outcome.best_score,
                    modes = outcome.modes.len(),
                    duration_secs,
                    output = %outcome.output_file.display(),
                    "docking completado"
                );
                RunPhase::Succeeded
            }
            Err(e) => {
                warn!(docking_id, kind = ?e.kind(), duration_secs, "docking falló: {}", e);
                RunPhase::Failed(e.kind())
            }
        };
        self.set_phase(phase);

        *lock(&self.last_run) = Some(RunSummary {
            docking_id: docking_id.to_string(),
            phase,
            started_at,
            finished_at: Utc::now(),
            duration_secs,
            best_score: result.as_ref().ok().and_then(|o| o.best_score),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }

    async fn run_inner(
        &self,
        docking_id: &str,
        start: Instant,
    ) -> Result<DockingOutcome, DockingError> {
        self.set_phase(RunPhase::Validating);
        self.validate()?;

        let output_file = self.expected_output();
        if let Err(e) = fs::create_dir_all(&self.config.output_dir) {
            warn!(
                "no se pudo crear el directorio de salida {}: {}",
                self.config.output_dir.display(),
                e
            );
        }

        // una salida de una corrida anterior no puede pasar por la de esta
        remove_stale_output(&output_file)?;

        self.set_phase(RunPhase::Running);
        let command = self.config.command_line();
        info!(docking_id, command = %command, "ejecutando vina");

        let (status, stdout, stderr) = self.execute(start).await?;
        let duration_secs = start.elapsed().as_secs_f64();

        let raw_stdout = stdout.text();
        let raw_stderr = stderr.text();
        let log_file = self
            .write_run_log(docking_id, duration_secs, &command, &raw_stdout, &raw_stderr)
            .await;

        if stdout.overflowed || stderr.overflowed {
            return Err(DockingError::ExecutionFailed {
                detail: format!(
                    "vina output exceeded the {} byte buffer",
                    self.config.max_output_bytes
                ),
                stderr: raw_stderr,
                duration_secs,
                timed_out: false,
            });
        }

        if !status.success() {
            return Err(DockingError::ExecutionFailed {
                detail: format!("vina exited with {}", status),
                stderr: raw_stderr,
                duration_secs,
                timed_out: false,
            });
        }

        // vina a veces termina con 0 sin escribir la salida
        if !output_file.exists() {
            return Err(DockingError::OutputFileMissing {
                path: output_file,
                duration_secs,
            });
        }

        let report = scores::parse_scores(&raw_stdout);
        if report.best_score.is_none() {
            warn!(docking_id, "vina no imprimió ninguna fila de score");
        } else if !report.best_is_minimum() {
            warn!(
                docking_id,
                first = ?report.best_score,
                min = ?report.min_score,
                "la primera fila no es el mejor score"
            );
        }

        let output_stats = match OutputFileStats::read(&output_file) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("no se pudo leer {}: {}", output_file.display(), e);
                None
            }
        };

        Ok(DockingOutcome {
            docking_id: docking_id.to_string(),
            best_score: report.best_score,
            min_score: report.min_score,
            all_scores: report.all_scores,
            modes: report.modes,
            duration_secs,
            raw_stdout,
            raw_stderr,
            output_file,
            output_stats,
            log_file,
            command,
            finished_at: Utc::now(),
        })
    }

    /// Chequeos previos, en orden: ejecutable, permisos, config.
    fn validate(&self) -> Result<(), DockingError> {
        let vina = &self.config.vina_path;
        if !vina.exists() {
            return Err(DockingError::ExecutableNotFound { path: vina.clone() });
        }

        ensure_executable(vina)?;

        let config_path = &self.config.config_path;
        if !config_path.exists() {
            if !self.config.synthesize_defaults {
                return Err(DockingError::ConfigMissing {
                    path: config_path.clone(),
                });
            }
            if let Err(e) = self.synthesize_inputs() {
                warn!("no se pudieron crear los archivos por defecto: {}", e);
                return Err(DockingError::ConfigMissing {
                    path: config_path.clone(),
                });
            }
        }

        Ok(())
    }

    /// Config por defecto + receptor/ligando de relleno. Nunca pisa un
    /// archivo que ya tenga contenido.
    fn synthesize_inputs(&self) -> io::Result<()> {
        let root = &self.config.project_root;
        let receptor = PathBuf::from("files").join("receptor.pdbqt");
        let ligand = PathBuf::from("files").join("ligand.pdbqt");

        write_if_empty(&root.join(&receptor), PLACEHOLDER_RECEPTOR)?;
        write_if_empty(&root.join(&ligand), PLACEHOLDER_LIGAND)?;

        let cfg = DockingConfig::with_defaults(receptor, ligand);
        write_if_empty(&self.config.config_path, &cfg.to_config_text())?;
        Ok(())
    }

    async fn execute(
        &self,
        start: Instant,
    ) -> Result<(std::process::ExitStatus, Captured, Captured), DockingError> {
        let cfg = &self.config;

        let mut child = Command::new(&cfg.vina_path)
            .arg("--config")
            .arg(&cfg.config_path)
            .current_dir(&cfg.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DockingError::ExecutionFailed {
                detail: format!("failed to spawn vina: {}", e),
                stderr: String::new(),
                duration_secs: start.elapsed().as_secs_f64(),
                timed_out: false,
            })?;

        info!(pid = ?child.id(), "proceso vina lanzado");

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let max = cfg.max_output_bytes;

        let finished = timeout(cfg.timeout, async {
            tokio::join!(
                child.wait(),
                read_capped(stdout_pipe, max),
                read_capped(stderr_pipe, max),
            )
        })
        .await;

        match finished {
            Ok((Ok(status), Ok(stdout), Ok(stderr))) => {
                info!(code = ?status.code(), "proceso vina terminó");
                Ok((status, stdout, stderr))
            }
            Ok((status, stdout, stderr)) => {
                let err = status
                    .err()
                    .or_else(|| stdout.err())
                    .or_else(|| stderr.err())
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                kill_and_reap(&mut child).await;
                Err(DockingError::ExecutionFailed {
                    detail: format!("failed to collect vina output: {}", err),
                    stderr: String::new(),
                    duration_secs: start.elapsed().as_secs_f64(),
                    timed_out: false,
                })
            }
            Err(_) => {
                warn!(
                    timeout_secs = cfg.timeout.as_secs_f64(),
                    "vina superó el timeout, matando el proceso"
                );
                kill_and_reap(&mut child).await;
                Err(DockingError::ExecutionFailed {
                    detail: format!(
                        "vina timed out after {}s and was terminated",
                        cfg.timeout.as_secs_f64()
                    ),
                    stderr: String::new(),
                    duration_secs: start.elapsed().as_secs_f64(),
                    timed_out: true,
                })
            }
        }
    }

    /// Guarda stdout/stderr de la corrida. Un fallo acá sólo se loguea.
    async fn write_run_log(
        &self,
        docking_id: &str,
        duration_secs: f64,
        command: &str,
        stdout: &str,
        stderr: &str,
    ) -> Option<PathBuf> {
        let path = self
            .config
            .output_dir
            .join(format!("docking_{}.log", docking_id));
        let content = format!(
            "Docking ID: {}\nTimestamp: {}\nDuration: {:.2}s\nCommand: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}\n",
            docking_id,
            Utc::now().to_rfc3339(),
            duration_secs,
            command,
            stdout,
            stderr
        );

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                debug!("log de docking guardado en {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("no se pudo escribir el log {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Si vina es ejecutable pide `--help` para sacar la versión (primera línea).
    async fn probe(&self) -> ToolProbe {
        let vina = &self.config.vina_path;
        let exists = vina.exists();
        let executable = exists && is_executable(vina);

        let version = if executable {
            let out = timeout(
                VERSION_PROBE_TIMEOUT,
                Command::new(vina)
                    .arg("--help")
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output(),
            )
            .await;
            match out {
                Ok(Ok(out)) => String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string),
                _ => None,
            }
        } else {
            None
        };

        ToolProbe {
            vina_path: vina.clone(),
            exists,
            executable,
            version,
            config_path: self.config.config_path.clone(),
            config_exists: self.config.config_path.exists(),
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        debug!(?phase, "fase del runner");
        *lock(&self.phase) = phase;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_stale_output(path: &Path) -> Result<(), DockingError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("salida anterior borrada: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DockingError::ExecutionFailed {
            detail: format!("cannot remove previous output {}: {}", path.display(), e),
            stderr: String::new(),
            duration_secs: 0.0,
            timed_out: false,
        }),
    }
}

async fn kill_and_reap(child: &mut tokio::process::Child) {
    // kill() manda la señal y espera la salida: no quedan procesos huérfanos
    if let Err(e) = child.kill().await {
        warn!("no se pudo matar el proceso vina: {}", e);
    }
}

/// Lee un pipe completo pero retiene como mucho `max` bytes; el resto se
/// descarta para no bloquear al proceso hijo.
async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, max: usize) -> io::Result<Captured> {
    let mut captured = Captured {
        bytes: Vec::new(),
        overflowed: false,
    };
    let Some(mut pipe) = pipe else {
        return Ok(captured);
    };

    let mut buf = [0u8; 8192];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = max.saturating_sub(captured.bytes.len());
        if n > room {
            captured.overflowed = true;
        }
        captured.bytes.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(captured)
}

fn write_if_empty(path: &Path, contents: &str) -> io::Result<bool> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > 0 {
            info!("{} ya existe, no se sobreescribe", path.display());
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    info!("creado {} con contenido por defecto", path.display());
    Ok(true)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Si no tiene bit de ejecución se intenta un único chmod 755.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<(), DockingError> {
    use std::os::unix::fs::PermissionsExt;

    if is_executable(path) {
        return Ok(());
    }

    warn!("{} no es ejecutable, aplicando chmod 755", path.display());
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
        DockingError::PermissionDenied {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<(), DockingError> {
    Ok(())
}
