use std::{path::Path, time::Instant};

use common::{DirectoryHealth, SystemInfo};
use sysinfo::{System, SystemExt};

/// Plataforma, host y memoria del equipo donde corre el servidor.
pub fn system_info(started_at: Instant) -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_memory();

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    SystemInfo {
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname,
        uptime_secs: started_at.elapsed().as_secs(),
        total_memory_bytes: sys.total_memory(),
        used_memory_bytes: sys.used_memory(),
    }
}

/// Escribe y borra un archivo de prueba para saber si el directorio es usable.
pub async fn dir_writable(dir: &Path) -> bool {
    let probe = dir.join(format!(
        ".write-test-{}",
        chrono::Utc::now().timestamp_millis()
    ));
    if tokio::fs::write(&probe, b"test").await.is_err() {
        return false;
    }
    tokio::fs::remove_file(&probe).await.is_ok()
}

pub async fn directory_health(dir: &Path) -> DirectoryHealth {
    DirectoryHealth {
        path: dir.display().to_string(),
        writable: dir_writable(dir).await,
    }
}
