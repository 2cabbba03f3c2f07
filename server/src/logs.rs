use std::{fs, path::Path};

use chrono::Utc;
use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "server.log";
const DEFAULT_FILTER: &str = "server=debug,common=debug,tower_http=info,axum=info";

/// Consola legible + archivo JSON diario en `logs_dir`.
/// El guard hay que mantenerlo vivo mientras corra el servidor.
pub fn init_tracing(logs_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    );
    let json_file = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(json_file)
        .init();

    guard
}

/// Últimas `count` entradas del log JSON de hoy. Errores de lectura se ignoran.
pub fn recent_logs(logs_dir: &Path, count: usize) -> Vec<Value> {
    let today = Utc::now().format("%Y-%m-%d");
    let path = logs_dir.join(format!("{}.{}", LOG_FILE_PREFIX, today));

    let Ok(content) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    let entries: Vec<Value> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();

    let skip = entries.len().saturating_sub(count);
    entries.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("server_logs_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn recent_logs_devuelve_las_ultimas_entradas() {
        let dir = temp_dir("recent");
        let today = Utc::now().format("%Y-%m-%d");
        let mut content = String::new();
        for i in 0..15 {
            content.push_str(&format!("{{\"level\":\"INFO\",\"n\":{}}}\n", i));
        }
        content.push_str("esto no es json\n");
        fs::write(dir.join(format!("server.log.{}", today)), content).unwrap();

        let logs = recent_logs(&dir, 10);

        assert_eq!(logs.len(), 10);
        assert_eq!(logs[0]["n"], 5);
        assert_eq!(logs[9]["n"], 14);
    }

    #[test]
    fn recent_logs_sin_archivo_es_vacio() {
        let dir = temp_dir("vacio");
        assert!(recent_logs(&dir, 10).is_empty());
    }
}
