mod handlers;
mod health;
mod logs;
mod settings;
mod state;

use crate::settings::ServerSettings;
use crate::state::AppState;
use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // .env opcional (PROJECT_ROOT, PORT, VINA_PATH, ...)
    let _ = dotenvy::dotenv();

    let settings = ServerSettings::from_env();
    let _log_guard = logs::init_tracing(&settings.logs_dir);

    for dir in [&settings.output_dir, &settings.logs_dir] {
        match std::fs::create_dir_all(dir) {
            Ok(()) => info!("directorio listo: {}", dir.display()),
            Err(e) => warn!("no se pudo crear {}: {}", dir.display(), e),
        }
    }

    info!(
        root = %settings.project_root.display(),
        vina = %settings.runner.vina_path.display(),
        vina_found = settings.runner.vina_path.exists(),
        config = %settings.runner.config_path.display(),
        config_found = settings.runner.config_path.exists(),
        timeout_secs = settings.runner.timeout.as_secs(),
        "configuración del servidor de docking"
    );

    let port = settings.port;
    let state = AppState::new(settings);

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("servidor de docking escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("servidor detenido");
    Ok(())
}

/// Ctrl-C o SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("no se pudo escuchar ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("no se pudo escuchar SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("recibido ctrl-c, apagando..."),
        _ = terminate => info!("recibido SIGTERM, apagando..."),
    }
}
