use axum::{
    extract::{Path, Request, State},
    http::{
        header::{self, HeaderName, HeaderValue},
        HeaderMap, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use common::{
    DeleteResponse, DockingError, DockingFailure, DockingResponse, ErrorBody, FileEntry, FileList,
    HealthComponents, HealthInfo, StatusInfo,
};
use glob::glob;
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use tower::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeFile,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::health::{dir_writable, directory_health, system_info};
use crate::logs::recent_logs;
use crate::state::AppState;

const RECENT_LOG_ENTRIES: usize = 10;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/run-docking", post(run_docking))
        .route("/files", get(list_files))
        .route("/files/:filename", delete(delete_file))
        .route("/output/:filename", get(serve_output))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(Duration::from_secs(86400))
}

/// `protocolo://host` tal como lo vio el cliente (respeta x-forwarded-proto).
fn base_url(headers: &HeaderMap, port: u16) -> String {
    let proto = match headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
    {
        Some("https") => "https",
        _ => "http",
    };
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", port));
    format!("{}://{}", proto, host)
}

/// Sólo el nombre del archivo: nada de `../` ni dotfiles.
fn safe_file_name(raw: &str) -> Option<String> {
    let name = std::path::Path::new(raw).file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}

/* ---------------- handlers HTTP ---------------- */

async fn run_docking(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let base = base_url(&headers, state.settings.port);
    info!("pedido de docking recibido");

    match state.runner.run().await {
        Ok(outcome) => Json(DockingResponse::from_outcome(
            &outcome,
            &base,
            &state.runner.config().output_dir,
        ))
        .into_response(),
        Err(err) => {
            let code = match err.error {
                DockingError::Busy => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let failure = DockingFailure::from_error(&err.error, err.docking_id);
            (code, Json(failure)).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthInfo> {
    let settings = &state.settings;
    let vina = state.runner.probe().await;

    let endpoints: BTreeMap<String, String> = [
        ("docking", "/run-docking"),
        ("files", "/files"),
        ("output", "/output/:filename"),
        ("status", "/status"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Json(HealthInfo {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        system: system_info(state.started_at),
        components: HealthComponents {
            vina,
            output: directory_health(&settings.output_dir).await,
            logs: directory_health(&settings.logs_dir).await,
        },
        endpoints,
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusInfo> {
    let settings = &state.settings;
    let probe = state.runner.probe().await;

    Json(StatusInfo {
        status: "operational".to_string(),
        server_time: Utc::now(),
        vina_ready: probe.executable,
        config_exists: probe.config_exists,
        output_writable: dir_writable(&settings.output_dir).await,
        logs_writable: dir_writable(&settings.logs_dir).await,
        runner_phase: state.runner.phase(),
        docking_in_progress: state.runner.is_running(),
        last_run: state.runner.last_run(),
        recent_logs: recent_logs(&settings.logs_dir, RECENT_LOG_ENTRIES),
    })
}

// Lista las estructuras (.pdbqt / .pdb) del directorio de salida
async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FileList>, (StatusCode, Json<ErrorBody>)> {
    let dir = &state.settings.output_dir;
    let base = base_url(&headers, state.settings.port);
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());

    let mut paths: Vec<PathBuf> = Vec::new();
    for ext in ["pdbqt", "pdb"] {
        let pattern = format!("{}/*.{}", escaped, ext);
        let entries = glob(&pattern).map_err(|e| {
            warn!("patrón inválido {}: {}", pattern, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("Failed to list files")),
            )
        })?;
        paths.extend(entries.flatten().filter(|p| p.is_file()));
    }

    let mut files = Vec::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        let file_type = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        files.push(FileEntry {
            name: name.to_string(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            file_type,
            url: format!("{}/output/{}", base, name),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(FileList {
        success: true,
        count: files.len(),
        files,
        directory: dir.display().to_string(),
    }))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, (StatusCode, Json<ErrorBody>)> {
    let name = safe_file_name(&filename).ok_or((
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new("Invalid file name")),
    ))?;
    let path = state.settings.output_dir.join(&name);

    if !path.is_file() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("File not found")),
        ));
    }

    // vina está escribiendo justo ese archivo
    if state.runner.is_running() && state.runner.expected_output() == path {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorBody::new("File is being written by a running docking job")),
        ));
    }

    tokio::fs::remove_file(&path).await.map_err(|e| {
        warn!("no se pudo borrar {}: {}", path.display(), e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new("Failed to delete file")),
        )
    })?;

    info!("archivo borrado: {}", name);
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("File {} deleted successfully", name),
    }))
}

// Sirve un archivo del directorio de salida, sin cache y con el tipo químico correcto
async fn serve_output(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    req: Request,
) -> Response {
    let Some(name) = safe_file_name(&filename) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = state.settings.output_dir.join(&name);

    let mut res = match ServeFile::new(&path).oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(never) => match never {},
    };

    let headers = res.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    if res.status().is_success() {
        let content_type = if name.ends_with(".pdbqt") {
            Some("chemical/x-pdbqt; charset=utf-8")
        } else if name.ends_with(".pdb") {
            Some("chemical/x-pdb; charset=utf-8")
        } else {
            None
        };
        if let Some(ct) = content_type {
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ServerSettings;
    use axum::body::Body;
    use std::fs;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("server_handlers_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("output")).unwrap();
        fs::create_dir_all(base.join("logs")).unwrap();
        base
    }

    fn app_for(root: &std::path::Path) -> (AppState, Router) {
        let mut settings = ServerSettings::for_root(root);
        settings.runner.timeout = Duration::from_secs(20);
        let state = AppState::new(settings);
        (state.clone(), build_router(state))
    }

    fn request(method: Method, uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "docking.test:3000")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: Router, req: axum::http::Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(app: Router, req: axum::http::Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = send(app, req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[cfg(unix)]
    fn install_fake_vina(root: &std::path::Path, pre: &str) {
        use std::os::unix::fs::PermissionsExt;

        let tools = root.join("tools");
        fs::create_dir_all(&tools).unwrap();
        let script = format!(
            "#!/bin/sh\n{}\n\
             printf 'MODEL 1\\nATOM      1  C1  LIG L   1       0.000   0.000   0.000  1.00  0.00     0.042 C\\nENDMDL\\n' > output/output_docked.pdbqt\n\
             printf 'mode | affinity\\n-----+------\\n1   -7.5   0.000   0.000\\n2   -6.9   1.987   3.451\\n'\n",
            pre
        );
        let vina = tools.join("vina");
        fs::write(&vina, script).unwrap();
        fs::set_permissions(&vina, fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = common::DockingConfig::with_defaults("files/receptor.pdbqt", "files/ligand.pdbqt");
        fs::write(root.join("config.txt"), cfg.to_config_text()).unwrap();
    }

    #[tokio::test]
    async fn health_reporta_componentes() {
        let root = temp_dir("health");
        let (_state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::GET, "/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["vina"]["exists"], false);
        assert_eq!(json["components"]["output"]["writable"], true);
        assert_eq!(json["endpoints"]["docking"], "/run-docking");
    }

    #[tokio::test]
    async fn run_docking_sin_vina_es_error_de_validacion() {
        let root = temp_dir("sin_vina");
        let (_state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::POST, "/run-docking")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "System validation failed");
        assert_eq!(json["kind"], "EXECUTABLE_NOT_FOUND");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_docking_exitoso_devuelve_scores_y_urls() {
        let root = temp_dir("ok");
        install_fake_vina(&root, "");
        let (state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::POST, "/run-docking")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["bestScore"], -7.5);
        assert_eq!(json["bestScoreFormatted"], "-7.5 kcal/mol");
        assert_eq!(json["allScores"], serde_json::json!([-7.5, -6.9]));
        assert_eq!(
            json["downloadUrl"],
            "http://docking.test:3000/output/output_docked.pdbqt"
        );
        assert!(json["duration"].as_str().unwrap().ends_with('s'));
        assert_eq!(
            state.runner.phase(),
            common::RunPhase::Succeeded
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn segundo_docking_mientras_corre_el_primero_da_conflicto() {
        let root = temp_dir("busy");
        install_fake_vina(&root, "sleep 2");
        let (_state, app) = app_for(&root);

        let first = tokio::spawn(send_json(app.clone(), request(Method::POST, "/run-docking")));
        tokio::time::sleep(Duration::from_millis(500)).await;

        let (status, json) = send_json(app, request(Method::POST, "/run-docking")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["kind"], "BUSY");

        let (status, _) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fallo_de_ejecucion_devuelve_el_id_de_la_corrida() {
        let root = temp_dir("exit_error");
        install_fake_vina(&root, "echo 'ERROR: receptor roto' >&2\nexit 1");
        let (state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::POST, "/run-docking")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["kind"], "EXECUTION_FAILED");
        assert_eq!(json["details"].as_str().unwrap().trim(), "ERROR: receptor roto");
        let last = state.runner.last_run().unwrap();
        assert_eq!(json["dockingId"], last.docking_id.as_str());
    }

    #[tokio::test]
    async fn files_lista_solo_estructuras() {
        let root = temp_dir("files");
        fs::write(root.join("output/output_docked.pdbqt"), "MODEL 1\n").unwrap();
        fs::write(root.join("output/receptor.pdb"), "ATOM\n").unwrap();
        fs::write(root.join("output/docking_x.log"), "log").unwrap();
        let (_state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::GET, "/files")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["files"][0]["name"], "output_docked.pdbqt");
        assert_eq!(json["files"][0]["type"], ".pdbqt");
        assert_eq!(json["files"][0]["size"], 8);
        assert_eq!(
            json["files"][1]["url"],
            "http://docking.test:3000/output/receptor.pdb"
        );
    }

    #[tokio::test]
    async fn delete_borra_y_404_si_no_existe() {
        let root = temp_dir("delete");
        let target = root.join("output/viejo.pdbqt");
        fs::write(&target, "MODEL 1\n").unwrap();
        let (_state, app) = app_for(&root);

        let (status, json) =
            send_json(app.clone(), request(Method::DELETE, "/files/viejo.pdbqt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert!(!target.exists());

        let (status, json) = send_json(app, request(Method::DELETE, "/files/viejo.pdbqt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "File not found");
    }

    #[tokio::test]
    async fn output_sirve_pdbqt_sin_cache() {
        let root = temp_dir("output");
        fs::write(root.join("output/output_docked.pdbqt"), "MODEL 1\nENDMDL\n").unwrap();
        fs::write(root.join("output/.secreto"), "x").unwrap();
        let (_state, app) = app_for(&root);

        let (status, headers, body) = send(
            app.clone(),
            request(Method::GET, "/output/output_docked.pdbqt"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"MODEL 1\nENDMDL\n");
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "chemical/x-pdbqt; charset=utf-8"
        );
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let (status, _, _) = send(app.clone(), request(Method::GET, "/output/.secreto")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(app, request(Method::GET, "/output/no_existe.pdbqt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_muestra_fase_del_runner() {
        let root = temp_dir("status");
        let (_state, app) = app_for(&root);

        let (status, json) = send_json(app, request(Method::GET, "/status")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "operational");
        assert_eq!(json["runnerPhase"]["phase"], "NOT_STARTED");
        assert_eq!(json["dockingInProgress"], false);
        assert!(json["lastRun"].is_null());
    }

    #[test]
    fn base_url_respeta_forwarded_proto() {
        let mut headers = HeaderMap::new();
        assert_eq!(base_url(&headers, 3000), "http://localhost:3000");

        headers.insert(header::HOST, HeaderValue::from_static("docking.example.org"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(base_url(&headers, 3000), "https://docking.example.org");
    }

    #[test]
    fn safe_file_name_descarta_rutas_y_dotfiles() {
        assert_eq!(safe_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(safe_file_name("out.pdbqt").as_deref(), Some("out.pdbqt"));
        assert_eq!(safe_file_name(".env"), None);
        assert_eq!(safe_file_name(".."), None);
    }
}
