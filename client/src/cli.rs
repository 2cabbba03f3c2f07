use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{
    scores::format_score, DeleteResponse, DockingFailure, DockingResponse, DockingRunner,
    FileList, HealthInfo, RunnerConfig, StatusInfo,
};
use reqwest::Client;
use std::{env, path::PathBuf, time::Duration};

/// - En Docker: DOCKING_SERVER_URL=http://docking:3000
/// - Local: default http://localhost:3000
fn server_base_url() -> String {
    env::var("DOCKING_SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el servidor de docking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lanza un docking en el servidor (usa la config fija del servidor)
    Run,
    /// Estado de vina, config y directorios
    Health,
    /// Estado del runner y últimas líneas de log
    Status,
    /// Lista las estructuras de salida
    Files,
    /// Borra un archivo del directorio de salida
    Delete {
        #[arg(value_name = "ARCHIVO")]
        name: String,
    },
    /// Corre vina localmente, sin servidor
    Local {
        /// Raíz del proyecto (tools/vina, config.txt, output/)
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Timeout en segundos
        #[arg(long, default_value_t = 300)]
        timeout: u64,

        /// Crear config y estructuras de relleno si faltan
        #[arg(long)]
        defaults: bool,
    },
}

fn print_success(resp: &DockingResponse) {
    println!("{}", resp.message);
    println!("  docking_id : {}", resp.docking_id);
    println!("  best score : {}", resp.best_score_formatted);
    println!("  duración   : {}", resp.duration);
    if resp.modes.is_empty() {
        println!("  modos      : (sin filas de score)");
    } else {
        println!("  modos:");
        for m in &resp.modes {
            println!(
                "    {:>2}  {:>8.3}  rmsd l.b.={}  u.b.={}",
                m.mode,
                m.score,
                m.rmsd_lb.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into()),
                m.rmsd_ub.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into()),
            );
        }
    }
    match resp.download_url {
        Some(ref url) => println!("  descarga   : {}", url),
        None => println!("  descarga   : (fuera del directorio de salida)"),
    }
    if let Some(ref log) = resp.log_url {
        println!("  log        : {}", log);
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::Run => {
            let url = format!("{}/run-docking", base_url);
            let resp = client.post(&url).send().await?;

            if resp.status().is_success() {
                let ok: DockingResponse = resp.json().await?;
                print_success(&ok);
            } else {
                let status = resp.status();
                let failure: DockingFailure = resp.json().await?;
                println!("Docking falló (status {}):", status);
                println!("  error   : {}", failure.error);
                println!("  tipo    : {:?}", failure.kind);
                println!("  detalle : {}", failure.details.trim());
                if let Some(d) = failure.duration {
                    println!("  duración: {}", d);
                }
                std::process::exit(1);
            }
        }

        Commands::Health => {
            let url = format!("{}/health", base_url);
            let health: HealthInfo = client.get(&url).send().await?.json().await?;
            let vina = &health.components.vina;

            println!("Servidor: {}", health.status);
            println!(
                "  host      : {} ({} {})",
                health.system.hostname, health.system.platform, health.system.arch
            );
            println!("  uptime    : {} s", health.system.uptime_secs);
            println!(
                "  vina      : {} (existe={}, ejecutable={})",
                vina.vina_path.display(),
                vina.exists,
                vina.executable
            );
            if let Some(ref v) = vina.version {
                println!("  versión   : {}", v);
            }
            println!(
                "  config    : {} (existe={})",
                vina.config_path.display(),
                vina.config_exists
            );
            println!(
                "  output    : {} (escribible={})",
                health.components.output.path, health.components.output.writable
            );
            println!(
                "  logs      : {} (escribible={})",
                health.components.logs.path, health.components.logs.writable
            );
        }

        Commands::Status => {
            let url = format!("{}/status", base_url);
            let status: StatusInfo = client.get(&url).send().await?.json().await?;

            println!("Estado: {}", status.status);
            println!("  hora del servidor : {}", status.server_time);
            println!("  fase del runner   : {:?}", status.runner_phase);
            println!("  docking en curso  : {}", status.docking_in_progress);
            match status.last_run {
                Some(run) => {
                    println!("  última corrida    : {} ({:?})", run.docking_id, run.phase);
                    println!("    best score      : {}", format_score(run.best_score));
                    println!("    duración        : {:.2}s", run.duration_secs);
                    if let Some(err) = run.error {
                        println!("    error           : {}", err);
                    }
                }
                None => println!("  última corrida    : (ninguna)"),
            }
            println!("  logs recientes    : {}", status.recent_logs.len());
        }

        Commands::Files => {
            let url = format!("{}/files", base_url);
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                bail!("error consultando /files (status {})", resp.status());
            }

            let list: FileList = resp.json().await?;
            println!("Archivos en {}:", list.directory);
            if list.files.is_empty() {
                println!("  (sin estructuras de salida)");
            }
            for f in list.files {
                println!("  - {} ({} bytes) {}", f.name, f.size, f.url);
            }
        }

        Commands::Delete { name } => {
            let url = format!("{}/files/{}", base_url, name);
            let resp = client.delete(&url).send().await?;
            if resp.status().is_success() {
                let body: DeleteResponse = resp.json().await?;
                println!("{}", body.message);
            } else {
                println!("No se pudo borrar {} (status {})", name, resp.status());
            }
        }

        Commands::Local {
            root,
            timeout,
            defaults,
        } => {
            let mut config = RunnerConfig::for_project(root);
            config.timeout = Duration::from_secs(timeout);
            config.synthesize_defaults = defaults;

            println!("Ejecutando docking local:");
            println!("  vina  : {}", config.vina_path.display());
            println!("  config: {}", config.config_path.display());

            let runner = DockingRunner::new(config);
            match runner.run().await {
                Ok(outcome) => {
                    let cfg = runner.config();
                    let base = format!("file://{}", cfg.project_root.display());
                    let resp = DockingResponse::from_outcome(&outcome, &base, &cfg.output_dir);
                    print_success(&resp);
                }
                Err(e) => {
                    eprintln!("Error ejecutando docking: {}", e);
                    let details = e.error.details();
                    if !details.trim().is_empty() && details != e.to_string() {
                        eprintln!("{}", details.trim());
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_es_valida() {
        Cli::command().debug_assert();
    }

    #[test]
    fn local_tiene_defaults() {
        let cli = Cli::try_parse_from(["client", "local"]).unwrap();
        match cli.command {
            Commands::Local {
                root,
                timeout,
                defaults,
            } => {
                assert_eq!(root, PathBuf::from("."));
                assert_eq!(timeout, 300);
                assert!(!defaults);
            }
            _ => panic!("se esperaba el subcomando local"),
        }
    }

    #[test]
    fn delete_pide_nombre() {
        assert!(Cli::try_parse_from(["client", "delete"]).is_err());
        let cli = Cli::try_parse_from(["client", "delete", "viejo.pdbqt"]).unwrap();
        assert!(matches!(cli.command, Commands::Delete { ref name } if name == "viejo.pdbqt"));
    }
}
