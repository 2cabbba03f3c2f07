use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fila de la tabla que imprime vina:
/// `<modo> <afinidad> <rmsd l.b.> <rmsd u.b.>`
static SCORE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s+-?\d+\.\d+\s+").expect("regex de score válida"));

/// Un modo de unión reportado por vina.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMode {
    /// Índice que imprimió vina; si no entra en `u64` queda en `u64::MAX`.
    pub mode: u64,
    /// kcal/mol, más negativo = unión más fuerte
    pub score: f64,
    pub rmsd_lb: Option<f64>,
    pub rmsd_ub: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Score de la primera fila encontrada (vina ordena de mejor a peor).
    pub best_score: Option<f64>,
    /// Mínimo real entre todas las filas.
    pub min_score: Option<f64>,
    pub all_scores: Vec<f64>,
    pub modes: Vec<ResultMode>,
}

impl ScoreReport {
    /// `false` cuando la primera fila no es la mejor: sólo un aviso de calidad de datos.
    pub fn best_is_minimum(&self) -> bool {
        match (self.best_score, self.min_score) {
            (Some(best), Some(min)) => best <= min,
            _ => true,
        }
    }
}

pub fn is_score_line(line: &str) -> bool {
    SCORE_LINE.is_match(line.trim())
}

pub fn parse_mode_line(line: &str) -> Option<ResultMode> {
    let trimmed = line.trim();
    if !SCORE_LINE.is_match(trimmed) {
        return None;
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    // la regex garantiza dígitos: el único fallo posible es overflow
    let mode = parts.first()?.parse::<u64>().unwrap_or(u64::MAX);
    let score = parts.get(1)?.parse::<f64>().ok()?;

    Some(ResultMode {
        mode,
        score,
        rmsd_lb: parts.get(2).and_then(|p| p.parse().ok()),
        rmsd_ub: parts.get(3).and_then(|p| p.parse().ok()),
    })
}

/// Recorre el stdout de vina línea por línea y junta las filas de score.
/// Encabezados, separadores y cualquier otro texto se ignoran.
pub fn parse_scores(stdout: &str) -> ScoreReport {
    let modes: Vec<ResultMode> = stdout.lines().filter_map(parse_mode_line).collect();
    let all_scores: Vec<f64> = modes.iter().map(|m| m.score).collect();

    let best_score = all_scores.first().copied();
    let min_score = all_scores.iter().copied().reduce(f64::min);

    ScoreReport {
        best_score,
        min_score,
        all_scores,
        modes,
    }
}

/// `"-7.5 kcal/mol"` o `"N/A"` si no hubo filas.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{} kcal/mol", s),
        None => "N/A".to_string(),
    }
}
