use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Datos básicos del archivo de estructura que dejó vina.
/// No interpretamos coordenadas: eso es trabajo del visor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFileStats {
    pub size: u64,
    /// Registros ATOM/HETATM
    pub atoms: usize,
    /// Registros BRANCH/ENDBRANCH/TORSDOF
    pub torsion_records: usize,
    pub modified: Option<DateTime<Utc>>,
}

impl OutputFileStats {
    pub fn read(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        let text = fs::read_to_string(path)?;
        let (atoms, torsion_records) = count_records(&text);

        Ok(Self {
            size: meta.len(),
            atoms,
            torsion_records,
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

pub fn count_records(text: &str) -> (usize, usize) {
    let mut atoms = 0;
    let mut torsions = 0;
    for line in text.lines() {
        if line.starts_with("ATOM") || line.starts_with("HETATM") {
            atoms += 1;
        } else if line.starts_with("BRANCH")
            || line.starts_with("ENDBRANCH")
            || line.starts_with("TORSDOF")
        {
            torsions += 1;
        }
    }
    (atoms, torsions)
}

/// Receptor de relleno (tres átomos) para poder arrancar sin archivos reales.
pub const PLACEHOLDER_RECEPTOR: &str = "\
REMARK  placeholder receptor
ATOM      1  N   ALA A   1      -0.677  -1.230  -0.491  1.00  0.00    -0.346 N
ATOM      2  CA  ALA A   1      -0.001   0.064  -0.491  1.00  0.00     0.118 C
ATOM      3  C   ALA A   1       1.499  -0.110  -0.491  1.00  0.00     0.241 C
TER
END
";

/// Ligando de relleno: un etanol rígido.
pub const PLACEHOLDER_LIGAND: &str = "\
REMARK  placeholder ligand
ROOT
ATOM      1  C1  LIG L   1       0.000   0.000   0.000  1.00  0.00     0.042 C
ATOM      2  C2  LIG L   1       1.520   0.000   0.000  1.00  0.00     0.198 C
ATOM      3  O1  LIG L   1       2.020   1.340   0.000  1.00  0.00    -0.398 OA
ENDROOT
TORSDOF 0
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_records_distingue_atomos_y_torsiones() {
        let text = "\
MODEL 1
REMARK VINA RESULT:    -7.5      0.000      0.000
ROOT
ATOM      1  C1  LIG L   1       0.000   0.000   0.000  1.00  0.00     0.042 C
HETATM    2  O1  LIG L   1       2.020   1.340   0.000  1.00  0.00    -0.398 OA
ENDROOT
BRANCH   1   2
ENDBRANCH   1   2
TORSDOF 1
ENDMDL
";
        assert_eq!(count_records(text), (2, 3));
    }

    #[test]
    fn placeholders_tienen_atomos() {
        assert_eq!(count_records(PLACEHOLDER_RECEPTOR).0, 3);
        assert_eq!(count_records(PLACEHOLDER_LIGAND), (3, 1));
    }
}
