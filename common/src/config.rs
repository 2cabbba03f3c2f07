use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::error::ConfigError;

/// Ruta de salida convencional cuando el config no trae `out=`.
pub const DEFAULT_OUTPUT_FILE: &str = "output/output_docked.pdbqt";

/// Archivo de configuración de vina (`clave=valor`, una por línea).
///
/// Es entrada de sólo lectura: se parsea, nunca se reescribe sobre un
/// archivo existente.
#[derive(Debug, Clone, PartialEq)]
pub struct DockingConfig {
    pub receptor: PathBuf,
    pub ligand: PathBuf,
    pub center: [f64; 3],
    pub size: [f64; 3],
    pub num_modes: Option<u32>,
    pub exhaustiveness: Option<u32>,
    pub out: Option<PathBuf>,

    /// Claves que no modelamos (energy_range, cpu, seed...), en orden de aparición.
    pub extra: Vec<(String, String)>,
}

impl DockingConfig {
    /// Config mínima usable: caja de 20Å centrada en el origen.
    pub fn with_defaults(receptor: impl Into<PathBuf>, ligand: impl Into<PathBuf>) -> Self {
        Self {
            receptor: receptor.into(),
            ligand: ligand.into(),
            center: [0.0, 0.0, 0.0],
            size: [20.0, 20.0, 20.0],
            num_modes: Some(9),
            exhaustiveness: Some(8),
            out: Some(PathBuf::from(DEFAULT_OUTPUT_FILE)),
            extra: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut receptor = None;
        let mut ligand = None;
        let mut center: [Option<f64>; 3] = [None; 3];
        let mut size: [Option<f64>; 3] = [None; 3];
        let mut num_modes = None;
        let mut exhaustiveness = None;
        let mut out = None;
        let mut extra = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            // quitar comentarios al final de la línea
            let line = match raw.split_once('#') {
                Some((before, _)) => before,
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::MalformedLine { line: idx + 1 })?;
            let key = key.trim();
            let value = value.trim();

            match key {
                "receptor" => receptor = Some(PathBuf::from(value)),
                "ligand" => ligand = Some(PathBuf::from(value)),
                "out" => out = Some(PathBuf::from(value)),
                "center_x" => center[0] = Some(parse_num("center_x", value)?),
                "center_y" => center[1] = Some(parse_num("center_y", value)?),
                "center_z" => center[2] = Some(parse_num("center_z", value)?),
                "size_x" => size[0] = Some(parse_num("size_x", value)?),
                "size_y" => size[1] = Some(parse_num("size_y", value)?),
                "size_z" => size[2] = Some(parse_num("size_z", value)?),
                "num_modes" => num_modes = Some(parse_num("num_modes", value)?),
                "exhaustiveness" => exhaustiveness = Some(parse_num("exhaustiveness", value)?),
                _ => extra.push((key.to_string(), value.to_string())),
            }
        }

        Ok(Self {
            receptor: receptor.ok_or(ConfigError::MissingKey("receptor"))?,
            ligand: ligand.ok_or(ConfigError::MissingKey("ligand"))?,
            center: [
                center[0].ok_or(ConfigError::MissingKey("center_x"))?,
                center[1].ok_or(ConfigError::MissingKey("center_y"))?,
                center[2].ok_or(ConfigError::MissingKey("center_z"))?,
            ],
            size: [
                size[0].ok_or(ConfigError::MissingKey("size_x"))?,
                size[1].ok_or(ConfigError::MissingKey("size_y"))?,
                size[2].ok_or(ConfigError::MissingKey("size_z"))?,
            ],
            num_modes,
            exhaustiveness,
            out,
            extra,
        })
    }

    /// Vuelve a escribir la config en el mismo formato `clave = valor`.
    pub fn to_config_text(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "receptor = {}", self.receptor.display());
        let _ = writeln!(s, "ligand = {}", self.ligand.display());
        s.push('\n');
        for (axis, v) in ["x", "y", "z"].iter().zip(self.center) {
            let _ = writeln!(s, "center_{} = {}", axis, v);
        }
        for (axis, v) in ["x", "y", "z"].iter().zip(self.size) {
            let _ = writeln!(s, "size_{} = {}", axis, v);
        }
        s.push('\n');
        if let Some(n) = self.num_modes {
            let _ = writeln!(s, "num_modes = {}", n);
        }
        if let Some(e) = self.exhaustiveness {
            let _ = writeln!(s, "exhaustiveness = {}", e);
        }
        if let Some(ref out) = self.out {
            let _ = writeln!(s, "out = {}", out.display());
        }
        for (k, v) in &self.extra {
            let _ = writeln!(s, "{} = {}", k, v);
        }
        s
    }

    /// Archivo de estructura que vina va a escribir, resuelto contra la raíz del proyecto.
    pub fn output_path(&self, project_root: &Path) -> PathBuf {
        let out = self
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE));
        if out.is_absolute() {
            out
        } else {
            project_root.join(out)
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
receptor = files/receptor.pdbqt
ligand = files/ligand.pdbqt

center_x = 12.5
center_y = -3.0   # centro del bolsillo
center_z = 7
size_x = 20
size_y = 22.5
size_z = 18

num_modes = 9
exhaustiveness = 8
energy_range = 3
out = output/output_docked.pdbqt
";

    #[test]
    fn parse_lee_todas_las_claves() {
        let cfg = DockingConfig::parse(SAMPLE).unwrap();

        assert_eq!(cfg.receptor, PathBuf::from("files/receptor.pdbqt"));
        assert_eq!(cfg.ligand, PathBuf::from("files/ligand.pdbqt"));
        assert_eq!(cfg.center, [12.5, -3.0, 7.0]);
        assert_eq!(cfg.size, [20.0, 22.5, 18.0]);
        assert_eq!(cfg.num_modes, Some(9));
        assert_eq!(cfg.exhaustiveness, Some(8));
        assert_eq!(cfg.out, Some(PathBuf::from("output/output_docked.pdbqt")));
        assert_eq!(
            cfg.extra,
            vec![("energy_range".to_string(), "3".to_string())]
        );
    }

    #[test]
    fn parse_falla_si_falta_una_clave_obligatoria() {
        let text = SAMPLE.replace("size_y = 22.5\n", "");
        let err = DockingConfig::parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("size_y")));
    }

    #[test]
    fn parse_reporta_linea_sin_igual() {
        let text = format!("{SAMPLE}esto no es una clave\n");
        let err = DockingConfig::parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { line: 15 }));
    }

    #[test]
    fn parse_rechaza_numeros_invalidos() {
        let text = SAMPLE.replace("exhaustiveness = 8", "exhaustiveness = mucho");
        let err = DockingConfig::parse(&text).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "exhaustiveness");
                assert_eq!(value, "mucho");
            }
            other => panic!("error inesperado: {other:?}"),
        }
    }

    #[test]
    fn to_config_text_se_puede_volver_a_leer() {
        let cfg = DockingConfig::parse(SAMPLE).unwrap();
        let again = DockingConfig::parse(&cfg.to_config_text()).unwrap();
        assert_eq!(cfg, again);
    }

    #[test]
    fn output_path_usa_default_y_respeta_absolutas() {
        let root = Path::new("/proyecto");

        let mut cfg = DockingConfig::with_defaults("r.pdbqt", "l.pdbqt");
        cfg.out = None;
        assert_eq!(
            cfg.output_path(root),
            PathBuf::from("/proyecto/output/output_docked.pdbqt")
        );

        cfg.out = Some(PathBuf::from("/tmp/otro.pdbqt"));
        assert_eq!(cfg.output_path(root), PathBuf::from("/tmp/otro.pdbqt"));
    }
}
