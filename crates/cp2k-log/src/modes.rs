//! Run-mode sub-parsers.
//!
//! The rule trees decide what is matched; the sub-parsers add what can only be
//! known once a section is complete, reading back the values buffered in it
//! before they are committed.

use crate::auxiliary::{XyzFrame, read_numeric_table, read_xyz};
use crate::backend::Backend;
use crate::caching::CachingBackend;
use crate::error::{AuxError, ParseWarning};
use crate::rule::RunMode;
use crate::value::{ArrayValue, Datum, Value};
use std::path::Path;

const SYSTEM: &str = "section_system";
const CALCULATION: &str = "section_single_configuration_calculation";
const RUN: &str = "section_run";
const GEO_OPT: &str = "x_cp2k_section_geometry_optimization";
const GEO_OPT_STEP: &str = "x_cp2k_section_geometry_optimization_step";
const MD: &str = "x_cp2k_section_md";
const MD_STEP: &str = "x_cp2k_section_md_step";

/// What close hooks may look at besides the buffered values.
#[derive(Debug, Clone, Copy)]
pub struct HookEnv<'a> {
    /// Directory relative file names in the log are resolved against.
    pub base_dir: Option<&'a Path>,
    pub read_auxiliary_files: bool,
    pub line: usize,
}

/// Sub-parser for one run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeParser {
    SinglePoint,
    GeometryOptimization,
    MolecularDynamics,
}

impl From<RunMode> for ModeParser {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::SinglePoint => Self::SinglePoint,
            RunMode::GeometryOptimization => Self::GeometryOptimization,
            RunMode::MolecularDynamics => Self::MolecularDynamics,
        }
    }
}

impl ModeParser {
    pub fn mode(self) -> RunMode {
        match self {
            Self::SinglePoint => RunMode::SinglePoint,
            Self::GeometryOptimization => RunMode::GeometryOptimization,
            Self::MolecularDynamics => RunMode::MolecularDynamics,
        }
    }

    /// Runs before section `name` #`index` is committed.
    pub fn on_close<B: Backend>(
        self,
        tracker: &mut CachingBackend<B>,
        name: &str,
        index: usize,
        env: &HookEnv<'_>,
    ) -> Vec<ParseWarning> {
        match (self, name) {
            (Self::GeometryOptimization, GEO_OPT) => {
                if !tracker.has_value(index, "geometry_optimization_converged") {
                    put(tracker, index, "geometry_optimization_converged", Value::Bool(false));
                }
                let steps = tracker.child_count(index, GEO_OPT_STEP);
                put(tracker, index, "x_cp2k_optimization_step_count", Value::Int(steps as i64));
                Vec::new()
            }
            (Self::MolecularDynamics, MD) => {
                let steps = tracker.child_count(index, MD_STEP);
                put(tracker, index, "x_cp2k_md_step_count", Value::Int(steps as i64));
                if env.read_auxiliary_files {
                    read_md_outputs(tracker, index, env)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Hooks that apply whatever the run mode.
pub fn common_on_close<B: Backend>(
    tracker: &mut CachingBackend<B>,
    name: &str,
    index: usize,
    env: &HookEnv<'_>,
) -> Vec<ParseWarning> {
    let mut warnings = Vec::new();
    match name {
        SYSTEM => {
            let labels: Vec<String> = tracker
                .values(index, "x_cp2k_atom_label")
                .into_iter()
                .filter_map(|d| d.scalar()?.as_str().map(str::to_string))
                .collect();
            let positions = rows(tracker.values(index, "x_cp2k_atom_position"));
            if !positions.is_empty() {
                let count = positions.len();
                if let Some(array) = stack(&positions, "atom_positions", env, &mut warnings) {
                    put(tracker, index, "atom_positions", array);
                }
                put(tracker, index, "atom_labels", ArrayValue::Str(labels));
                put(tracker, index, "number_of_atoms", Value::Int(count as i64));
            }
            let cell: Vec<Vec<f64>> = ["a", "b", "c"]
                .iter()
                .filter_map(|axis| {
                    let vector = tracker.latest(&format!("x_cp2k_cell_vector_{axis}"))?;
                    Some(vector.array()?.floats()?.to_vec())
                })
                .collect();
            if cell.len() == 3
                && let Some(array) = stack(&cell, "simulation_cell", env, &mut warnings)
            {
                put(tracker, index, "simulation_cell", array);
            }
        }
        CALCULATION => {
            let forces = rows(tracker.values(index, "x_cp2k_atom_force"));
            if !forces.is_empty()
                && let Some(array) = stack(&forces, "atom_forces", env, &mut warnings)
            {
                put(tracker, index, "atom_forces", array);
            }
            if !tracker.has_value(index, "single_configuration_calculation_converged")
                && tracker.has_value(index, "number_of_scf_iterations")
            {
                put(
                    tracker,
                    index,
                    "single_configuration_calculation_converged",
                    Value::Bool(true),
                );
            }
        }
        RUN => {
            let clean = tracker.has_value(index, "x_cp2k_end_time");
            put(tracker, index, "run_clean_end", Value::Bool(clean));
        }
        _ => {}
    }
    warnings
}

fn put(
    tracker: &mut CachingBackend<impl Backend>,
    index: usize,
    name: &str,
    datum: impl Into<Datum>,
) {
    if let Err(err) = tracker.add_datum_to(index, name, datum.into(), None) {
        log::warn!("dropping derived value `{name}`: {err}");
    }
}

fn rows(values: Vec<&Datum>) -> Vec<Vec<f64>> {
    values
        .into_iter()
        .filter_map(|d| Some(d.array()?.floats()?.to_vec()))
        .collect()
}

fn stack(
    rows: &[Vec<f64>],
    quantity: &str,
    env: &HookEnv<'_>,
    warnings: &mut Vec<ParseWarning>,
) -> Option<ArrayValue> {
    let array = ArrayValue::from_rows(rows);
    if array.is_none() {
        log::warn!("rows of `{quantity}` have different lengths");
        warnings.push(ParseWarning::InvalidValue {
            line: env.line,
            quantity: quantity.to_string(),
            message: "rows have different lengths".to_string(),
        });
    }
    array
}

/// Reads the energy table and trajectories named in the MD protocol.
fn read_md_outputs<B: Backend>(
    tracker: &mut CachingBackend<B>,
    index: usize,
    env: &HookEnv<'_>,
) -> Vec<ParseWarning> {
    let Some(base) = env.base_dir else {
        log::debug!("no log directory known, skipping MD output files");
        return Vec::new();
    };
    let file_name = |tracker: &CachingBackend<B>, quantity: &str| {
        tracker
            .values(index, quantity)
            .last()
            .and_then(|d| d.scalar()?.as_str().map(|s| base.join(s)))
    };
    let mut warnings = Vec::new();
    let mut report = |err: AuxError| {
        log::warn!("{err}");
        let path = match &err {
            AuxError::Io { path, .. } | AuxError::Malformed { path, .. } => path.clone(),
        };
        warnings.push(ParseWarning::AuxiliaryFile {
            path,
            message: err.to_string(),
        });
    };

    if let Some(path) = file_name(tracker, "x_cp2k_md_energies_filename") {
        match read_numeric_table(&path) {
            Ok(table) => match ArrayValue::from_rows(&table.rows) {
                Some(array) => put(tracker, index, "x_cp2k_md_energies", array),
                None => report(AuxError::Malformed {
                    path,
                    line: 0,
                    message: "ragged table".to_string(),
                }),
            },
            Err(err) => report(err),
        }
    }

    let trajectories = [
        ("x_cp2k_md_coordinates_filename", "x_cp2k_md_trajectory_positions"),
        ("x_cp2k_md_velocities_filename", "x_cp2k_md_trajectory_velocities"),
    ];
    for (file_quantity, target) in trajectories {
        let Some(path) = file_name(tracker, file_quantity) else {
            continue;
        };
        match read_xyz(&path).and_then(|frames| trajectory(&frames, &path)) {
            Ok(Some((labels, array))) => {
                if !tracker.has_value(index, "x_cp2k_md_trajectory_labels") {
                    put(tracker, index, "x_cp2k_md_trajectory_labels", ArrayValue::Str(labels));
                }
                put(tracker, index, target, array);
            }
            Ok(None) => {}
            Err(err) => report(err),
        }
    }
    warnings
}

/// Stacks frames into a `[frames, atoms, 3]` array; every frame must hold the
/// same number of atoms.
fn trajectory(
    frames: &[XyzFrame],
    path: &Path,
) -> Result<Option<(Vec<String>, ArrayValue)>, AuxError> {
    let Some(first) = frames.first() else {
        return Ok(None);
    };
    let atoms = first.positions.len();
    if let Some((n, _)) = frames
        .iter()
        .enumerate()
        .find(|(_, f)| f.positions.len() != atoms)
    {
        return Err(AuxError::Malformed {
            path: path.to_path_buf(),
            line: 0,
            message: format!("frame {n} has a different atom count than frame 0"),
        });
    }
    let values = frames
        .iter()
        .flat_map(|f| f.positions.iter().flatten().copied())
        .collect();
    Ok(Some((
        first.labels.clone(),
        ArrayValue::Float {
            values,
            shape: vec![frames.len(), atoms, 3],
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EventRecorder;
    use crate::schema::Schema;
    use std::io::Write;
    use std::sync::Arc;

    fn tracker() -> CachingBackend<EventRecorder> {
        CachingBackend::new(EventRecorder::new(), Arc::new(Schema::builtin().unwrap()))
    }

    fn env(base: Option<&Path>) -> HookEnv<'_> {
        HookEnv {
            base_dir: base,
            read_auxiliary_files: true,
            line: 1,
        }
    }

    fn vector(values: [f64; 3]) -> Datum {
        Datum::Array(ArrayValue::Float {
            values: values.to_vec(),
            shape: vec![3],
        })
    }

    #[test]
    fn test_system_composes_arrays() {
        let mut t = tracker();
        t.open(RUN);
        t.add_datum("x_cp2k_cell_vector_a", vector([5.4, 0.0, 0.0]), None).unwrap();
        t.add_datum("x_cp2k_cell_vector_b", vector([0.0, 5.4, 0.0]), None).unwrap();
        t.add_datum("x_cp2k_cell_vector_c", vector([0.0, 0.0, 5.4]), None).unwrap();
        let system = t.open(SYSTEM);
        for (label, x) in [("Si", 0.0), ("Si", 1.3)] {
            t.add_value("x_cp2k_atom_label", Value::Str(label.into()), None).unwrap();
            t.add_datum("x_cp2k_atom_position", vector([x, x, x]), None).unwrap();
        }

        let warnings = common_on_close(&mut t, SYSTEM, system, &env(None));
        assert!(warnings.is_empty());
        let positions = t.values(system, "atom_positions");
        assert_eq!(positions[0].array().unwrap().shape(), vec![2, 3]);
        assert_eq!(
            t.values(system, "number_of_atoms")[0].scalar(),
            Some(&Value::Int(2))
        );
        let cell = t.values(system, "simulation_cell");
        assert_eq!(cell[0].array().unwrap().shape(), vec![3, 3]);
    }

    #[test]
    fn test_calculation_convergence() {
        let mut t = tracker();
        t.open(RUN);
        let calc = t.open(CALCULATION);
        t.add_value("number_of_scf_iterations", Value::Int(10), None).unwrap();
        common_on_close(&mut t, CALCULATION, calc, &env(None));
        assert_eq!(
            t.values(calc, "single_configuration_calculation_converged")[0].scalar(),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_geometry_optimization_defaults() {
        let mut t = tracker();
        t.open(RUN);
        let go = t.open(GEO_OPT);
        for _ in 0..3 {
            let step = t.open(GEO_OPT_STEP);
            t.close(GEO_OPT_STEP, step).unwrap();
        }
        ModeParser::GeometryOptimization.on_close(&mut t, GEO_OPT, go, &env(None));
        assert_eq!(
            t.values(go, "geometry_optimization_converged")[0].scalar(),
            Some(&Value::Bool(false))
        );
        assert_eq!(
            t.values(go, "x_cp2k_optimization_step_count")[0].scalar(),
            Some(&Value::Int(3))
        );
    }

    #[test]
    fn test_md_reads_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut ener = std::fs::File::create(dir.path().join("w-1.ener")).unwrap();
        writeln!(ener, "# Step Time Kin Temp Pot Cons Used").unwrap();
        writeln!(ener, "0 0.0 0.0026 273.7 -34.16 -34.165 0.0").unwrap();
        writeln!(ener, "1 0.5 0.0021 231.0 -34.16 -34.165 4.3").unwrap();
        std::fs::write(
            dir.path().join("w-pos-1.xyz"),
            "1\n i = 0\n O 0.0 0.0 0.0\n1\n i = 1\n O 0.1 0.0 0.0\n",
        )
        .unwrap();

        let mut t = tracker();
        t.open(RUN);
        let md = t.open(MD);
        t.add_value("x_cp2k_md_energies_filename", Value::Str("w-1.ener".into()), None)
            .unwrap();
        t.add_value("x_cp2k_md_coordinates_filename", Value::Str("w-pos-1.xyz".into()), None)
            .unwrap();
        t.add_value("x_cp2k_md_velocities_filename", Value::Str("missing.xyz".into()), None)
            .unwrap();

        let warnings =
            ModeParser::MolecularDynamics.on_close(&mut t, MD, md, &env(Some(dir.path())));
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ParseWarning::AuxiliaryFile { .. }));
        assert_eq!(
            t.values(md, "x_cp2k_md_energies")[0].array().unwrap().shape(),
            vec![2, 7]
        );
        assert_eq!(
            t.values(md, "x_cp2k_md_trajectory_positions")[0].array().unwrap().shape(),
            vec![2, 1, 3]
        );
    }
}
