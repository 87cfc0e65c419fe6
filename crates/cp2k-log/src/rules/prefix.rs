//! Program header, input echo and Quickstep setup. Shared by every run mode.

use super::{fields, leaf, marker, md};
use crate::error::PatternError;
use crate::rule::{MatchRule, Phase, RunMode};
use crate::value::{Value, ValueKind};

/// `section_run`: opened by the start banner, closed by the end banner.
///
/// The prefix is unordered because block order drifts between versions; the
/// first mode banner replaces it with the body for that mode.
pub fn run() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::section(
        "section_run",
        marker(
            "program started",
            r"[ *]*PROGRAM STARTED AT\s+(?P<x_cp2k_start_time>.+?)\s*$",
        )?,
    )
    .repeats()
    .unordered()
    .fixed("program_name", Value::Str("CP2K".into()))
    .phase(Phase::Header)
    .ends_with(marker(
        "program ended",
        r"[ *]*PROGRAM ENDED AT\s+(?P<x_cp2k_end_time>.+?)\s*$",
    )?)
    .children(vec![
        leaf("x_cp2k_start_host", r"[ *]*PROGRAM STARTED ON\s+(\S+)", ValueKind::Str)?,
        leaf("x_cp2k_start_user", r"[ *]*PROGRAM STARTED BY\s+(\S+)", ValueKind::Str)?,
        leaf("x_cp2k_start_id", r"[ *]*PROGRAM PROCESS ID\s+(\d+)", ValueKind::Int)?,
        leaf("x_cp2k_start_path", r"[ *]*PROGRAM STARTED IN\s+(.+?)\s*$", ValueKind::Str)?,
        program_info()?,
        global_settings()?,
        cell()?,
        method()?,
        atomic_kinds()?,
        total_numbers()?,
        system()?,
        scf_parameters()?,
        leaf("number_of_electrons", r"\s*Number of electrons:\s+(\d+)", ValueKind::Int)?,
        MatchRule::switch(
            RunMode::GeometryOptimization,
            marker(
                "geometry optimization banner",
                r"\s*(?:\*+\s+STARTING\s+GEOMETRY\s+OPTIMIZATION|OPTIMIZATION STEP:)",
            )?,
        ),
        MatchRule::switch(
            RunMode::MolecularDynamics,
            marker("md banner", md::PROTOCOL_TAG)?,
        ),
        MatchRule::switch(
            RunMode::SinglePoint,
            marker("scf banner", r"\s*SCF WAVEFUNCTION OPTIMIZATION")?,
        ),
    ]))
}

fn program_info() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::group("CP2K|", marker("CP2K|", r"\s*CP2K\|")?)
        .forward()
        .unordered()
        .children(vec![
            leaf(
                "program_version",
                r"\s*CP2K\|\s+version string:\s+(.+?)\s*$",
                ValueKind::Str,
            )?,
            leaf(
                "x_cp2k_svn_revision",
                r"\s*CP2K\|\s+source code revision number:\s+(\S+)",
                ValueKind::Str,
            )?,
            leaf(
                "x_cp2k_program_compilation_datetime",
                r"\s*CP2K\|\s+Program compiled at\s+(.+?)\s*$",
                ValueKind::Str,
            )?,
            leaf(
                "x_cp2k_program_compilation_host",
                r"\s*CP2K\|\s+Program compiled on\s+(\S+)",
                ValueKind::Str,
            )?,
            leaf(
                "x_cp2k_program_compiled_for",
                r"\s*CP2K\|\s+Program compiled for\s+(\S+)",
                ValueKind::Str,
            )?,
            leaf(
                "x_cp2k_input_filename",
                r"\s*CP2K\|\s+Input file name\s+(\S+)",
                ValueKind::Str,
            )?,
        ]))
}

fn global_settings() -> Result<MatchRule, PatternError> {
    let setting = |name: &str, label: &str, kind: ValueKind| {
        leaf(name, &format!(r"\s*GLOBAL\|\s+{label}\s+(\S+)"), kind)
    };
    Ok(MatchRule::group("GLOBAL|", marker("GLOBAL|", r"\s*GLOBAL\|")?)
        .forward()
        .unordered()
        .phase(Phase::InputEcho)
        .children(vec![
            setting("x_cp2k_basis_set_filename", "Basis set file name", ValueKind::Str)?,
            setting("x_cp2k_potential_filename", "Potential file name", ValueKind::Str)?,
            setting("x_cp2k_coordinate_filename", "Coordinate file name", ValueKind::Str)?,
            setting("x_cp2k_method_name", "Method name", ValueKind::Str)?,
            setting("x_cp2k_project_name", "Project name", ValueKind::Str)?,
            setting("x_cp2k_run_type", "Run type", ValueKind::Str)?,
            setting("x_cp2k_global_print_level", "Global print level", ValueKind::Str)?,
            setting(
                "x_cp2k_mpi_processes",
                "Total number of message passing processes",
                ValueKind::Int,
            )?,
        ]))
}

fn cell() -> Result<MatchRule, PatternError> {
    let vector = |axis: char| {
        leaf(
            &format!("x_cp2k_cell_vector_{axis}"),
            &format!(r"\s*CELL(?:_TOP)?\|\s+Vector {axis} \[angstrom\]:\s+({{vec3}})"),
            ValueKind::FloatArray,
        )
    };
    Ok(MatchRule::group("CELL|", marker("CELL|", r"\s*CELL(?:_TOP)?\|")?)
        .forward()
        .unordered()
        .children(vec![
            leaf(
                "x_cp2k_cell_volume",
                r"\s*CELL(?:_TOP)?\|\s+Volume \[angstrom\^3\]:\s+({float})",
                ValueKind::Float,
            )?,
            vector('a')?,
            vector('b')?,
            vector('c')?,
        ]))
}

fn method() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::section("section_method", marker("DFT|", r"\s*DFT\|\s+Spin ")?)
        .forward()
        .unordered()
        .phase(Phase::QuickstepSetup)
        .children(vec![
            leaf(
                "x_cp2k_spin_restriction",
                r"\s*DFT\|\s+Spin \w+ (?:\(spin-polarized\) )?Kohn-Sham(?: \(\w+\))? calculation\s+(\S+)",
                ValueKind::Str,
            )?,
            leaf("spin_target_multiplicity", r"\s*DFT\|\s+Multiplicity\s+(\d+)", ValueKind::Int)?,
            leaf("total_charge", r"\s*DFT\|\s+Charge\s+(-?\d+)", ValueKind::Int)?,
            leaf("x_cp2k_qs_method", r"\s*QS\|\s+Method:\s+(\S+)", ValueKind::Str)?,
            leaf(
                "x_cp2k_density_cutoff",
                r"\s*QS\|\s+Density cut-?off \[a\.u\.\]:\s+({float})",
                ValueKind::Float,
            )?,
            MatchRule::section(
                "section_XC_functionals",
                marker(
                    "functional",
                    r"\s*FUNCTIONAL\|\s+(?P<XC_functional_name>[\w-]+):",
                )?,
            )
            .repeats(),
        ]))
}

fn atomic_kinds() -> Result<MatchRule, PatternError> {
    let count = |name: &str, label: &str| {
        leaf(name, &format!(r"\s+Number of {label}:\s+(\d+)"), ValueKind::Int)
    };
    let kind = MatchRule::section(
        "x_cp2k_section_atomic_kind",
        marker(
            "atomic kind",
            r"\s+\d+\. Atomic kind:\s+(?P<x_cp2k_kind_label>\S+)\s+Number of atoms:\s+(?P<x_cp2k_kind_number_of_atoms>\d+)",
        )?,
    )
    .repeats()
    .children(vec![
        leaf(
            "x_cp2k_kind_basis_set_name",
            r"\s+Orbital Basis Set\s+(\S+)",
            ValueKind::Str,
        )?,
        count("x_cp2k_kind_number_of_orbital_shell_sets", "orbital shell sets")?,
        count("x_cp2k_kind_number_of_orbital_shells", "orbital shells")?,
        count(
            "x_cp2k_kind_number_of_primitive_cartesian_functions",
            "primitive Cartesian functions",
        )?,
        count(
            "x_cp2k_kind_number_of_cartesian_basis_functions",
            "Cartesian basis functions",
        )?,
        count(
            "x_cp2k_kind_number_of_spherical_basis_functions",
            "spherical basis functions",
        )?,
        leaf(
            "x_cp2k_kind_potential_name",
            r"\s+GTH Potential information for\s+(\S+)",
            ValueKind::Str,
        )?,
    ]);
    Ok(MatchRule::group(
        "atomic kinds",
        marker("atomic kinds", r"\s*ATOMIC KIND INFORMATION")?,
    )
    .children(vec![kind]))
}

fn total_numbers() -> Result<MatchRule, PatternError> {
    let total = |name: &str, label: &str| {
        leaf(name, &format!(r"\s+(?:Total number of)?\s+- {label}:\s+(\d+)"), ValueKind::Int)
    };
    Ok(MatchRule::group(
        "total numbers",
        marker("total numbers", r"\s*TOTAL NUMBERS AND MAXIMUM NUMBERS")?,
    )
    .unordered()
    .children(vec![
        total("x_cp2k_total_number_of_atomic_kinds", "Atomic kinds")?,
        total("x_cp2k_total_number_of_atoms", "Atoms")?,
        total("x_cp2k_total_number_of_shell_sets", "Shell sets")?,
        total("x_cp2k_total_number_of_shells", "Shells")?,
        total(
            "x_cp2k_total_number_of_primitive_cartesian_functions",
            "Primitive Cartesian functions",
        )?,
        total(
            "x_cp2k_total_number_of_cartesian_basis_functions",
            "Cartesian basis functions",
        )?,
        total(
            "x_cp2k_total_number_of_spherical_basis_functions",
            "Spherical basis functions",
        )?,
    ]))
}

fn system() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::section(
        "section_system",
        marker(
            "coordinates",
            r"\s*MODULE QUICKSTEP:\s+ATOMIC COORDINATES IN (?P<x_cp2k_coordinate_unit>\w+)",
        )?,
    )
    .children(vec![
        fields(
            "coordinate row",
            r"\s+(?P<x_cp2k_atom_index>\d+)\s+\d+\s+(?P<x_cp2k_atom_label>[A-Za-z]\w*)\s+\d+\s+(?P<x_cp2k_atom_position>{vec3})",
        )?
        .repeats(),
    ]))
}

fn scf_parameters() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::group(
        "scf parameters",
        marker(
            "scf parameters",
            r"\s*SCF PARAMETERS\s+Density guess:\s+(?P<x_cp2k_density_guess>\S+)",
        )?,
    )
    .unordered()
    .children(vec![
        leaf("scf_max_iteration", r"\s+max_scf:\s+(\d+)", ValueKind::Int)?,
        leaf("scf_threshold_energy_change", r"\s+eps_scf:\s+({float})", ValueKind::Float)?,
    ]))
}
