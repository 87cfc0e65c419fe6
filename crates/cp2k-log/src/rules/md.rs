use super::{calculation, fields, footer, leaf, marker};
use crate::dispatch::Dialect;
use crate::error::PatternError;
use crate::rule::MatchRule;
use crate::value::{Value, ValueKind};

/// Protocol block prefix: `MD|` up to 2.x, `MD_PAR|` from 5.x on.
pub(super) const PROTOCOL_TAG: &str = r"\s*MD(?:_PAR)?\|";

/// Per-step report rows: quantity stem, legacy label, modern label, and
/// whether the row carries an instantaneous/average pair.
const STEP_REPORT: &[(&str, &str, &str, bool)] = &[
    ("x_cp2k_md_step_number", r"STEP NUMBER", r"Step number", false),
    ("x_cp2k_md_time", r"TIME \[fs\]", r"Time \[fs\]", false),
    (
        "x_cp2k_md_conserved_quantity",
        r"CONSERVED QUANTITY \[hartree\]",
        r"Conserved quantity \[hartree\]",
        false,
    ),
    ("x_cp2k_md_cpu_time", r"CPU TIME \[s\]", r"CPU time per MD step \[s\]", true),
    (
        "x_cp2k_md_energy_drift",
        r"ENERGY DRIFT PER ATOM \[K\]",
        r"Energy drift per atom \[K\]",
        true,
    ),
    (
        "x_cp2k_md_potential_energy",
        r"POTENTIAL ENERGY\s*\[hartree\]",
        r"Potential energy \[hartree\]",
        true,
    ),
    (
        "x_cp2k_md_kinetic_energy",
        r"KINETIC ENERGY\s*\[hartree\]",
        r"Kinetic energy \[hartree\]",
        true,
    ),
    ("x_cp2k_md_temperature", r"TEMPERATURE\s*\[K\]", r"Temperature \[K\]", true),
    ("x_cp2k_md_pressure", r"PRESSURE\s*\[bar\]", r"Pressure \[bar\]", true),
];

/// Initial-state rows printed once before the first step.
const INITIAL_STATE: &[(&str, &str, &str)] = &[
    (
        "x_cp2k_md_initial_potential_energy",
        r"INITIAL POTENTIAL ENERGY\s*\[hartree\]",
        r"Potential energy \[hartree\]",
    ),
    (
        "x_cp2k_md_initial_kinetic_energy",
        r"INITIAL KINETIC ENERGY\s*\[hartree\]",
        r"Kinetic energy \[hartree\]",
    ),
    (
        "x_cp2k_md_initial_temperature",
        r"INITIAL TEMPERATURE\s*\[K\]",
        r"Temperature \[K\]",
    ),
    (
        "x_cp2k_md_initial_pressure",
        r"INITIAL PRESSURE\s*\[bar\]",
        r"Pressure \[bar\]",
    ),
];

/// Body for `MD` runs: protocol, initial evaluation, initial state, then one
/// repeating step per SCF banner.
pub fn molecular_dynamics(dialect: Dialect) -> Result<Vec<MatchRule>, PatternError> {
    let step = MatchRule::section(
        "x_cp2k_section_md_step",
        marker("md step", r"\s*SCF WAVEFUNCTION OPTIMIZATION")?,
    )
    .repeats()
    .forward()
    .children(vec![calculation()?, step_report(dialect)?]);

    Ok(vec![
        MatchRule::section("x_cp2k_section_md", marker("MD|", PROTOCOL_TAG)?)
            .forward()
            .fixed("sampling_method", Value::Str("molecular_dynamics".into()))
            .children(vec![
                protocol()?,
                calculation()?,
                initial_state(dialect)?,
                step,
            ]),
        footer()?,
    ])
}

fn protocol() -> Result<MatchRule, PatternError> {
    let setting = |name: &str, label: &str, value: &str, kind: ValueKind| {
        leaf(name, &format!(r"{PROTOCOL_TAG}\s+(?i:{label})\s+{value}"), kind)
    };
    let output = |file: &str, label: &str| {
        let frequency = format!("x_cp2k_md_{file}_print_frequency");
        let filename = format!("x_cp2k_md_{file}_filename");
        fields(
            label,
            &format!(r"{PROTOCOL_TAG}\s+(?i:{label})\s+(?P<{frequency}>\d+)\s+(?P<{filename}>\S+)"),
        )
    };
    Ok(MatchRule::group("md protocol", marker("MD|", PROTOCOL_TAG)?)
        .forward()
        .unordered()
        .children(vec![
            setting("x_cp2k_md_ensemble_type", "Ensemble type", r"(\S+)", ValueKind::Str)?,
            setting(
                "x_cp2k_md_number_of_time_steps",
                "Number of time steps",
                r"(\d+)",
                ValueKind::Int,
            )?,
            setting(
                "x_cp2k_md_time_step",
                r"Time step \[fs\]",
                "({float})",
                ValueKind::Float,
            )?,
            setting(
                "x_cp2k_md_target_temperature",
                r"Temperature \[K\]",
                "({float})",
                ValueKind::Float,
            )?,
            setting(
                "x_cp2k_md_target_temperature_tolerance",
                r"Temperature tolerance \[K\]",
                "({float})",
                ValueKind::Float,
            )?,
            setting(
                "x_cp2k_md_print_frequency",
                "Print MD information every",
                r"(\d+)",
                ValueKind::Int,
            )?,
            output("coordinates", "Coordinates")?,
            output("velocities", "Velocities")?,
            output("energies", "Energies")?,
        ]))
}

fn step_report(dialect: Dialect) -> Result<MatchRule, PatternError> {
    let (opener, prefix, separator) = match dialect {
        Dialect::Legacy => (r"\s*(?:ENSEMBLE TYPE|STEP NUMBER)\s+=", r"\s*", r"\s+=\s+"),
        Dialect::Modern => (r"\s*MD\|\s+Step number", r"\s*MD\|\s+", r"\s+"),
    };
    let rows = STEP_REPORT
        .iter()
        .map(|&(stem, legacy, modern, averaged)| {
            let label = match dialect {
                Dialect::Legacy => legacy,
                Dialect::Modern => modern,
            };
            if averaged {
                let pair = format!(
                    r"(?P<{stem}_instantaneous>{{float}})\s+(?P<{stem}_average>{{float}})"
                );
                fields(stem, &format!(r"{prefix}{label}{separator}{pair}"))
            } else {
                let kind = if stem == "x_cp2k_md_step_number" {
                    ValueKind::Int
                } else {
                    ValueKind::Float
                };
                let value = if kind == ValueKind::Int { r"(\d+)" } else { "({float})" };
                leaf(stem, &format!(r"{prefix}{label}{separator}{value}"), kind)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MatchRule::group("md step report", marker("md step report", opener)?)
        .forward()
        .unordered()
        .children(rows))
}

fn initial_state(dialect: Dialect) -> Result<MatchRule, PatternError> {
    let (opener, prefix, separator) = match dialect {
        Dialect::Legacy => (r"\s*\*+ GO CP2K GO! \*+", r"\s*", r"\s+=\s+"),
        Dialect::Modern => (r"\s*MD_INI\|", r"\s*MD_INI\|\s+", r"\s+"),
    };
    let rows = INITIAL_STATE
        .iter()
        .map(|&(name, legacy, modern)| {
            let label = match dialect {
                Dialect::Legacy => legacy,
                Dialect::Modern => modern,
            };
            leaf(
                name,
                &format!(r"{prefix}{label}{separator}({{float}})"),
                ValueKind::Float,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MatchRule::group("md initial state", marker("md initial state", opener)?)
        .forward()
        .unordered()
        .children(rows))
}
