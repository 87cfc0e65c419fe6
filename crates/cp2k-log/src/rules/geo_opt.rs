use super::{calculation, footer, leaf, marker};
use crate::error::PatternError;
use crate::rule::MatchRule;
use crate::value::{Value, ValueKind};

/// Body for `GEO_OPT` runs.
///
/// An initial evaluation is followed by numbered steps, each holding one or
/// more evaluations (line searches print several) and the optimizer's report.
/// The final evaluation is only recognised under the completion banner.
/// Convergence flags are kept as the `YES`/`NO` text the program prints.
pub fn geometry_optimization() -> Result<Vec<MatchRule>, PatternError> {
    let step = MatchRule::section(
        "x_cp2k_section_geometry_optimization_step",
        marker(
            "optimization step",
            r"\s*OPTIMIZATION STEP:\s+(?P<x_cp2k_optimization_step_number>\d+)",
        )?,
    )
    .repeats()
    .ends_with(marker(
        "rms gradient convergence",
        r"\s*Conv\. in RMS gradients\s+=\s+(?P<x_cp2k_optimization_rms_gradient_convergence>YES|NO)",
    )?)
    .children(vec![calculation()?.repeats(), step_report()?]);

    Ok(vec![
        MatchRule::section(
            "x_cp2k_section_geometry_optimization",
            marker(
                "geometry optimization",
                r"\s*(?:\*+\s+STARTING\s+GEOMETRY\s+OPTIMIZATION|OPTIMIZATION STEP:)",
            )?,
        )
        .forward()
        .fixed("sampling_method", Value::Str("geometry_optimization".into()))
        .children(vec![
            leaf(
                "geometry_optimization_method",
                r"\s*\*+\s+(BFGS|LBFGS|L-BFGS|CG)\s+\*+",
                ValueKind::Str,
            )?,
            leaf("number_of_electrons", r"\s*Number of electrons:\s+(\d+)", ValueKind::Int)?,
            calculation()?,
            step,
            MatchRule::group(
                "optimization completed",
                marker(
                    "optimization completed",
                    r"\s*\*+\s+GEOMETRY OPTIMIZATION COMPLETED",
                )?,
            )
            .fixed("geometry_optimization_converged", Value::Bool(true))
            .children(vec![calculation()?]),
            MatchRule::group(
                "maximum steps reached",
                marker(
                    "maximum steps reached",
                    r"\s*\*+\s+MAXIMUM NUMBER OF OPTIMIZATION STEPS REACHED",
                )?,
            )
            .fixed("geometry_optimization_converged", Value::Bool(false))
            .children(vec![calculation()?]),
        ]),
        footer()?,
    ])
}

/// The `Informations at step` block printed after each step's evaluation.
fn step_report() -> Result<MatchRule, PatternError> {
    let entry = |name: &str, label: &str, kind: ValueKind| {
        let value = match kind {
            ValueKind::Float => "({float})",
            _ => r"(\S+)",
        };
        leaf(name, &format!(r"\s*{label}\s+=\s+{value}"), kind)
    };
    Ok(MatchRule::group(
        "step report",
        marker(
            "step report",
            r"\s*-+\s+Informations at step\s*=\s*(?P<x_cp2k_optimization_info_step>\d+)",
        )?,
    )
    .unordered()
    .children(vec![
        entry("x_cp2k_optimization_method", "Optimization Method", ValueKind::Str)?,
        entry("x_cp2k_optimization_energy", "Total Energy", ValueKind::Float)?,
        entry("x_cp2k_optimization_energy_change", "Real energy change", ValueKind::Float)?,
        entry(
            "x_cp2k_optimization_predicted_energy_change",
            r"Predicted change in energy",
            ValueKind::Float,
        )?,
        entry("x_cp2k_optimization_energy_decrease", "Decrease in energy", ValueKind::Str)?,
        entry("x_cp2k_optimization_step_size", "Step size", ValueKind::Float)?,
        entry("x_cp2k_optimization_trust_radius", "Trust radius", ValueKind::Float)?,
        entry("x_cp2k_optimization_max_step_size", r"Max\. step size", ValueKind::Float)?,
        entry(
            "x_cp2k_optimization_step_size_convergence",
            "Convergence in step size",
            ValueKind::Str,
        )?,
        entry("x_cp2k_optimization_rms_step_size", "RMS step size", ValueKind::Float)?,
        entry(
            "x_cp2k_optimization_rms_step_size_convergence",
            "Convergence in RMS step",
            ValueKind::Str,
        )?,
        entry("x_cp2k_optimization_max_gradient", r"Max\. gradient", ValueKind::Float)?,
        entry(
            "x_cp2k_optimization_max_gradient_convergence",
            r"Conv\. in gradients",
            ValueKind::Str,
        )?,
        entry("x_cp2k_optimization_rms_gradient", "RMS gradient", ValueKind::Float)?,
    ]))
}
