//! One Quickstep energy evaluation: SCF cycle, energy breakdown, forces.

use super::{fields, footer, leaf, marker};
use crate::error::PatternError;
use crate::rule::MatchRule;
use crate::value::{Value, ValueKind};

const SCF_ROW: &str = r"\s+(?P<x_cp2k_scf_step_number>\d+)\s+(?P<x_cp2k_scf_update_method>[A-Za-z][\w/.]*(?: [A-Za-z][\w/.]*)?)\s+(?:(?P<x_cp2k_scf_step_size>{float})\s+)?(?P<time_scf_iteration>{float})\s+(?P<x_cp2k_scf_convergence>{float})\s+(?P<energy_total_scf_iteration>{float})(?:\s+(?P<energy_change_scf_iteration>{float}))?\s*$";

/// `section_single_configuration_calculation`, opened by the SCF banner.
pub fn calculation() -> Result<MatchRule, PatternError> {
    let energy = |name: &str, label: &str| {
        leaf(name, &format!(r"\s*{label}:\s+({{float}})"), ValueKind::Float)
    };
    Ok(MatchRule::section(
        "section_single_configuration_calculation",
        marker("scf banner", r"\s*SCF WAVEFUNCTION OPTIMIZATION")?,
    )
    .children(vec![
        MatchRule::section("section_scf_iteration", marker("scf row", SCF_ROW)?).repeats(),
        leaf(
            "number_of_scf_iterations",
            r"\s*\*\*\* SCF run converged in\s+(\d+) steps? \*\*\*",
            ValueKind::Int,
        )?,
        MatchRule::value(marker(
            "scf not converged",
            r"\s*(?:\*\*\* SCF run NOT converged|Leaving inner SCF loop after reaching)",
        )?)
        .fixed(
            "single_configuration_calculation_converged",
            Value::Bool(false),
        ),
        energy(
            "x_cp2k_energy_core_overlap",
            "Overlap energy of the core charge distribution",
        )?,
        energy(
            "x_cp2k_energy_core_self",
            "Self energy of the core charge distribution",
        )?,
        energy("x_cp2k_energy_core_hamiltonian", "Core Hamiltonian energy")?,
        energy("energy_hartree", "Hartree energy")?,
        energy("energy_XC", "Exchange-correlation energy")?,
        energy("energy_van_der_Waals", "Dispersion energy")?,
        energy("x_cp2k_energy_total_scf", "Total energy")?,
        leaf(
            "energy_total",
            r"\s*ENERGY\|\s+Total FORCE_EVAL \( \w+ \) energy \(a\.u\.\):\s+({float})",
            ValueKind::Float,
        )?,
        MatchRule::group(
            "atomic forces",
            marker("atomic forces", r"\s*ATOMIC FORCES in \[a\.u\.\]")?,
        )
        .ends_with(marker("sum of forces", r"\s*SUM OF ATOMIC FORCES")?)
        .children(vec![
            fields(
                "force row",
                r"\s+\d+\s+\d+\s+[A-Za-z]\w*\s+(?P<x_cp2k_atom_force>{vec3})",
            )?
            .repeats(),
        ]),
    ]))
}

/// Body for `ENERGY` and `ENERGY_FORCE` runs: a single evaluation.
pub fn single_point() -> Result<Vec<MatchRule>, PatternError> {
    Ok(vec![calculation()?, footer()?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn scf_row() -> Pattern {
        Pattern::marker("scf row", SCF_ROW).unwrap()
    }

    fn field<'a>(caps: &'a [crate::pattern::Capture], name: &str) -> Option<&'a str> {
        caps.iter()
            .find(|c| c.quantity == name)
            .map(|c| c.text.as_str())
    }

    #[test]
    fn test_diagonalization_row() {
        let caps = scf_row()
            .captures("     2 P_Mix/Diag. 0.40E+00    0.5     0.02213897       -31.6413810639  5.91E-01")
            .unwrap();
        assert_eq!(field(&caps, "x_cp2k_scf_step_number"), Some("2"));
        assert_eq!(field(&caps, "x_cp2k_scf_update_method"), Some("P_Mix/Diag."));
        assert_eq!(field(&caps, "x_cp2k_scf_step_size"), Some("0.40E+00"));
        assert_eq!(field(&caps, "energy_total_scf_iteration"), Some("-31.6413810639"));
        assert_eq!(field(&caps, "energy_change_scf_iteration"), Some("5.91E-01"));
    }

    #[test]
    fn test_ot_row_without_step_size() {
        let caps = scf_row()
            .captures("     1 OT DIIS     0.15E+00    0.5     0.01478721       -31.2981574371 -3.13E+01")
            .unwrap();
        assert_eq!(field(&caps, "x_cp2k_scf_update_method"), Some("OT DIIS"));
        assert_eq!(field(&caps, "time_scf_iteration"), Some("0.5"));

        let caps = scf_row()
            .captures("     4 OT LS       0.3     0.00512345       -31.2990000000")
            .unwrap();
        assert_eq!(field(&caps, "x_cp2k_scf_step_size"), None);
        assert_eq!(field(&caps, "energy_change_scf_iteration"), None);
    }

    #[test]
    fn test_scf_row_rejects_headers() {
        let row = scf_row();
        assert!(!row.is_match("  Step     Update method      Time    Convergence         Total energy    Change"));
        assert!(!row.is_match("  ------------------------------------------------------------------------------"));
    }

    #[test]
    fn test_total_energy_line() {
        let calc = calculation().unwrap();
        let total = calc
            .child_rules()
            .iter()
            .find(|r| r.label() == "energy_total")
            .unwrap();
        let caps = total
            .pattern
            .captures(" ENERGY| Total FORCE_EVAL ( QS ) energy (a.u.):              -31.297550720306060")
            .unwrap();
        assert_eq!(caps[0].text, "-31.297550720306060");
    }
}
