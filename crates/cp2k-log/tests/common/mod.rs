#![allow(dead_code)]

use cp2k_log::{BackendEvent, Cp2kParser, EventRecorder, ParseOutcome, ParserOptions, Value};

/// Writes synthetic CP2K output with exact block counts.
pub struct LogBuilder {
    text: String,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    pub fn line(mut self, line: &str) -> Self {
        self.text.push_str(line);
        self.text.push('\n');
        self
    }

    fn lines(mut self, lines: &[&str]) -> Self {
        for line in lines {
            self = self.line(line);
        }
        self
    }

    /// Start banner through the Quickstep setup, for a two-atom silicon cell.
    pub fn header(self, version: &str, run_type: &str) -> Self {
        self.lines(&[
            " DBCSR| Multiplication driver                                               BLAS",
            "",
            "  **** **** ******  **  PROGRAM STARTED AT               2016-02-03 15:49:07.513",
            " ***** ** ***  *** **   PROGRAM STARTED ON                           lenovo700",
            " **    ****   ******    PROGRAM STARTED BY                               lauri",
            " ***** **    ** ** **   PROGRAM PROCESS ID                                7387",
            "  **** **  *******  **  PROGRAM STARTED IN /home/lauri/cp2k/si_bulk",
            "",
        ])
        .line(&format!(
            " CP2K| version string:                                          CP2K version {version}"
        ))
        .lines(&[
            " CP2K| source code revision number:                                    svn:15893",
            " CP2K| Input file name                                                si_bulk.inp",
            "",
            " GLOBAL| Force Environment number                                              1",
            " GLOBAL| Basis set file name                                           BASIS_SET",
            " GLOBAL| Potential file name                                           GTH_POTENTIALS",
            " GLOBAL| Method name                                                        CP2K",
            " GLOBAL| Project name                                                    Si_bulk",
        ])
        .line(&format!(
            " GLOBAL| Run type                                                   {run_type}"
        ))
        .lines(&[
            " GLOBAL| Global print level                                               MEDIUM",
            " GLOBAL| Total number of message passing processes                             1",
            "",
            " CELL| Volume [angstrom^3]:                                                40.041",
            " CELL| Vector a [angstrom]:       3.420     0.000     0.000   |a| =     3.420",
            " CELL| Vector b [angstrom]:       0.000     3.420     0.000   |b| =     3.420",
            " CELL| Vector c [angstrom]:       0.000     0.000     3.420   |c| =     3.420",
            "",
            " DFT| Spin restricted Kohn-Sham (RKS) calculation                            RKS",
            " DFT| Multiplicity                                                              1",
            " DFT| Charge                                                                    0",
            "",
            " FUNCTIONAL| ROUTINE=NEW",
            " FUNCTIONAL| PADE:",
            " FUNCTIONAL| S. Goedecker, M. Teter and J. Hutter, Phys. Rev. B 54, 1703 (1996)",
            "",
            " QS| Method:                                                                  GPW",
            " QS| Density cutoff [a.u.]:                                                 150.0",
            "",
            " ATOMIC KIND INFORMATION",
            "",
            "  1. Atomic kind: Si                                    Number of atoms:       2",
            "",
            "     Orbital Basis Set                                             DZVP-GTH-PADE",
            "",
            "       Number of orbital shell sets:                                           2",
            "       Number of orbital shells:                                               5",
            "       Number of primitive Cartesian functions:                                5",
            "       Number of Cartesian basis functions:                                   14",
            "       Number of spherical basis functions:                                   13",
            "",
            "     GTH Potential information for                                    GTH-PADE-q4",
            "",
            " TOTAL NUMBERS AND MAXIMUM NUMBERS",
            "",
            "  Total number of            - Atomic kinds:                                   1",
            "                             - Atoms:                                          2",
            "                             - Shell sets:                                     4",
            "",
            " MODULE QUICKSTEP:  ATOMIC COORDINATES IN angstrom",
            "",
            "  Atom  Kind  Element       X           Y           Z          Z(eff)       Mass",
            "",
            "       1     1 Si  14    0.000000    0.000000    0.000000      4.00      28.0855",
            "       2     1 Si  14    1.357674    1.357674    1.357674      4.00      28.0855",
            "",
            " SCF PARAMETERS         Density guess:                                     ATOMIC",
            "                        --------------------------------------------------------",
            "                        max_scf:                                              300",
            "                        eps_scf:                                         1.00E-07",
            "",
            " Number of electrons:                                                          8",
        ])
    }

    /// One SCF cycle with `iterations` rows, the energy breakdown and the
    /// force table.
    pub fn scf(mut self, iterations: usize, energy: f64) -> Self {
        self = self.lines(&[
            "",
            " SCF WAVEFUNCTION OPTIMIZATION",
            "",
            "  Step     Update method      Time    Convergence         Total energy    Change",
            "  ------------------------------------------------------------------------------",
        ]);
        for step in 1..=iterations {
            let total = energy + 0.1 / step as f64;
            self = self.line(&format!(
                "     {step} P_Mix/Diag. 0.40E+00    0.3     0.{:08}       {total:.10} -1.00E-02",
                75558724 / step
            ));
        }
        self.line("")
            .line(&format!(
                "  *** SCF run converged in    {iterations} steps ***"
            ))
            .lines(&[
                "",
                "  Electronic density on regular grids:        -7.9999999999        0.0000000001",
                "",
                "  Overlap energy of the core charge distribution:               0.00000000005320",
                "  Self energy of the core charge distribution:                -20.51598485628205",
                "  Core Hamiltonian energy:                                      4.51575391501421",
                "  Hartree energy:                                               5.91460756143613",
            ])
            .line(&format!(
                "  Total energy:                                               {energy:.14}"
            ))
            .line("")
            .line(&format!(
                " ENERGY| Total FORCE_EVAL ( QS ) energy (a.u.):              {energy:.15}"
            ))
            .lines(&[
                "",
                " ATOMIC FORCES in [a.u.]",
                "",
                " # Atom   Kind   Element          X              Y              Z",
                "      1      1      Si          0.00000000     0.00000000     0.00000001",
                "      2      1      Si          0.00000000    -0.00000000    -0.00000001",
                " SUM OF ATOMIC FORCES           0.00000000    -0.00000000     0.00000000     0.00000000",
            ])
    }

    pub fn geo_opt_start(self) -> Self {
        self.lines(&[
            "",
            " ***                     STARTING   GEOMETRY   OPTIMIZATION                   ***",
            " ***                                   BFGS                                    ***",
        ])
    }

    /// A numbered optimisation step; `converged` sets the RMS gradient flag.
    pub fn geo_opt_step(self, step: usize, scf_iterations: usize, converged: bool) -> Self {
        let flag = if converged { "YES" } else { "NO" };
        self.lines(&["", " --------------------------"])
            .line(&format!(" OPTIMIZATION STEP:      {step}"))
            .line(" --------------------------")
            .scf(scf_iterations, -7.8 - step as f64 * 0.001)
            .line("")
            .line(&format!(
                " --------  Informations at step =     {step} ------------"
            ))
            .lines(&[
                "  Optimization Method        =                 BFGS",
                "  Total Energy               =        -7.8111130563",
                "  Real energy change         =        -0.0000181213",
                "  Predicted change in energy =        -0.0000180906",
                "  Scaling factor             =         0.0000000000",
                "  Step size                  =         0.0047453153",
                "  Trust radius               =         0.4724315332",
                "  Decrease in energy         =                  YES",
                "  Used time                  =               2.101",
                "",
                "  Convergence check :",
                "  Max. step size             =         0.0047453153",
                "  Conv. limit for step size  =         0.0030000000",
                "  Convergence in step size   =                   NO",
                "  RMS step size              =         0.0019341637",
                "  Conv. limit for RMS step   =         0.0015000000",
                "  Convergence in RMS step    =                   NO",
                "  Max. gradient              =         0.0005024543",
                "  Conv. limit for gradients  =         0.0004500000",
                "  Conv. in gradients         =                   NO",
                "  RMS gradient               =         0.0002047810",
                "  Conv. limit for RMS grad.  =         0.0003000000",
            ])
            .line(&format!("  Conv. in RMS gradients     =                  {flag}"))
            .line(" ---------------------------------------------------")
    }

    pub fn geo_opt_completed(self) -> Self {
        self.lines(&[
            "",
            " *******************************************************************************",
            " ***                    GEOMETRY OPTIMIZATION COMPLETED                      ***",
            " *******************************************************************************",
            "",
            "                    Reevaluating energy at the minimum",
        ])
    }

    pub fn md_protocol(self, steps: usize, project: &str) -> Self {
        self.lines(&[
            "",
            " MD| Molecular Dynamics Protocol",
            " MD| Ensemble Type                                                            NVE",
        ])
        .line(&format!(
            " MD| Number of Time Steps                                                      {steps}"
        ))
        .lines(&[
            " MD| Time Step [fs]                                                         0.50",
            " MD| Temperature [K]                                                      300.00",
            " MD| Temperature tolerance [K]                                              0.00",
            " MD| Print MD information every                                          1 step(s)",
            " MD| File type     Print frequency[steps]                             File names",
        ])
        .line(&format!(
            " MD| Coordinates            1                                  {project}-pos-1.xyz"
        ))
        .line(&format!(
            " MD| Velocities             1                                  {project}-vel-1.xyz"
        ))
        .line(&format!(
            " MD| Energies               1                                  {project}-1.ener"
        ))
    }

    /// The protocol block as 5.x and later print it, tagged `MD_PAR|`.
    pub fn md_protocol_modern(self, steps: usize, project: &str) -> Self {
        self.lines(&[
            "",
            " MD_PAR| Molecular dynamics protocol (MD input parameters)",
            " MD_PAR| Ensemble type                                                          NVE",
        ])
        .line(&format!(
            " MD_PAR| Number of time steps                                                    {steps}"
        ))
        .lines(&[
            " MD_PAR| Time step [fs]                                                        0.50",
            " MD_PAR| Temperature [K]                                                     300.00",
            " MD_PAR| Temperature tolerance [K]                                             0.00",
            " MD_PAR| Print MD information every                                       1 step(s)",
            " MD_PAR| File type                               Print frequency [steps]  File names",
        ])
        .line(&format!(
            " MD_PAR| Coordinates                                            1  {project}-pos-1.xyz"
        ))
        .line(&format!(
            " MD_PAR| Velocities                                             1  {project}-vel-1.xyz"
        ))
        .line(&format!(
            " MD_PAR| Energies                                               1  {project}-1.ener"
        ))
    }

    pub fn md_initial_legacy(self) -> Self {
        self.lines(&[
            "",
            " ******************************** GO CP2K GO! **********************************",
            " INITIAL POTENTIAL ENERGY[hartree]     =                      -0.171696526131E+02",
            " INITIAL KINETIC ENERGY[hartree]       =                       0.142506013628E-02",
            " INITIAL TEMPERATURE[K]                =                                  300.000",
            " INITIAL VOLUME[bohr^3]                =                       0.134990782428E+04",
            " ******************************************************************************",
        ])
    }

    pub fn md_step_legacy(self, step: usize) -> Self {
        self.scf(5, -17.1695856312)
            .lines(&[
                "",
                " ******************************************************************************",
                " ENSEMBLE TYPE                =                                               NVE",
            ])
            .line(&format!(
                " STEP NUMBER                  =                                                 {step}"
            ))
            .line(&format!(
                " TIME [fs]                    =                                          {:.6}",
                step as f64 * 0.5
            ))
            .lines(&[
                " CONSERVED QUANTITY [hartree] =                              -0.171682282002E+02",
                "",
                "                                              INSTANTANEOUS             AVERAGES",
                " CPU TIME [s]                 =                        0.58                  0.58",
                " ENERGY DRIFT PER ATOM [K]    =          0.191361214990E-01    0.000000000000E+00",
                " POTENTIAL ENERGY[hartree]    =         -0.171695856312E+02   -0.171695856312E+02",
                " KINETIC ENERGY [hartree]     =          0.140730903083E-02    0.140730903083E-02",
                " TEMPERATURE [K]              =                    296.264               296.264",
                " ******************************************************************************",
            ])
    }

    pub fn md_initial_modern(self) -> Self {
        self.lines(&[
            "",
            " MD_INI| MD initialization",
            " MD_INI| Potential energy [hartree]                          -0.171696526131E+02",
            " MD_INI| Kinetic energy [hartree]                             0.142506013628E-02",
            " MD_INI| Temperature [K]                                                 300.000",
        ])
    }

    pub fn md_step_modern(self, step: usize) -> Self {
        self.scf(5, -17.1695856312)
            .lines(&[
                "",
                " MD| ***************************************************************************",
            ])
            .line(&format!(
                " MD| Step number                                                            {step}"
            ))
            .line(&format!(
                " MD| Time [fs]                                                       {:.6}",
                step as f64 * 0.5
            ))
            .lines(&[
                " MD| Conserved quantity [hartree]                            -0.171682282002E+02",
                " MD| ---------------------------------------------------------------------------",
                " MD|                                          Instantaneous             Averages",
                " MD| CPU time per MD step [s]                          0.58                  0.58",
                " MD| Energy drift per atom [K]           0.191361214990E-01   0.000000000000E+00",
                " MD| Potential energy [hartree]         -0.171695856312E+02  -0.171695856312E+02",
                " MD| Kinetic energy [hartree]            0.140730903083E-02   0.140730903083E-02",
                " MD| Temperature [K]                                296.264               296.264",
                " MD| ***************************************************************************",
            ])
    }

    /// Timing report and end banner.
    pub fn footer(self) -> Self {
        self.lines(&[
            "",
            " -------------------------------------------------------------------------------",
            " -                                                                             -",
            " -                                T I M I N G                                  -",
            " -                                                                             -",
            " -------------------------------------------------------------------------------",
            " CP2K                                 1  1.0    0.011    0.011    3.201    3.201",
            "",
            "  **** **** ******  **  PROGRAM ENDED AT                 2016-02-03 15:49:13.165",
        ])
    }

    pub fn build(self) -> String {
        self.text
    }
}

pub fn single_point_log(iterations: usize) -> String {
    LogBuilder::new()
        .header("2.6.2", "ENERGY_FORCE")
        .scf(iterations, -7.8111130563)
        .footer()
        .build()
}

pub fn geo_opt_log(steps: usize, scf_iterations: usize) -> String {
    let mut builder = LogBuilder::new()
        .header("2.6.2", "GEO_OPT")
        .geo_opt_start()
        .scf(scf_iterations, -7.8);
    for step in 1..=steps {
        builder = builder.geo_opt_step(step, scf_iterations, step == steps);
    }
    builder
        .geo_opt_completed()
        .scf(scf_iterations, -7.811)
        .footer()
        .build()
}

pub fn md_log(version: &str, steps: usize, project: &str) -> String {
    let modern = !version.starts_with("2.");
    let builder = LogBuilder::new().header(version, "MD");
    let mut builder = if modern {
        builder.md_protocol_modern(steps, project)
    } else {
        builder.md_protocol(steps, project)
    }
    .scf(5, -17.1696526131);
    builder = if modern {
        builder.md_initial_modern()
    } else {
        builder.md_initial_legacy()
    };
    for step in 1..=steps {
        builder = if modern {
            builder.md_step_modern(step)
        } else {
            builder.md_step_legacy(step)
        };
    }
    builder.footer().build()
}

pub fn parser(options: ParserOptions) -> Cp2kParser {
    Cp2kParser::new(options).unwrap()
}

pub fn parse(text: &str) -> (Vec<BackendEvent>, ParseOutcome) {
    parse_with(text, ParserOptions::default())
}

pub fn parse_with(text: &str, options: ParserOptions) -> (Vec<BackendEvent>, ParseOutcome) {
    let parsed = parser(options).parse_str(text, EventRecorder::new()).unwrap();
    (parsed.backend.into_events(), parsed.outcome)
}

pub fn opened(events: &[BackendEvent], section: &str) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::OpenSection { name, index } if name == section => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn closed(events: &[BackendEvent], section: &str) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::CloseSection { name, index } if name == section => Some(*index),
            _ => None,
        })
        .collect()
}

/// Scalar values named `quantity`, in event order.
pub fn values<'a>(events: &'a [BackendEvent], quantity: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::AddValue { name, value, .. } if name == quantity => Some(value),
            _ => None,
        })
        .collect()
}

/// Events emitted between the open and the close of section `index`.
pub fn inside(events: &[BackendEvent], index: usize) -> &[BackendEvent] {
    let start = events
        .iter()
        .position(|e| matches!(e, BackendEvent::OpenSection { index: i, .. } if *i == index))
        .unwrap();
    let end = events
        .iter()
        .position(|e| matches!(e, BackendEvent::CloseSection { index: i, .. } if *i == index))
        .unwrap();
    &events[start + 1..end]
}
