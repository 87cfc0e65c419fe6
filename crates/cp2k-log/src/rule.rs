//! Declarative match rules.
//!
//! A rule tree lists, in order, the sections and values expected for one run
//! mode. Trees are built once per parse and never mutated while scanning; the
//! scan loop only keeps cursors into them.

use crate::pattern::Pattern;
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Enclosing frames consulted when the current frame cannot place a line.
pub const MAX_LOOKAHEAD_DEPTH: usize = 6;

/// Calculation mode determining which body follows the shared prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    SinglePoint,
    GeometryOptimization,
    MolecularDynamics,
}

impl RunMode {
    /// Maps a `GLOBAL| Run type` value to the mode it implies.
    pub fn from_run_type(run_type: &str) -> Option<Self> {
        match run_type.trim().to_ascii_uppercase().as_str() {
            "ENERGY" | "ENERGY_FORCE" | "WAVEFUNCTION_OPTIMIZATION" | "WFN_OPT" => {
                Some(Self::SinglePoint)
            }
            "GEO_OPT" | "GEOMETRY_OPTIMIZATION" => Some(Self::GeometryOptimization),
            "MD" | "MOLECULAR_DYNAMICS" => Some(Self::MolecularDynamics),
            _ => None,
        }
    }

    pub fn sampling_method(self) -> Option<&'static str> {
        match self {
            Self::SinglePoint => None,
            Self::GeometryOptimization => Some("geometry_optimization"),
            Self::MolecularDynamics => Some("molecular_dynamics"),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SinglePoint => "single point",
            Self::GeometryOptimization => "geometry optimization",
            Self::MolecularDynamics => "molecular dynamics",
        })
    }
}

/// Coarse position of the scan within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "mode", rename_all = "snake_case")]
pub enum Phase {
    Header,
    InputEcho,
    QuickstepSetup,
    Body(RunMode),
    Footer,
    Done,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Self::Header => 0,
            Self::InputEcho => 1,
            Self::QuickstepSetup => 2,
            Self::Body(_) => 3,
            Self::Footer => 4,
            Self::Done => 5,
        }
    }

    /// Phases only move forward within a run.
    pub fn can_advance_to(self, next: Phase) -> bool {
        next.rank() > self.rank()
    }
}

/// One node of a rule tree.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub(crate) label: String,
    pub(crate) pattern: Arc<Pattern>,
    pub(crate) opens_section: bool,
    pub(crate) scope: bool,
    pub(crate) children: Arc<[MatchRule]>,
    pub(crate) repeats: bool,
    pub(crate) unordered: bool,
    pub(crate) forward: bool,
    pub(crate) end: Option<Arc<Pattern>>,
    pub(crate) fixed: Vec<(String, Value)>,
    pub(crate) switch_to: Option<RunMode>,
    pub(crate) phase: Option<Phase>,
}

impl MatchRule {
    fn new(label: &str, pattern: Pattern) -> Self {
        Self {
            label: label.to_string(),
            pattern: Arc::new(pattern),
            opens_section: false,
            scope: false,
            children: Arc::from(Vec::new()),
            repeats: false,
            unordered: false,
            forward: false,
            end: None,
            fixed: Vec::new(),
            switch_to: None,
            phase: None,
        }
    }

    /// A rule that opens section `name` when its pattern matches.
    pub fn section(name: &str, pattern: Pattern) -> Self {
        Self {
            opens_section: true,
            scope: true,
            ..Self::new(name, pattern)
        }
    }

    /// A rule that scopes its children without opening a section.
    pub fn group(label: &str, pattern: Pattern) -> Self {
        Self {
            scope: true,
            ..Self::new(label, pattern)
        }
    }

    /// A leaf emitting the pattern's captures into the innermost section.
    pub fn value(pattern: Pattern) -> Self {
        let label = pattern.name().to_string();
        Self::new(&label, pattern)
    }

    /// A leaf that swaps the enclosing frame's remaining rules for the body of
    /// `mode` and offers the same line to that body.
    pub fn switch(mode: RunMode, pattern: Pattern) -> Self {
        Self {
            switch_to: Some(mode),
            phase: Some(Phase::Body(mode)),
            ..Self::new(&format!("switch to {mode}"), pattern)
        }
    }

    pub fn children(mut self, children: Vec<MatchRule>) -> Self {
        self.children = Arc::from(children);
        self
    }

    /// Keep the rule as a candidate after it matched.
    pub fn repeats(mut self) -> Self {
        self.repeats = true;
        self
    }

    /// Every child is a candidate on every line.
    pub fn unordered(mut self) -> Self {
        self.unordered = true;
        self
    }

    /// Offer the opening line to the children as well.
    pub fn forward(mut self) -> Self {
        self.forward = true;
        self
    }

    /// Close the scope when `pattern` matches a line no child claims.
    pub fn ends_with(mut self, pattern: Pattern) -> Self {
        self.end = Some(Arc::new(pattern));
        self.scope = true;
        self
    }

    pub fn fixed(mut self, name: &str, value: Value) -> Self {
        self.fixed.push((name.to_string(), value));
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_section(&self) -> bool {
        self.opens_section
    }

    pub fn child_rules(&self) -> &[MatchRule] {
        &self.children
    }

    /// Depth-first walk over this rule and its descendants.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a MatchRule)) {
        visit(self);
        for child in self.children.iter() {
            child.walk(visit);
        }
    }
}
