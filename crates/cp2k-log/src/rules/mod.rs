//! Rule trees for CP2K output.
//!
//! The shared prefix (header, input echo, Quickstep setup) lives in
//! [`prefix`]; each run mode contributes a body that replaces the prefix once
//! its banner is seen.

mod geo_opt;
mod md;
mod prefix;
mod quickstep;

pub use geo_opt::geometry_optimization;
pub use md::molecular_dynamics;
pub use prefix::run;
pub use quickstep::{calculation, single_point};

use crate::error::PatternError;
use crate::pattern::Pattern;
use crate::rule::{MatchRule, Phase};
use crate::value::ValueKind;

/// Leaf emitting group 1 as `name`.
fn leaf(name: &str, template: &str, kind: ValueKind) -> Result<MatchRule, PatternError> {
    Ok(MatchRule::value(Pattern::compile(name, template, kind, None)?))
}

/// Leaf emitting every named group of the template.
fn fields(label: &str, template: &str) -> Result<MatchRule, PatternError> {
    Ok(MatchRule::value(Pattern::marker(label, template)?))
}

fn marker(label: &str, template: &str) -> Result<Pattern, PatternError> {
    Pattern::marker(label, template)
}

/// The timing report banner ending every body.
fn footer() -> Result<MatchRule, PatternError> {
    Ok(MatchRule::value(marker("timing report", r"\s*-\s+T I M I N G\s+-")?).phase(Phase::Footer))
}
