use crate::error::PatternError;
use crate::value::ValueKind;
use regex::Regex;

/// Float literal as printed by CP2K, including Fortran exponents.
pub const FLOAT: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eEdD][-+]?\d+)?";
/// Three whitespace separated floats.
pub const VECTOR3: &str =
    r"[-+]?\d*\.\d+(?:[eEdD][-+]?\d+)?\s+[-+]?\d*\.\d+(?:[eEdD][-+]?\d+)?\s+[-+]?\d*\.\d+(?:[eEdD][-+]?\d+)?";

/// Text pulled out of one line by a [`Pattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// Quantity the text belongs to.
    pub quantity: String,
    pub text: String,
    /// Kind declared by the pattern itself; named groups leave this to the schema.
    pub kind: Option<ValueKind>,
    pub unit: Option<String>,
}

/// A named, prefix-anchored line template.
///
/// Templates may use the `{float}` and `{vec3}` placeholders for [`FLOAT`] and
/// [`VECTOR3`]. Named capture groups yield one quantity each, named after the group. A
/// pattern without named groups yields its own name from group 1, typed with
/// the declared kind. Markers yield nothing and only trigger rules.
#[derive(Debug)]
pub struct Pattern {
    name: String,
    regex: Regex,
    kind: Option<ValueKind>,
    unit: Option<String>,
    groups: Vec<String>,
}

impl Pattern {
    /// A value pattern named after the quantity it yields.
    ///
    /// # Arguments
    ///
    /// * `name` - Quantity emitted from group 1 when the template has no named groups
    /// * `template` - Regex, anchored at the line start, with optional placeholders
    /// * `kind` - Type group 1 is parsed as
    /// * `unit` - Unit attached to the emitted value
    ///
    /// # Errors
    ///
    /// [`PatternError::Invalid`] for a template that is not a valid regex, and
    /// [`PatternError::MissingCapture`] when it has no group to emit.
    pub fn compile(
        name: &str,
        template: &str,
        kind: ValueKind,
        unit: Option<&str>,
    ) -> Result<Self, PatternError> {
        let pattern = Self::build(name, template, Some(kind), unit)?;
        if pattern.groups.is_empty() && pattern.regex.captures_len() < 2 {
            return Err(PatternError::MissingCapture {
                name: name.to_string(),
            });
        }
        Ok(pattern)
    }

    /// A pattern whose named groups (if any) are its only output.
    pub fn marker(name: &str, template: &str) -> Result<Self, PatternError> {
        Self::build(name, template, None, None)
    }

    fn build(
        name: &str,
        template: &str,
        kind: Option<ValueKind>,
        unit: Option<&str>,
    ) -> Result<Self, PatternError> {
        let template = template.replace("{float}", FLOAT).replace("{vec3}", VECTOR3);
        let anchored = if template.starts_with('^') {
            template
        } else {
            format!("^{template}")
        };
        let regex = Regex::new(&anchored).map_err(|source| PatternError::Invalid {
            name: name.to_string(),
            source: Box::new(source),
        })?;
        let groups = regex.capture_names().flatten().map(str::to_string).collect();
        Ok(Self {
            name: name.to_string(),
            regex,
            kind,
            unit: unit.map(str::to_string),
            groups,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.kind
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Quantities this pattern can yield.
    pub fn quantities(&self) -> Vec<&str> {
        if !self.groups.is_empty() {
            self.groups.iter().map(String::as_str).collect()
        } else if self.kind.is_some() {
            vec![self.name.as_str()]
        } else {
            Vec::new()
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Matches the line and returns the captured quantities, or `None` when the
    /// line does not match. Optional groups that did not participate are left out.
    pub fn captures(&self, line: &str) -> Option<Vec<Capture>> {
        let caps = self.regex.captures(line)?;
        if !self.groups.is_empty() {
            return Some(
                self.groups
                    .iter()
                    .filter_map(|group| {
                        caps.name(group).map(|m| Capture {
                            quantity: group.clone(),
                            text: m.as_str().to_string(),
                            kind: None,
                            unit: None,
                        })
                    })
                    .collect(),
            );
        }
        let Some(kind) = self.kind else {
            return Some(Vec::new());
        };
        Some(
            caps.get(1)
                .map(|m| Capture {
                    quantity: self.name.clone(),
                    text: m.as_str().to_string(),
                    kind: Some(kind),
                    unit: self.unit.clone(),
                })
                .into_iter()
                .collect(),
        )
    }
}
