use crate::error::ValueError;
use serde::{Deserialize, Serialize};

/// Declared type of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    FloatArray,
    StrArray,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Str => "a string",
            Self::Int => "an integer",
            Self::Float => "a float",
            Self::Bool => "a boolean",
            Self::FloatArray => "a float array",
            Self::StrArray => "a string array",
        }
    }
}

/// A scalar value, forwarded through `add_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// An array value, forwarded through `add_array_values`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArrayValue {
    Float { values: Vec<f64>, shape: Vec<usize> },
    Str(Vec<String>),
}

impl ArrayValue {
    /// Stacks equally long rows into a `[rows, width]` float array.
    ///
    /// Returns `None` when the rows are ragged.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Some(Self::Float {
            values: rows.iter().flatten().copied().collect(),
            shape: vec![rows.len(), width],
        })
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Float { shape, .. } => shape.clone(),
            Self::Str(items) => vec![items.len()],
        }
    }

    pub fn floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float { values, .. } => Some(values),
            Self::Str(_) => None,
        }
    }
}

/// Either kind of value, as held by the caching backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    Scalar(Value),
    Array(ArrayValue),
}

impl Datum {
    /// Converts captured text into the given kind.
    pub fn parse(raw: &str, kind: ValueKind) -> Result<Self, ValueError> {
        let text = raw.trim();
        let fail = || ValueError {
            raw: text.to_string(),
            expected: kind.describe(),
        };
        let datum = match kind {
            ValueKind::Str => Datum::Scalar(Value::Str(text.to_string())),
            ValueKind::Int => Datum::Scalar(Value::Int(text.parse().map_err(|_| fail())?)),
            ValueKind::Float => Datum::Scalar(Value::Float(parse_float(text).ok_or_else(fail)?)),
            ValueKind::Bool => Datum::Scalar(Value::Bool(parse_bool(text).ok_or_else(fail)?)),
            ValueKind::FloatArray => {
                let values = text
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(parse_float)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(fail)?;
                let shape = vec![values.len()];
                Datum::Array(ArrayValue::Float { values, shape })
            }
            ValueKind::StrArray => Datum::Array(ArrayValue::Str(
                text.split_whitespace().map(str::to_string).collect(),
            )),
        };
        Ok(datum)
    }

    pub fn scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Array(_) => None,
        }
    }

    pub fn array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(a) => Some(a),
            Self::Scalar(_) => None,
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<ArrayValue> for Datum {
    fn from(value: ArrayValue) -> Self {
        Self::Array(value)
    }
}

/// Parses a float, accepting Fortran `D` exponents (`1.0D-03`).
pub fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<f64>() {
        return Some(v);
    }
    if text.contains(['D', 'd']) {
        return text.replace(['D', 'd'], "E").parse().ok();
    }
    None
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_uppercase().as_str() {
        "T" | "TRUE" | "YES" | ".TRUE." => Some(true),
        "F" | "FALSE" | "NO" | ".FALSE." => Some(false),
        _ => None,
    }
}
