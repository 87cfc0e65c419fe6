use crate::value::{ArrayValue, Value};
use serde::{Deserialize, Serialize};

/// Identifies the parser to the backend when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParserInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Program version the rule tree was selected for.
    pub program_version: String,
}

/// How a parse session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Every run that was opened also ended.
    Success,
    /// End of input reached with sections still open.
    Incomplete,
    /// No run was found, or reading failed.
    Failure,
}

/// One call made on a backend, in the order it was made.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackendEvent {
    StartedParsingSession {
        main_file: Option<String>,
        parser: ParserInfo,
    },
    OpenSection {
        name: String,
        index: usize,
    },
    CloseSection {
        name: String,
        index: usize,
    },
    AddValue {
        name: String,
        value: Value,
        index: usize,
    },
    AddArrayValues {
        name: String,
        values: ArrayValue,
        index: usize,
    },
    FinishedParsingSession {
        status: ParseStatus,
        errors: Vec<String>,
    },
}

impl BackendEvent {
    /// Name of the section or quantity the event concerns.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::OpenSection { name, .. }
            | Self::CloseSection { name, .. }
            | Self::AddValue { name, .. }
            | Self::AddArrayValues { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::OpenSection { index, .. }
            | Self::CloseSection { index, .. }
            | Self::AddValue { index, .. }
            | Self::AddArrayValues { index, .. } => Some(*index),
            _ => None,
        }
    }
}
