use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A rule template failed to compile. Raised while a rule tree is built, never
/// during a scan.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern `{name}` failed to compile: {source}")]
    Invalid {
        name: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("pattern `{name}` declares a value kind but has no capture group")]
    MissingCapture { name: String },
}

/// The embedded metainfo could not be loaded.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("metainfo is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("quantity `{quantity}` names unknown parent section `{section}`")]
    UnknownParent { quantity: String, section: String },

    #[error("section `{section}` names unknown parent section `{parent}`")]
    UnknownSectionParent { section: String, parent: String },
}

/// Options file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read options file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse options file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Section open/close bookkeeping was violated. The tracker recovers from every
/// variant; the error only reports what happened.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum SectionStateError {
    #[error("section `{name}` #{index} was never opened")]
    NeverOpened { name: String, index: usize },

    #[error("section `{name}` #{index} is already closed")]
    AlreadyClosed { name: String, index: usize },

    #[error("section #{index} is `{open}`, not `{requested}`")]
    NameMismatch {
        requested: String,
        open: String,
        index: usize,
    },

    #[error("section `{name}` #{index} closed while {forced} inner section(s) were open")]
    ClosedOutOfOrder {
        name: String,
        index: usize,
        forced: usize,
    },

    #[error("no open `{section}` section to hold `{quantity}`")]
    NoOpenParent { quantity: String, section: String },
}

/// Raw text that does not convert to the declared kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read `{raw}` as {expected}")]
pub struct ValueError {
    pub raw: String,
    pub expected: &'static str,
}

/// Problems with files referenced from the log.
#[derive(Debug, Error)]
pub enum AuxError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Errors that abort a parse.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recoverable problems met during a scan, returned with the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ParseWarning {
    /// The version id is not registered; the default rule tree was used.
    UnknownVersion {
        requested: Option<String>,
        fallback: String,
    },
    /// Input ended with sections open; they were closed innermost first.
    IncompleteRun {
        line: usize,
        open_sections: Vec<String>,
    },
    SectionState {
        line: usize,
        error: SectionStateError,
    },
    InvalidValue {
        line: usize,
        quantity: String,
        message: String,
    },
    AuxiliaryFile {
        path: PathBuf,
        message: String,
    },
    /// The mode banner disagrees with the declared run type.
    ModeMismatch {
        line: usize,
        run_type: String,
        banner: String,
    },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVersion { requested, fallback } => write!(
                f,
                "unknown version {}, using rules for {fallback}",
                requested.as_deref().unwrap_or("<none>")
            ),
            Self::IncompleteRun {
                line,
                open_sections,
            } => write!(
                f,
                "input ended at line {line} with open sections: {}",
                open_sections.join(", ")
            ),
            Self::SectionState { line, error } => write!(f, "line {line}: {error}"),
            Self::InvalidValue {
                line,
                quantity,
                message,
            } => write!(f, "line {line}: `{quantity}`: {message}"),
            Self::AuxiliaryFile { path, message } => write!(f, "{}: {message}", path.display()),
            Self::ModeMismatch {
                line,
                run_type,
                banner,
            } => write!(f, "line {line}: run type {run_type} but {banner} output found"),
        }
    }
}
