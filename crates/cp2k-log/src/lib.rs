//! # CP2K Log Parser
//!
//! Rule-driven parser for CP2K output logs with a caching section backend.
//!
//! ## Overview
//!
//! This crate turns the free-form text CP2K writes to standard output into
//! a stream of section and value events for a storage [`Backend`]. It handles:
//!
//! - **Run modes**: single point, geometry optimisation and molecular dynamics
//! - **Version drift**: rule trees are chosen from the `CP2K| version string`
//!   banner, with a default for versions nobody registered
//! - **Lookbehind corrections**: values are buffered per open section and only
//!   committed when it closes, so close hooks can still derive and fix values
//! - **Partial logs**: a truncated run still yields everything read so far
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   lines    ┌────────────┐   open/add/close   ┌────────────────┐
//! │   log file   │ ─────────► │ RunContext │ ─────────────────► │ CachingBackend │
//! └──────────────┘            │  (frames)  │                    └────────────────┘
//!                             └────────────┘                            │ on close
//!                                   ▲                                   ▼
//!                        rule trees │                            ┌─────────────┐
//!                            ┌─────────────────┐                 │   Backend   │
//!                            │ VersionRegistry │                 └─────────────┘
//!                            └─────────────────┘
//! ```
//!
//! - [`pattern`]: anchored line templates bound to quantity names
//! - [`rule`] and [`rules`]: the rule trees, one shared prefix plus one body
//!   per run mode
//! - [`dispatch`]: version detection and rule tree selection
//! - [`caching`]: the section-state tracker in front of the backend
//! - [`modes`]: close hooks for each run mode
//! - [`engine`]: the single-pass scan loop
//! - [`auxiliary`]: readers for the energy and trajectory files MD runs write
//!
//! ## Examples
//!
//! ### Parsing a file into a JSON tree
//!
//! ```no_run
//! use cp2k_log::{Cp2kParser, JsonTreeBackend, ParserOptions};
//! use std::path::Path;
//!
//! let parser = Cp2kParser::new(ParserOptions::default())?;
//! let parsed = parser.parse_file(Path::new("si_bulk8.out"), JsonTreeBackend::new())?;
//! println!("{:?} with {} warning(s)", parsed.outcome.status, parsed.outcome.warnings.len());
//! println!("{}", serde_json::to_string_pretty(&parsed.backend.into_json())?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Streaming events
//!
//! ```
//! use cp2k_log::{BackendEvent, Cp2kParser, ParserOptions};
//!
//! let log = " **** **** ******  **  PROGRAM STARTED AT               2016-02-03 15:49:07.513\n";
//! let parser = Cp2kParser::new(ParserOptions::default())?;
//! let opened: Vec<String> = parser
//!     .stream(log.as_bytes(), None)?
//!     .filter_map(|event| match event {
//!         BackendEvent::OpenSection { name, .. } => Some(name),
//!         _ => None,
//!     })
//!     .collect();
//! assert_eq!(opened, ["section_run"]);
//! # Ok::<(), cp2k_log::ParseError>(())
//! ```

pub mod auxiliary;
/// Storage boundary and bundled backends.
pub mod backend;
pub mod caching;
pub mod dispatch;
/// Single-pass scan loop.
pub mod engine;
pub mod error;
/// Backend event IR.
pub mod ir;
pub mod modes;
pub mod options;
pub mod parser;
pub mod pattern;
pub mod rule;
pub mod rules;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;

pub use backend::{Backend, EventRecorder, JsonTreeBackend};
pub use caching::{CachingBackend, CachingLevel};
pub use dispatch::{Dialect, VersionRegistry};
pub use error::{ParseError, ParseWarning};
pub use ir::{BackendEvent, ParseStatus};
pub use options::ParserOptions;
pub use parser::{Cp2kParser, EventStream, ParseOutcome, Parsed};
pub use rule::{Phase, RunMode};
pub use value::{ArrayValue, Value};
