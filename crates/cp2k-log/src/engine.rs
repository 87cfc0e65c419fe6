//! The scan loop.
//!
//! A [`RunContext`] owns everything one parse needs: the section tracker, a
//! stack of cursor frames into the rule trees, the active sub-parser and the
//! warnings collected so far. Lines are fed one at a time; each is matched at
//! most once and never revisited.

use crate::backend::Backend;
use crate::caching::CachingBackend;
use crate::dispatch::RuleTreeFactory;
use crate::error::{ParseWarning, PatternError, SectionStateError};
use crate::ir::{ParseStatus, ParserInfo};
use crate::modes::{HookEnv, ModeParser, common_on_close};
use crate::options::ParserOptions;
use crate::pattern::{Capture, Pattern};
use crate::rule::{MAX_LOOKAHEAD_DEPTH, MatchRule, Phase, RunMode};
use crate::schema::Schema;
use crate::value::{Datum, Value, ValueKind};
use std::path::PathBuf;
use std::sync::Arc;

const RUN_SECTION: &str = "section_run";

/// A cursor into one level of a rule tree.
#[derive(Debug)]
struct Frame {
    label: String,
    rules: Arc<[MatchRule]>,
    cursor: usize,
    unordered: bool,
    end: Option<Arc<Pattern>>,
    /// Tracker index of the section this frame opened, if any.
    section: Option<usize>,
}

impl Frame {
    /// First rule at or after the cursor matching `line`.
    fn candidate(&self, line: &str) -> Option<(usize, Vec<Capture>)> {
        let start = if self.unordered { 0 } else { self.cursor };
        self.rules
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(slot, rule)| rule.pattern.captures(line).map(|caps| (slot, caps)))
    }
}

enum Hit {
    Rule {
        depth: usize,
        slot: usize,
        captures: Vec<Capture>,
    },
    End {
        depth: usize,
        captures: Vec<Capture>,
    },
}

/// Mode bodies, built together with the prefix so that a broken template
/// fails before the first line is read.
#[derive(Debug)]
struct Bodies {
    single_point: Arc<[MatchRule]>,
    geometry_optimization: Arc<[MatchRule]>,
    molecular_dynamics: Arc<[MatchRule]>,
}

impl Bodies {
    fn build(factory: &RuleTreeFactory) -> Result<Self, PatternError> {
        Ok(Self {
            single_point: factory.body(RunMode::SinglePoint)?.into(),
            geometry_optimization: factory.body(RunMode::GeometryOptimization)?.into(),
            molecular_dynamics: factory.body(RunMode::MolecularDynamics)?.into(),
        })
    }

    fn get(&self, mode: RunMode) -> Arc<[MatchRule]> {
        match mode {
            RunMode::SinglePoint => Arc::clone(&self.single_point),
            RunMode::GeometryOptimization => Arc::clone(&self.geometry_optimization),
            RunMode::MolecularDynamics => Arc::clone(&self.molecular_dynamics),
        }
    }
}

/// What is left once a scan has concluded.
#[derive(Debug)]
pub struct ScanResult<B> {
    pub backend: B,
    pub status: ParseStatus,
    pub mode: Option<RunMode>,
    pub phase: Phase,
    pub warnings: Vec<ParseWarning>,
    pub lines: usize,
}

/// Per-parse state. Restarting means building a new context.
pub struct RunContext<B: Backend> {
    tracker: CachingBackend<B>,
    frames: Vec<Frame>,
    bodies: Bodies,
    mode: Option<ModeParser>,
    phase: Phase,
    line: usize,
    runs: usize,
    warnings: Vec<ParseWarning>,
    base_dir: Option<PathBuf>,
    read_auxiliary_files: bool,
}

impl<B: Backend> RunContext<B> {
    /// Builds the context for one parse.
    ///
    /// # Arguments
    ///
    /// * `backend` - Receives sections and values once the tracker releases them
    /// * `schema` - Metainfo deciding where values go and how they are cached
    /// * `factory` - Rule trees for the selected version
    /// * `options` - Caching overrides, quantity filters and auxiliary file reading
    /// * `base_dir` - Directory auxiliary file names are resolved against
    ///
    /// # Returns
    ///
    /// A context positioned before the first line, in [`Phase::Header`].
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] when any rule tree fails to compile.
    pub fn new(
        backend: B,
        schema: Arc<Schema>,
        factory: RuleTreeFactory,
        options: &ParserOptions,
        base_dir: Option<PathBuf>,
    ) -> Result<Self, PatternError> {
        let root = Frame {
            label: "<root>".to_string(),
            rules: Arc::from(vec![factory.run()?]),
            cursor: 0,
            unordered: false,
            end: None,
            section: None,
        };
        let tracker = CachingBackend::new(backend, schema)
            .with_overrides(options.caching.clone())
            .with_filter(options.filter());
        Ok(Self {
            tracker,
            frames: vec![root],
            bodies: Bodies::build(&factory)?,
            mode: None,
            phase: Phase::Header,
            line: 0,
            runs: 0,
            warnings: Vec::new(),
            base_dir,
            read_auxiliary_files: options.read_auxiliary_files,
        })
    }

    /// Coarse position within the current run.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run mode of the active body, once its banner has been seen.
    pub fn mode(&self) -> Option<RunMode> {
        self.mode.map(ModeParser::mode)
    }

    /// Lines fed so far.
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Open rule frames, the root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Warnings collected so far, oldest first.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// The section tracker, for inspecting open sections and buffered values.
    pub fn tracker(&self) -> &CachingBackend<B> {
        &self.tracker
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.tracker.backend_mut()
    }

    /// Records a warning raised outside the scan loop.
    pub fn warn(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    /// Announces the session to the backend.
    pub fn begin(&mut self, main_file: Option<&str>, program_version: &str) {
        let info = ParserInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            program_version: program_version.to_string(),
        };
        self.tracker.backend_mut().started_parsing_session(main_file, &info);
    }

    /// Matches one line against the active frames.
    ///
    /// The top frame is tried first, then up to [`MAX_LOOKAHEAD_DEPTH`]
    /// enclosing frames. A match in an enclosing frame closes every frame
    /// above it. Lines nothing claims are skipped.
    ///
    /// # Arguments
    ///
    /// * `line` - One line of the log without its terminator
    pub fn feed_line(&mut self, line: &str) {
        self.line += 1;
        match self.find(line) {
            Some(Hit::Rule {
                depth,
                slot,
                captures,
            }) => {
                self.unwind_to(depth);
                self.apply(slot, captures, line);
            }
            Some(Hit::End { depth, captures }) => {
                self.unwind_to(depth);
                self.emit(captures);
                let closes_run = self.frames[depth].label == RUN_SECTION;
                self.pop_frame();
                if closes_run {
                    self.advance_phase(Phase::Done);
                }
            }
            None => {}
        }
    }

    /// Ends the scan normally.
    pub fn finish(self) -> ScanResult<B> {
        self.conclude(None)
    }

    /// Ends the scan after a read failure.
    pub fn abort(self, reason: &str) -> ScanResult<B> {
        self.conclude(Some(reason.to_string()))
    }

    fn conclude(mut self, failure: Option<String>) -> ScanResult<B> {
        let open: Vec<String> = self
            .frames
            .iter()
            .rev()
            .filter(|f| f.section.is_some())
            .map(|f| f.label.clone())
            .collect();
        if !open.is_empty() {
            log::warn!(
                "input ended at line {} with {} open section(s), closing them",
                self.line,
                open.len()
            );
            self.warnings.push(ParseWarning::IncompleteRun {
                line: self.line,
                open_sections: open.clone(),
            });
        }
        while self.frames.len() > 1 {
            self.pop_frame();
        }
        for (name, index) in self.tracker.close_all() {
            log::warn!("section `{name}` #{index} was still open in the tracker");
        }

        let status = if failure.is_some() {
            ParseStatus::Failure
        } else if self.runs == 0 {
            log::warn!("no CP2K run found in {} line(s)", self.line);
            ParseStatus::Failure
        } else if !open.is_empty() {
            ParseStatus::Incomplete
        } else {
            ParseStatus::Success
        };
        let mut errors: Vec<String> = self.warnings.iter().map(ToString::to_string).collect();
        errors.extend(failure);
        self.tracker
            .backend_mut()
            .finished_parsing_session(status, &errors);

        let mode = self.mode();
        ScanResult {
            backend: self.tracker.into_inner(),
            status,
            mode,
            phase: self.phase,
            warnings: self.warnings,
            lines: self.line,
        }
    }

    /// Searches the top frame, then up to `MAX_LOOKAHEAD_DEPTH` enclosing ones.
    /// Within a frame, rules come before its end pattern.
    fn find(&self, line: &str) -> Option<Hit> {
        let top = self.frames.len().checked_sub(1)?;
        let lowest = top.saturating_sub(MAX_LOOKAHEAD_DEPTH);
        for depth in (lowest..=top).rev() {
            let frame = &self.frames[depth];
            if let Some((slot, captures)) = frame.candidate(line) {
                return Some(Hit::Rule {
                    depth,
                    slot,
                    captures,
                });
            }
            if let Some(captures) = frame.end.as_ref().and_then(|end| end.captures(line)) {
                return Some(Hit::End { depth, captures });
            }
        }
        None
    }

    /// Closes every frame above `depth`, innermost first.
    fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth + 1 {
            self.pop_frame();
        }
    }

    /// Applies rule `slot` of the top frame to `line`.
    fn apply(&mut self, slot: usize, captures: Vec<Capture>, line: &str) {
        let Some(top) = self.frames.last_mut() else {
            return;
        };
        let rules = Arc::clone(&top.rules);
        let rule = &rules[slot];
        if !top.unordered {
            top.cursor = if rule.repeats { slot } else { slot + 1 };
        }
        log::trace!("line {}: `{}`", self.line, rule.label);

        if let Some(phase) = rule.phase {
            self.advance_phase(phase);
        }
        if let Some(mode) = rule.switch_to {
            self.emit(captures);
            self.emit_fixed(&rule.fixed);
            self.switch_mode(mode, line);
            return;
        }
        if !rule.scope {
            self.emit(captures);
            self.emit_fixed(&rule.fixed);
            return;
        }

        let section = rule.opens_section.then(|| self.open_section(&rule.label));
        self.frames.push(Frame {
            label: rule.label.clone(),
            rules: Arc::clone(&rule.children),
            cursor: 0,
            unordered: rule.unordered,
            end: rule.end.clone(),
            section,
        });
        self.emit(captures);
        self.emit_fixed(&rule.fixed);

        if rule.children.is_empty() && rule.end.is_none() {
            self.pop_frame();
        } else if rule.forward {
            self.offer(line);
        }
    }

    /// Gives the top frame's rules a look at a line that opened it.
    fn offer(&mut self, line: &str) {
        let hit = self.frames.last().and_then(|top| top.candidate(line));
        if let Some((slot, captures)) = hit {
            self.apply(slot, captures, line);
        }
    }

    /// Replaces the top frame's remaining rules with the body for `mode`.
    fn switch_mode(&mut self, mode: RunMode, line: &str) {
        self.check_run_type(mode);
        self.mode = Some(ModeParser::from(mode));
        let body = self.bodies.get(mode);
        if let Some(top) = self.frames.last_mut() {
            log::debug!("line {}: {} banner, switching rules", self.line, mode);
            top.rules = body;
            top.cursor = 0;
            top.unordered = false;
        }
        self.offer(line);
    }

    fn check_run_type(&mut self, banner: RunMode) {
        let Some(run_type) = self
            .tracker
            .latest("x_cp2k_run_type")
            .and_then(Datum::scalar)
            .and_then(Value::as_str)
        else {
            return;
        };
        if let Some(declared) = RunMode::from_run_type(run_type)
            && declared != banner
        {
            log::warn!(
                "line {}: run type {run_type} declares {declared}, output is {banner}",
                self.line
            );
            let warning = ParseWarning::ModeMismatch {
                line: self.line,
                run_type: run_type.to_string(),
                banner: banner.to_string(),
            };
            self.warnings.push(warning);
        }
    }

    fn advance_phase(&mut self, next: Phase) {
        if next == Phase::Header {
            self.phase = Phase::Header;
            self.mode = None;
        } else if self.phase.can_advance_to(next) {
            log::debug!("line {}: entering {:?}", self.line, next);
            self.phase = next;
        }
    }

    fn open_section(&mut self, name: &str) -> usize {
        if name == RUN_SECTION {
            self.runs += 1;
        }
        let index = self.tracker.open(name);
        log::trace!("line {}: open `{name}` #{index}", self.line);
        index
    }

    fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let Some(index) = frame.section {
            self.close_section(&frame.label, index);
        }
    }

    /// Runs the close hooks, then commits the section.
    fn close_section(&mut self, name: &str, index: usize) {
        let env = HookEnv {
            base_dir: self.base_dir.as_deref(),
            read_auxiliary_files: self.read_auxiliary_files,
            line: self.line,
        };
        let mut warnings = common_on_close(&mut self.tracker, name, index, &env);
        if let Some(mode) = self.mode {
            warnings.extend(mode.on_close(&mut self.tracker, name, index, &env));
        }
        self.warnings.extend(warnings);
        if let Err(error) = self.tracker.close(name, index) {
            self.state_error(error);
        }
    }

    fn emit(&mut self, captures: Vec<Capture>) {
        for capture in captures {
            let kind = capture
                .kind
                .or_else(|| {
                    self.tracker
                        .schema()
                        .quantity(&capture.quantity)
                        .map(|q| q.kind)
                })
                .unwrap_or(ValueKind::Str);
            match Datum::parse(&capture.text, kind) {
                Ok(datum) => {
                    let added =
                        self.tracker
                            .add_datum(&capture.quantity, datum, capture.unit.as_deref());
                    if let Err(error) = added {
                        self.state_error(error);
                    }
                }
                Err(error) => {
                    log::warn!("line {}: `{}`: {error}", self.line, capture.quantity);
                    self.warnings.push(ParseWarning::InvalidValue {
                        line: self.line,
                        quantity: capture.quantity,
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    fn emit_fixed(&mut self, fixed: &[(String, Value)]) {
        for (name, value) in fixed {
            if let Err(error) = self.tracker.add_value(name, value.clone(), None) {
                self.state_error(error);
            }
        }
    }

    fn state_error(&mut self, error: SectionStateError) {
        log::warn!("line {}: {error}", self.line);
        self.warnings.push(ParseWarning::SectionState {
            line: self.line,
            error,
        });
    }
}
