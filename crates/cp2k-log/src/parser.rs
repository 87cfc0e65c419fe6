use crate::backend::{Backend, EventRecorder};
use crate::dispatch::{HEADER_PROBE_LINES, Selection, VersionRegistry, detect_version};
use crate::engine::{RunContext, ScanResult};
use crate::error::{ParseError, ParseWarning};
use crate::ir::{BackendEvent, ParseStatus};
use crate::options::ParserOptions;
use crate::rule::{Phase, RunMode};
use crate::schema::Schema;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Parser for CP2K output logs.
///
/// A `Cp2kParser` holds only read-only state (options, version registry and
/// schema) and can be reused for any number of files. Every parse builds its
/// own [`RunContext`], so nothing carries over between runs.
#[derive(Debug, Clone)]
pub struct Cp2kParser {
    options: ParserOptions,
    registry: VersionRegistry,
    schema: Arc<Schema>,
}

/// Summary of one parse, returned next to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    /// Version whose rules were used.
    pub version: String,
    /// True when the requested or detected version was not registered.
    pub used_fallback: bool,
    pub mode: Option<RunMode>,
    pub phase: Phase,
    pub status: ParseStatus,
    pub warnings: Vec<ParseWarning>,
    /// Lines read, including the ones nothing matched.
    pub lines: usize,
}

impl ParseOutcome {
    fn from_scan<B>(selection: &Selection, scan: ScanResult<B>) -> (B, Self) {
        let outcome = Self {
            version: selection.version.clone(),
            used_fallback: selection.is_fallback(),
            mode: scan.mode,
            phase: scan.phase,
            status: scan.status,
            warnings: scan.warnings,
            lines: scan.lines,
        };
        (scan.backend, outcome)
    }
}

/// A finished parse: the backend handed in, plus what happened.
#[derive(Debug)]
pub struct Parsed<B> {
    pub backend: B,
    pub outcome: ParseOutcome,
}

impl Cp2kParser {
    /// A parser with the built-in version registry and metainfo.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Schema`] if the bundled metainfo does not load.
    pub fn new(options: ParserOptions) -> Result<Self, ParseError> {
        Ok(Self {
            options,
            registry: VersionRegistry::builtin(),
            schema: Arc::new(Schema::builtin()?),
        })
    }

    /// Replaces the version registry, e.g. to pin extra versions to a dialect.
    pub fn with_registry(mut self, registry: VersionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parses a log file. Auxiliary files it names are resolved against the
    /// file's directory.
    pub fn parse_file<B: Backend>(&self, path: &Path, backend: B) -> Result<Parsed<B>, ParseError> {
        let file = File::open(path)?;
        self.parse_reader(BufReader::new(file), Some(path), backend)
    }

    /// Parses a log held in memory.
    ///
    /// # Arguments
    ///
    /// * `text` - The whole log
    /// * `backend` - Receives the parsed sections and values
    ///
    /// # Returns
    ///
    /// The backend together with a [`ParseOutcome`]. Auxiliary files are not
    /// read since there is no directory to resolve them against.
    pub fn parse_str<B: Backend>(&self, text: &str, backend: B) -> Result<Parsed<B>, ParseError> {
        self.parse_reader(text.as_bytes(), None, backend)
    }

    /// Parses everything `reader` yields.
    ///
    /// When reading fails part way, the backend session is still finished
    /// with [`ParseStatus::Failure`] before the error is returned; pass
    /// `&mut backend` to keep what was committed up to that point.
    pub fn parse_reader<R: BufRead, B: Backend>(
        &self,
        mut reader: R,
        main_file: Option<&Path>,
        backend: B,
    ) -> Result<Parsed<B>, ParseError> {
        let Prepared {
            mut context,
            probe,
            selection,
            error,
        } = self.prepare(&mut reader, main_file, backend)?;
        for line in &probe {
            context.feed_line(line);
        }
        let mut buf = Vec::new();
        let mut failure = error;
        while failure.is_none() {
            match read_line(&mut reader, &mut buf) {
                Ok(Some(line)) => context.feed_line(&line),
                Ok(None) => break,
                Err(err) => failure = Some(err),
            }
        }
        if let Some(err) = failure {
            log::error!("read failed after line {}: {err}", context.line_number());
            context.abort(&err.to_string());
            return Err(err.into());
        }
        let (backend, outcome) = ParseOutcome::from_scan(&selection, context.finish());
        Ok(Parsed { backend, outcome })
    }

    /// Lazily parses `reader`, yielding backend events as they are committed.
    pub fn stream<R: BufRead>(
        &self,
        mut reader: R,
        main_file: Option<&Path>,
    ) -> Result<EventStream<R>, ParseError> {
        let prepared = self.prepare(&mut reader, main_file, EventRecorder::new())?;
        Ok(EventStream {
            reader,
            buf: Vec::new(),
            context: Some(prepared.context),
            replay: prepared.probe,
            deferred: prepared.error,
            pending: VecDeque::new(),
            selection: prepared.selection,
            outcome: None,
            error: None,
        })
    }

    /// Reads the header probe, picks the rules and starts the session.
    ///
    /// A read error inside the probe is handed back rather than returned, so
    /// the caller can replay what was read and then end the session.
    fn prepare<R: BufRead, B: Backend>(
        &self,
        reader: &mut R,
        main_file: Option<&Path>,
        backend: B,
    ) -> Result<Prepared<B>, ParseError> {
        let mut probe = VecDeque::new();
        let mut buf = Vec::new();
        let mut error = None;
        while probe.len() < HEADER_PROBE_LINES {
            match read_line(reader, &mut buf) {
                Ok(Some(line)) => probe.push_back(line),
                Ok(None) => break,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        let selection = match self.options.version.as_deref() {
            Some(declared) => self.registry.select(declared),
            None => match detect_version(probe.make_contiguous()) {
                Some(found) => {
                    log::debug!("detected version {found}");
                    self.registry.select(&found)
                }
                None => self.registry.select_default(),
            },
        };

        let base_dir = main_file.and_then(Path::parent).map(Path::to_path_buf);
        let mut context = RunContext::new(
            backend,
            Arc::clone(&self.schema),
            selection.factory,
            &self.options,
            base_dir,
        )?;
        let main_file = main_file.map(|p| p.display().to_string());
        context.begin(main_file.as_deref(), &selection.version);
        if let Some(warning) = selection.warning.clone() {
            context.warn(warning);
        }
        Ok(Prepared {
            context,
            probe,
            selection,
            error,
        })
    }
}

struct Prepared<B: Backend> {
    context: RunContext<B>,
    probe: VecDeque<String>,
    selection: Selection,
    error: Option<io::Error>,
}

/// Reads one line, dropping the terminator. Invalid UTF-8 is replaced rather
/// than rejected.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Backend events of one parse, produced a line at a time.
///
/// The session's closing events are yielded once the input is exhausted;
/// [`EventStream::outcome`] is available from then on.
pub struct EventStream<R> {
    reader: R,
    buf: Vec<u8>,
    context: Option<RunContext<EventRecorder>>,
    replay: VecDeque<String>,
    /// Read error met while probing, raised once the replay is drained.
    deferred: Option<io::Error>,
    pending: VecDeque<BackendEvent>,
    selection: Selection,
    outcome: Option<ParseOutcome>,
    error: Option<io::Error>,
}

impl<R> EventStream<R> {
    /// Version whose rules are in use.
    pub fn version(&self) -> &str {
        &self.selection.version
    }

    pub fn outcome(&self) -> Option<&ParseOutcome> {
        self.outcome.as_ref()
    }

    /// The read error that ended the stream early, if any.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    fn conclude(&mut self, error: Option<io::Error>) {
        let Some(context) = self.context.take() else {
            return;
        };
        let scan = match &error {
            Some(err) => {
                log::error!("read failed after line {}: {err}", context.line_number());
                context.abort(&err.to_string())
            }
            None => context.finish(),
        };
        let (recorder, outcome) = ParseOutcome::from_scan(&self.selection, scan);
        self.pending.extend(recorder.into_events());
        self.outcome = Some(outcome);
        self.error = error;
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = BackendEvent;

    fn next(&mut self) -> Option<BackendEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let context = self.context.as_mut()?;
            let line = match self.replay.pop_front() {
                Some(line) => Some(line),
                None if self.deferred.is_some() => {
                    let err = self.deferred.take();
                    self.conclude(err);
                    continue;
                }
                None => match read_line(&mut self.reader, &mut self.buf) {
                    Ok(line) => line,
                    Err(err) => {
                        self.conclude(Some(err));
                        continue;
                    }
                },
            };
            match line {
                Some(line) => {
                    context.feed_line(&line);
                    let recorder = context.backend_mut();
                    while let Some(event) = recorder.pop_front() {
                        self.pending.push_back(event);
                    }
                }
                None => self.conclude(None),
            }
        }
    }
}
