use crate::ir::{BackendEvent, ParseStatus};
use crate::value::Value;
use crate::{Cp2kParser, EventRecorder, JsonTreeBackend, ParseWarning, ParserOptions};

const STARTED: &str =
    "  **** **** ******  **  PROGRAM STARTED AT               2016-05-10 13:27:35.211";
const ENDED: &str =
    "  **** **** ******  **  PROGRAM ENDED AT                 2016-05-10 13:27:38.551";

fn parse(log: &str) -> (Vec<BackendEvent>, crate::ParseOutcome) {
    let parser = Cp2kParser::new(ParserOptions::default()).unwrap();
    let parsed = parser.parse_str(log, EventRecorder::new()).unwrap();
    (parsed.backend.into_events(), parsed.outcome)
}

fn value<'a>(events: &'a [BackendEvent], quantity: &str) -> Option<&'a Value> {
    events.iter().find_map(|e| match e {
        BackendEvent::AddValue { name, value, .. } if name == quantity => Some(value),
        _ => None,
    })
}

#[test]
fn test_parse_empty_log() {
    let (events, outcome) = parse("");
    assert_eq!(outcome.status, ParseStatus::Failure);
    assert!(outcome.used_fallback);
    assert_eq!(outcome.lines, 0);
    assert!(matches!(
        events.as_slice(),
        [
            BackendEvent::StartedParsingSession { .. },
            BackendEvent::FinishedParsingSession {
                status: ParseStatus::Failure,
                ..
            }
        ]
    ));
}

#[test]
fn test_free_text_is_not_a_run() {
    let log = " DBCSR| Multiplication driver     BLAS\n\n Some unrelated banner\n";
    let (events, outcome) = parse(log);
    assert_eq!(outcome.status, ParseStatus::Failure);
    assert_eq!(outcome.lines, 3);
    assert!(!events.iter().any(|e| matches!(e, BackendEvent::OpenSection { .. })));
}

#[test]
fn test_bare_run_ends_cleanly() {
    let (events, outcome) = parse(&format!("{STARTED}\n{ENDED}\n"));
    assert_eq!(outcome.status, ParseStatus::Success);
    assert_eq!(outcome.mode, None);
    assert_eq!(value(&events, "program_name"), Some(&Value::Str("CP2K".into())));
    assert_eq!(
        value(&events, "x_cp2k_start_time"),
        Some(&Value::Str("2016-05-10 13:27:35.211".into()))
    );
    assert_eq!(value(&events, "run_clean_end"), Some(&Value::Bool(true)));
}

#[test]
fn test_restart_banner_closes_previous_run() {
    let log = format!("{STARTED}\n{STARTED}\n{ENDED}\n");
    let (events, outcome) = parse(&log);
    assert_eq!(outcome.status, ParseStatus::Success);

    let clean: Vec<&Value> = events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::AddValue { name, value, .. } if name == "run_clean_end" => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(clean, vec![&Value::Bool(false), &Value::Bool(true)]);
}

#[test]
fn test_unterminated_run_reports_open_sections() {
    let (_, outcome) = parse(&format!("{STARTED}\n"));
    assert_eq!(outcome.status, ParseStatus::Incomplete);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [ParseWarning::IncompleteRun { open_sections, line: 1 }]
            if open_sections == &["section_run"]
    ));
}

#[test]
fn test_json_tree_receives_status() {
    let parser = Cp2kParser::new(ParserOptions::default()).unwrap();
    let parsed = parser
        .parse_str(&format!("{STARTED}\n{ENDED}\n"), JsonTreeBackend::new())
        .unwrap();
    assert_eq!(parsed.backend.status(), Some(ParseStatus::Success));
    let json = parsed.backend.into_json();
    assert_eq!(json["section_run"][0]["program_name"], "CP2K");
    assert_eq!(json["section_run"][0]["run_clean_end"], true);
}
