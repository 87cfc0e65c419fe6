use cp2k_log::{Cp2kParser, JsonTreeBackend, ParseStatus, ParserOptions};
use serde_json::Value as Json;
use std::fs;
use std::path::Path;

/// Every `*.out` log under `tests/fixtures` is parsed into a JSON tree and
/// checked against the pointers listed in its `*.expect.json`. A `null`
/// expectation means the pointer must not resolve.
#[test]
fn run_fixture_tests() {
    let fixtures_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let parser = Cp2kParser::new(ParserOptions::default()).unwrap();
    let mut checked = 0;

    for entry in fs::read_dir(&fixtures_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_none_or(|ext| ext != "out") {
            continue;
        }
        let expect_path = path.with_extension("expect.json");
        let expected: serde_json::Map<String, Json> =
            serde_json::from_str(&fs::read_to_string(&expect_path).unwrap())
                .unwrap_or_else(|e| panic!("bad expectations in {expect_path:?}: {e}"));

        let parsed = parser.parse_file(&path, JsonTreeBackend::new()).unwrap();
        assert_eq!(parsed.outcome.status, ParseStatus::Success, "{path:?}");
        assert_eq!(parsed.backend.status(), Some(ParseStatus::Success));
        let tree = parsed.backend.into_json();

        for (pointer, want) in &expected {
            let got = tree.pointer(pointer);
            if want.is_null() {
                assert!(got.is_none(), "{path:?}: {pointer} should be absent, got {got:?}");
            } else {
                assert_eq!(got, Some(want), "{path:?}: {pointer}");
            }
        }
        checked += 1;
    }
    assert!(checked > 0, "no fixtures under {fixtures_dir:?}");
}

#[test]
fn fixture_scf_cycle_ends_at_the_final_energy() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/si_bulk8_energy_force.out");
    let parsed = Cp2kParser::new(ParserOptions::default())
        .unwrap()
        .parse_file(&path, JsonTreeBackend::new())
        .unwrap();
    assert_eq!(parsed.outcome.version, "2.6.2");
    assert!(!parsed.outcome.used_fallback);

    let tree = parsed.backend.into_json();
    let calc = &tree["section_run"][0]["section_single_configuration_calculation"][0];
    let energies: Vec<f64> = calc["section_scf_iteration"]
        .as_array()
        .unwrap()
        .iter()
        .map(|it| it["energy_total_scf_iteration"].as_f64().unwrap())
        .collect();
    assert_eq!(energies.len(), 10);
    let last = energies[energies.len() - 1];
    assert!((last - calc["energy_total"].as_f64().unwrap()).abs() < 1e-8);
    assert_eq!(calc["atom_forces"].as_array().unwrap().len(), 8);
}
