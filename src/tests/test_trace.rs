use crate::tests::{runtime_from, step};

const CHART: &str = r#"{"name":"traced","initial":["a"],
    "datamodel":[{"data":[{"id":"n","expr":"0"}]}],
    "state":[
      {"id":"a","transition":[{"event":"go","target":["b"]}]},
      {"id":"b","onentry":[
         {"assign":[{"location":"n","expr":"n + 1"}],
          "log":[{"label":"note","expr":"'entered b'"}],
          "raise":[{"event":"ping"}]}]}]}"#;

#[test]
fn records_carry_keys_in_stable_alphabetical_order() {
    let mut rt = runtime_from(CHART);
    let record = step(&mut rt, "go");
    let line = record.to_json_line();

    let key_positions: Vec<usize> = [
        "\"actionLog\"",
        "\"configuration\"",
        "\"datamodelDelta\"",
        "\"enteredStates\"",
        "\"event\"",
        "\"exitedStates\"",
        "\"firedTransitions\"",
    ]
    .iter()
    .map(|k| line.find(k).unwrap_or_else(|| panic!("{} missing in {}", k, line)))
    .collect();
    let mut sorted = key_positions.clone();
    sorted.sort_unstable();
    assert_eq!(key_positions, sorted, "keys out of order in {}", line);
}

#[test]
fn records_capture_actions_delta_and_states() {
    let mut rt = runtime_from(CHART);
    let record = step(&mut rt, "go");

    assert_eq!(record.event["name"].as_str().unwrap(), "go");
    assert_eq!(record.entered_states, vec!["b".to_string()]);
    assert_eq!(record.exited_states, vec!["a".to_string()]);
    assert_eq!(record.configuration, vec!["b".to_string()]);

    let delta = record.datamodel_delta.unwrap();
    assert_eq!(delta.get("n"), Some(&serde_json::json!(1)));

    let log: Vec<String> = record
        .action_log
        .unwrap()
        .iter()
        .map(|e| e.entry_type.clone())
        .collect();
    // The projection orders one block's actions by kind.
    assert_eq!(log, vec!["raise", "assign", "log"]);
}

#[test]
fn trace_options_suppress_optional_sections() {
    let mut rt = runtime_from(CHART);
    rt.options.omit_actions = true;
    rt.options.omit_delta = true;
    rt.options.omit_transitions = true;
    let record = step(&mut rt, "go");
    assert!(record.action_log.is_none());
    assert!(record.datamodel_delta.is_none());
    assert!(record.fired_transitions.is_none());
    let line = record.to_json_line();
    assert!(!line.contains("actionLog"));
    assert!(!line.contains("datamodelDelta"));
    assert!(!line.contains("firedTransitions"));
}

#[test]
fn full_states_option_includes_the_whole_configuration() {
    let mut rt = runtime_from(
        r#"{"name":"nested","initial":["p"],
            "state":[{"id":"p","state":[{"id":"leaf"}]}]}"#,
    );
    rt.options.leaf_only = false;
    rt.enqueue("nop", None);
    let record = rt.poll_record().unwrap();
    assert_eq!(
        record.configuration,
        vec!["leaf".to_string(), "nested".to_string(), "p".to_string()]
    );

    rt.options.leaf_only = true;
    rt.enqueue("nop", None);
    let record = rt.poll_record().unwrap();
    assert_eq!(record.configuration, vec!["leaf".to_string()]);
}

#[test]
fn initial_record_has_a_null_event() {
    let mut rt = crate::interpreter::Runtime::from_json_str(
        CHART,
        crate::reader::ExecutionMode::Strict,
    )
    .unwrap();
    let record = rt.trace_step(None).unwrap();
    assert_eq!(record.event, serde_json::Value::Null);
    assert_eq!(record.configuration, vec!["a".to_string()]);
    assert!(record.exited_states.is_empty());
    assert!(record
        .entered_states
        .contains(&"a".to_string()));
}
