use crate::error::EngineError;
use crate::reader::{read_from_json_str, ExecutionMode};

#[test]
fn reader_builds_states_in_document_order() {
    let (fsm, warnings) = read_from_json_str(
        r#"{"name":"doc","initial":["a"],
            "state":[
              {"id":"a","state":[{"id":"a1"},{"id":"a2"}]},
              {"id":"b"}]}"#,
        ExecutionMode::Strict,
    )
    .unwrap();
    assert!(warnings.is_empty());

    let a = fsm.state_names.get("a").unwrap();
    let a1 = fsm.state_names.get("a1").unwrap();
    let a2 = fsm.state_names.get("a2").unwrap();
    let b = fsm.state_names.get("b").unwrap();
    let doc = |sid: &u32| fsm.get_state_by_id(*sid).doc_id;
    assert!(doc(a) < doc(a1));
    assert!(doc(a1) < doc(a2));
    assert!(doc(a2) < doc(b));
    assert_eq!(fsm.get_state_by_id(*a1).parent, *a);
}

#[test]
fn anonymous_states_receive_synthesized_ids() {
    let (fsm, _) = read_from_json_str(
        r#"{"name":"anon","state":[{"state":[{"id":"inner"}]}]}"#,
        ExecutionMode::Strict,
    )
    .unwrap();
    let inner = fsm.state_names.get("inner").unwrap();
    let parent = fsm.get_state_by_id(*inner).parent;
    assert!(fsm.state_name(parent).starts_with("__id"));
}

#[test]
fn duplicate_ids_are_a_link_error_in_strict_mode() {
    let result = read_from_json_str(
        r#"{"name":"dup","initial":["a"],"state":[{"id":"a"},{"id":"a"}]}"#,
        ExecutionMode::Strict,
    );
    assert!(matches!(result, Err(EngineError::Link(_))));
}

#[test]
fn unknown_constructs_error_in_strict_and_warn_in_lax() {
    let chart = r#"{"name":"odd","initial":["a"],
        "state":[{"id":"a","frobnicate":true}]}"#;

    assert!(matches!(
        read_from_json_str(chart, ExecutionMode::Strict),
        Err(EngineError::Schema(_))
    ));

    let (_, warnings) = read_from_json_str(chart, ExecutionMode::Lax).unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("frobnicate"));
}

#[test]
fn unknown_keys_in_nested_constructs_are_schema_issues() {
    let chart = r#"{"name":"odd2","initial":["a"],
        "state":[{"id":"a","transition":[{"event":"go",
           "send":[{"event":"x","frobnicate":1}]}]}]}"#;

    assert!(matches!(
        read_from_json_str(chart, ExecutionMode::Strict),
        Err(EngineError::Schema(_))
    ));
    let (_, warnings) = read_from_json_str(chart, ExecutionMode::Lax).unwrap();
    assert!(warnings.iter().any(|w| w.contains("frobnicate")));

    let chart = r#"{"name":"odd3","initial":["a"],
        "datamodel":[{"data":[{"id":"x","expr":"1","wobble":true}]}],
        "state":[{"id":"a",
          "invoke":[{"type":"scxml","id":"k","gizmo":1}],
          "onentry":[{"blink":[{}]}]}]}"#;

    assert!(matches!(
        read_from_json_str(chart, ExecutionMode::Strict),
        Err(EngineError::Schema(_))
    ));
    let (_, warnings) = read_from_json_str(chart, ExecutionMode::Lax).unwrap();
    assert!(warnings.iter().any(|w| w.contains("wobble")));
    assert!(warnings.iter().any(|w| w.contains("gizmo")));
    assert!(warnings.iter().any(|w| w.contains("blink")));
}

#[test]
fn unresolved_targets_make_the_transition_unselectable_in_lax() {
    let chart = r#"{"name":"broken","initial":["a"],
        "state":[
          {"id":"a","transition":[{"event":"go","target":["nowhere"]},
                                  {"event":"go","target":["b"]}]},
          {"id":"b"}]}"#;

    assert!(matches!(
        read_from_json_str(chart, ExecutionMode::Strict),
        Err(EngineError::Link(_))
    ));

    let mut rt = crate::interpreter::Runtime::from_json_str(chart, ExecutionMode::Lax).unwrap();
    let _ = rt.trace_step(None);
    assert!(!rt.load_warnings().is_empty());
    // The second transition still works.
    crate::tests::step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["b".to_string()]);
}

#[test]
fn compound_default_entry_uses_the_first_child() {
    let mut rt = crate::tests::runtime_from(
        r#"{"name":"defaults","initial":["p"],
            "state":[{"id":"p","state":[{"id":"first"},{"id":"second"}]}]}"#,
    );
    assert_eq!(rt.leaf_configuration(), vec!["first".to_string()]);
    assert!(rt.check_invariants().is_empty());
}

#[test]
fn initial_element_transition_content_runs_on_default_entry() {
    let mut rt = crate::tests::runtime_from(
        r#"{"name":"initial_el","initial":["p"],
            "datamodel":[{"data":[{"id":"ran","expr":"0"}]}],
            "state":[
              {"id":"p",
               "initial":[{"transition":{"target":["s2"],
                           "assign":[{"location":"ran","expr":"1"}]}}],
               "state":[{"id":"s1"},{"id":"s2"}]}]}"#,
    );
    assert_eq!(rt.leaf_configuration(), vec!["s2".to_string()]);
    assert_eq!(
        rt.datamodel.global().lookup("ran"),
        Some(crate::datamodel::Data::Integer(1))
    );
}

#[cfg(feature = "xml")]
#[test]
fn xml_and_json_inputs_produce_equivalent_runs() {
    let xml = "<scxml name='twin' initial='a' datamodel='python'>\
                 <datamodel><data id='flag' expr='1'/></datamodel>\
                 <state id='a'>\
                   <transition event='go' cond='flag == 1' target='b'/>\
                 </state>\
                 <state id='b'>\
                   <onentry><log expr=\"'arrived'\"/></onentry>\
                 </state>\
               </scxml>";
    let json = r#"{"name":"twin","initial":["a"],"datamodel_attribute":"python",
        "datamodel":[{"data":[{"id":"flag","expr":"1"}]}],
        "state":[
          {"id":"a","transition":[{"event":"go","cond":"flag == 1","target":["b"]}]},
          {"id":"b","onentry":[{"log":[{"expr":"'arrived'"}]}]}]}"#;

    let mut from_xml = crate::interpreter::Runtime::from_xml_str(xml, ExecutionMode::Strict).unwrap();
    let mut from_json =
        crate::interpreter::Runtime::from_json_str(json, ExecutionMode::Strict).unwrap();

    let rx = from_xml.trace_step(None).unwrap();
    let rj = from_json.trace_step(None).unwrap();
    assert_eq!(rx.to_json_line(), rj.to_json_line());

    from_xml.enqueue("go", None);
    from_json.enqueue("go", None);
    let rx = from_xml.poll_record().unwrap();
    let rj = from_json.poll_record().unwrap();
    assert_eq!(rx.to_json_line(), rj.to_json_line());
    assert_eq!(from_xml.leaf_configuration(), from_json.leaf_configuration());
}
