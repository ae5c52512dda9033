use crate::datamodel::Data;
use crate::tests::{runtime_from, step};

#[test]
fn delayed_send_fires_after_advance_time() {
    let mut rt = runtime_from(
        r#"{"name":"delayed","initial":["S"],
            "state":[
              {"id":"S",
               "onentry":[{"send":[{"event":"t","delay":"100ms"}]}],
               "transition":[{"event":"t","target":["T"]}]},
              {"id":"T"}]}"#,
    );
    // Nothing is due yet.
    assert!(rt.poll_record().is_none());
    rt.advance_time(0.05);
    assert!(rt.poll_record().is_none());
    rt.advance_time(0.05);
    let record = rt.poll_record().expect("t is delivered");
    assert_eq!(record.event["name"].as_str().unwrap(), "t");
    assert_eq!(rt.leaf_configuration(), vec!["T".to_string()]);
}

#[test]
fn cancel_prevents_a_pending_delayed_send() {
    let mut rt = runtime_from(
        r#"{"name":"cancelled","initial":["S"],
            "state":[
              {"id":"S",
               "onentry":[{"send":[{"event":"t","delay":"100ms","id":"k"}]}],
               "transition":[
                 {"event":"cancelKey","cancel":[{"sendid":"k"}]},
                 {"event":"t","target":["T"]}]},
              {"id":"T"}]}"#,
    );
    step(&mut rt, "cancelKey");
    rt.advance_time(0.2);
    // No "t" event is delivered and no transition for it fires.
    assert!(rt.poll_record().is_none());
    assert_eq!(rt.leaf_configuration(), vec!["S".to_string()]);
}

#[test]
fn cancelling_an_unknown_send_id_is_a_silent_noop() {
    let mut rt = runtime_from(
        r#"{"name":"noop","initial":["S"],
            "state":[{"id":"S","transition":[{"event":"go","cancel":[{"sendid":"nothing"}]}]}]}"#,
    );
    let record = step(&mut rt, "go");
    assert!(record.errors.is_empty());
    assert!(rt.is_running());
}

#[test]
fn delayed_sends_with_equal_due_time_preserve_schedule_order() {
    let mut rt = runtime_from(
        r#"{"name":"ordered","initial":["S"],
            "datamodel":[{"data":[{"id":"seq","expr":"[]"}]}],
            "state":[
              {"id":"S",
               "onentry":[{"send":[{"event":"first","delay":"10ms"},
                                   {"event":"second","delay":"10ms"}]}],
               "transition":[
                 {"event":"first","assign":[{"location":"seq","expr":"seq + ['first']"}]},
                 {"event":"second","assign":[{"location":"seq","expr":"seq + ['second']"}]}]}]}"#,
    );
    rt.advance_time(0.01);
    rt.run_to_idle();
    assert_eq!(
        rt.datamodel.global().lookup("seq"),
        Some(Data::Array(vec![
            Data::String("first".to_string()),
            Data::String("second".to_string())
        ]))
    );
}

#[test]
fn internal_target_bypasses_the_external_queue() {
    // An event sent to #_internal is consumed in the same macrostep, ahead
    // of anything in the external queue.
    let mut rt = runtime_from(
        r##"{"name":"internal_send","initial":["a"],
            "state":[
              {"id":"a","transition":[{"event":"go","target":["b"],
                 "send":[{"event":"inner","target":"#_internal"}]}]},
              {"id":"b","transition":[{"event":"inner","target":["c"]}]},
              {"id":"c"}]}"##,
    );
    step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["c".to_string()]);
}

#[test]
fn delayed_internal_send_is_an_execution_error() {
    let mut rt = runtime_from(
        r##"{"name":"bad_delay","initial":["a"],
            "state":[
              {"id":"a","transition":[{"event":"go",
                 "send":[{"event":"inner","target":"#_internal","delay":"5ms"}]}]}]}"##,
    );
    let record = step(&mut rt, "go");
    assert!(!record.errors.is_empty());
    assert!(rt.is_running());
}

#[test]
fn exit_cancels_sends_scheduled_with_idlocation() {
    let mut rt = runtime_from(
        r#"{"name":"exit_cancel","initial":["S"],
            "datamodel":[{"data":[{"id":"kid","expr":"''"}]}],
            "state":[
              {"id":"S",
               "onentry":[{"send":[{"event":"t","delay":"50ms","idlocation":"kid"}]}],
               "transition":[{"event":"leave","target":["T"]}]},
              {"id":"T","transition":[{"event":"t","target":["U"]}]},
              {"id":"U"}]}"#,
    );
    // The generated send id was stored at the location.
    match rt.datamodel.global().lookup("kid") {
        Some(Data::String(id)) => assert!(!id.is_empty()),
        other => panic!("Unexpected idlocation value {:?}", other),
    }
    step(&mut rt, "leave");
    rt.advance_time(0.1);
    // Exiting S cancelled the pending send; "t" never arrives.
    assert!(rt.poll_record().is_none());
    assert_eq!(rt.leaf_configuration(), vec!["T".to_string()]);
}

#[test]
fn send_with_namelist_and_params_builds_the_payload() {
    let mut rt = runtime_from(
        r#"{"name":"payload","initial":["a"],
            "datamodel":[{"data":[{"id":"x","expr":"5"},{"id":"y","expr":"0"}]}],
            "state":[
              {"id":"a","transition":[{"event":"go","target":["b"],
                 "send":[{"event":"packed","namelist":"x","param":[{"name":"double","expr":"x * 2"}]}]}]},
              {"id":"b","transition":[{"event":"packed","target":["c"],
                 "assign":[{"location":"y","expr":"_event.data.double"}]}]},
              {"id":"c"}]}"#,
    );
    step(&mut rt, "go");
    let record = rt.poll_record().expect("packed arrives");
    assert_eq!(record.event["name"].as_str().unwrap(), "packed");
    assert_eq!(record.event["data"]["x"], serde_json::json!(5));
    assert_eq!(rt.datamodel.global().lookup("y"), Some(Data::Integer(10)));
    assert_eq!(rt.leaf_configuration(), vec!["c".to_string()]);
}
