use crate::datamodel::Data;
use crate::tests::{runtime_from, step};

const CHILD: &str = r#"{"name":"C","initial":["c0"],
    "state":[{"id":"c0","transition":[{"event":"complete","target":["cF"]}]}],
    "final":[{"id":"cF"}]}"#;

fn invoking_chart() -> String {
    format!(
        r#"{{"name":"root","initial":["S"],
            "datamodel":[{{"data":[{{"id":"seen","expr":"0"}}]}}],
            "state":[
              {{"id":"S",
               "invoke":[{{"type":"scxml","id":"child1","autoforward":true,
                          "content":{{"content":{child}}},
                          "finalize":[{{"assign":[{{"location":"seen","expr":"1"}}]}}]}}],
               "transition":[{{"event":"done.invoke.*","target":["T"]}}]}},
              {{"id":"T"}}]}}"#,
        child = CHILD
    )
}

#[test]
fn finalize_runs_before_done_invoke_is_visible() {
    let mut rt = runtime_from(&invoking_chart());
    assert_eq!(rt.leaf_configuration(), vec!["S".to_string()]);

    // "complete" is autoforwarded; the child finishes, finalize runs, and
    // done.invoke.child1 lands in the external queue.
    let record = step(&mut rt, "complete");
    assert!(record.fired_transitions.unwrap().is_empty());
    assert_eq!(rt.datamodel.global().lookup("seen"), Some(Data::Integer(1)));
    assert_eq!(rt.leaf_configuration(), vec!["S".to_string()]);

    // The next step consumes done.invoke.<id> and takes S -> T.
    let record = rt.poll_record().expect("done.invoke is queued");
    assert_eq!(
        record.event["name"].as_str().unwrap(),
        "done.invoke.child1"
    );
    assert_eq!(rt.leaf_configuration(), vec!["T".to_string()]);
    assert_eq!(rt.datamodel.global().lookup("seen"), Some(Data::Integer(1)));
}

#[test]
fn parallel_invokes_finalize_before_either_done_invoke() {
    let chart = format!(
        r#"{{"name":"root","initial":["par"],
            "datamodel":[{{"data":[{{"id":"fa","expr":"0"}},{{"id":"fb","expr":"0"}},{{"id":"order","expr":"[]"}}]}}],
            "state":[{{"id":"end"}}],
            "parallel":[
              {{"id":"par",
               "state":[
                 {{"id":"RA","invoke":[{{"type":"scxml","id":"cA","autoforward":true,
                     "content":{{"content":{child}}},
                     "finalize":[{{"assign":[{{"location":"fa","expr":"1"}},
                                            {{"location":"order","expr":"order + ['a']"}}]}}]}}]}},
                 {{"id":"RB","invoke":[{{"type":"scxml","id":"cB","autoforward":true,
                     "content":{{"content":{child}}},
                     "finalize":[{{"assign":[{{"location":"fb","expr":"1"}},
                                            {{"location":"order","expr":"order + ['b']"}}]}}]}}]}}]}}]}}"#,
        child = CHILD
    );
    let mut rt = runtime_from(&chart);

    // Both children complete while the same external event is processed.
    step(&mut rt, "complete");
    assert_eq!(rt.datamodel.global().lookup("fa"), Some(Data::Integer(1)));
    assert_eq!(rt.datamodel.global().lookup("fb"), Some(Data::Integer(1)));
    assert_eq!(
        rt.datamodel.global().lookup("order"),
        Some(Data::Array(vec![
            Data::String("a".to_string()),
            Data::String("b".to_string())
        ]))
    );

    // done.invoke events arrive in child declaration order.
    let first = rt.poll_record().expect("first done.invoke");
    assert_eq!(first.event["name"].as_str().unwrap(), "done.invoke.cA");
    let second = rt.poll_record().expect("second done.invoke");
    assert_eq!(second.event["name"].as_str().unwrap(), "done.invoke.cB");
}

#[test]
fn exiting_the_invoking_state_cancels_the_child() {
    let chart = format!(
        r#"{{"name":"root","initial":["S"],
            "state":[
              {{"id":"S",
               "invoke":[{{"type":"scxml","id":"child1","autoforward":true,
                          "content":{{"content":{child}}}}}],
               "transition":[
                  {{"event":"leave","target":["T"]}},
                  {{"event":"done.invoke.*","target":["U"]}}]}},
              {{"id":"T"}},{{"id":"U"}}]}}"#,
        child = CHILD
    );
    let mut rt = runtime_from(&chart);
    step(&mut rt, "leave");
    assert_eq!(rt.leaf_configuration(), vec!["T".to_string()]);
    // No done.invoke arrives after the cancellation.
    rt.enqueue("complete", None);
    rt.poll_record();
    assert!(rt.poll_record().is_none());
    assert_eq!(rt.leaf_configuration(), vec!["T".to_string()]);
}

#[test]
fn child_payload_is_injected_before_entry() {
    // The child reports its payload back through a #_parent send in its
    // onentry handler, which runs after payload injection.
    let child = r##"{"name":"C","initial":["c0"],
        "state":[{"id":"c0",
          "onentry":[{"send":[{"event":"got","target":"#_parent","namelist":"x"}]}]}]}"##;
    let chart = format!(
        r#"{{"name":"root","initial":["S"],
            "datamodel":[{{"data":[{{"id":"x","expr":"41"}},{{"id":"echo","expr":"0"}}]}}],
            "state":[
              {{"id":"S",
               "invoke":[{{"type":"scxml","id":"kid","content":{{"content":{child}}},
                          "param":[{{"name":"x","expr":"x + 1"}}]}}],
               "transition":[{{"event":"got",
                  "assign":[{{"location":"echo","expr":"_event.data.x"}}]}}]}}]}}"#,
        child = child
    );
    let mut rt = runtime_from(&chart);
    // The bubbled "got" event is already in the parent's external queue.
    let record = rt.poll_record().expect("bubbled event");
    assert_eq!(record.event["name"].as_str().unwrap(), "got");
    assert_eq!(rt.datamodel.global().lookup("echo"), Some(Data::Integer(42)));
}

#[test]
fn invoked_child_from_srcless_invoke_without_content_raises_an_error() {
    let mut rt = runtime_from(
        r#"{"name":"root","initial":["S"],
            "state":[{"id":"S","invoke":[{"type":"scxml","id":"broken"}]}]}"#,
    );
    // The invoke failed with error.communication; the machine keeps running.
    assert!(rt.is_running());
    assert!(rt.datamodel.global().child_sessions.is_empty());
}
