use crate::datamodel::Data;
use crate::fsm::Transition;
use crate::tests::{runtime_from, step};

#[test]
fn basic_transition_moves_the_configuration() {
    let mut rt = runtime_from(
        r#"{"name":"root","initial":["a"],
            "state":[
              {"id":"a","transition":[{"event":"go","target":["b"]}]},
              {"id":"b"}]}"#,
    );
    assert_eq!(rt.leaf_configuration(), vec!["a".to_string()]);

    let record = step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["b".to_string()]);
    let fired = record.fired_transitions.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].source, "a");
    assert_eq!(fired[0].targets, vec!["b".to_string()]);
    assert_eq!(fired[0].event.as_deref(), Some("go"));
}

#[test]
fn conditional_guard_controls_selection() {
    let chart = r#"{"name":"cond","initial":["a"],
        "datamodel":[{"data":[{"id":"flag","expr":"1"}]}],
        "state":[
          {"id":"a","transition":[{"event":"go","target":["b"],"cond":"flag == 1"}]},
          {"id":"b"}]}"#;

    let mut rt = runtime_from(chart);
    step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["b".to_string()]);

    let mut rt2 = runtime_from(chart);
    rt2.datamodel.global().data.set("flag", Data::Integer(0));
    let record = step(&mut rt2, "go");
    assert_eq!(rt2.leaf_configuration(), vec!["a".to_string()]);
    assert!(record.fired_transitions.unwrap().is_empty());
}

#[test]
fn state_scoped_data_shadows_the_global_store() {
    let mut rt = runtime_from(
        r#"{"name":"shadow","initial":["s"],
            "datamodel":[{"data":[{"id":"flag","expr":"0"}]}],
            "state":[
              {"id":"s",
               "datamodel":[{"data":[{"id":"flag","expr":"1"}]}],
               "transition":[{"event":"go","target":["t"],"cond":"flag == 1"}]},
              {"id":"t"}]}"#,
    );
    step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["t".to_string()]);
}

#[test]
fn shallow_history_restores_the_last_child() {
    let mut rt = runtime_from(
        r#"{"name":"hist","initial":["p"],
            "state":[
              {"id":"p","initial_attribute":["s1"],
               "history":[{"id":"h","type_value":"shallow",
                           "transition":[{"target":["s1"]}]}],
               "state":[
                 {"id":"s1","transition":[{"event":"next","target":["s2"]}]},
                 {"id":"s2"}],
               "transition":[{"event":"toQ","target":["q"]}]},
              {"id":"q","transition":[{"event":"back","target":["h"]}]}]}"#,
    );
    assert!(rt.in_configuration("p"));
    assert_eq!(rt.leaf_configuration(), vec!["s1".to_string()]);

    step(&mut rt, "next");
    assert_eq!(rt.leaf_configuration(), vec!["s2".to_string()]);

    step(&mut rt, "toQ");
    assert!(!rt.in_configuration("p"));
    assert_eq!(rt.leaf_configuration(), vec!["q".to_string()]);

    step(&mut rt, "back");
    assert!(rt.in_configuration("p"));
    assert_eq!(rt.leaf_configuration(), vec!["s2".to_string()]);
}

#[test]
fn history_with_empty_memory_uses_the_default_transition() {
    let mut rt = runtime_from(
        r#"{"name":"hist2","initial":["q"],
            "state":[
              {"id":"p","initial_attribute":["s1"],
               "history":[{"id":"h","type_value":"shallow",
                           "transition":[{"target":["s2"]}]}],
               "state":[{"id":"s1"},{"id":"s2"}]},
              {"id":"q","transition":[{"event":"enter","target":["h"]}]}]}"#,
    );
    step(&mut rt, "enter");
    // p was never exited, so the default target s2 wins.
    assert_eq!(rt.leaf_configuration(), vec!["s2".to_string()]);
}

#[test]
fn done_state_propagates_through_parallel() {
    let mut rt = runtime_from(
        r#"{"name":"par_done","initial":["par"],
            "state":[{"id":"end"}],
            "parallel":[
              {"id":"par",
               "state":[
                 {"id":"A","initial_attribute":["a1"],
                  "state":[{"id":"a1","transition":[{"event":"e1","target":["aF"]}]}],
                  "final":[{"id":"aF"}]},
                 {"id":"B","initial_attribute":["b1"],
                  "state":[{"id":"b1","transition":[{"event":"e2","target":["bF"]}]}],
                  "final":[{"id":"bF"}]}],
               "transition":[{"event":"done.state.par","target":["end"]}]}]}"#,
    );
    let leaves = rt.leaf_configuration();
    assert_eq!(leaves, vec!["a1".to_string(), "b1".to_string()]);
    assert!(rt.check_invariants().is_empty());

    step(&mut rt, "e1");
    assert_eq!(rt.leaf_configuration(), vec!["aF".to_string(), "b1".to_string()]);
    assert!(rt.check_invariants().is_empty());

    let record = step(&mut rt, "e2");
    assert_eq!(rt.leaf_configuration(), vec!["end".to_string()]);
    // The done.state.par transition commits within the same macrostep.
    let fired = record.fired_transitions.unwrap();
    assert!(fired.iter().any(|f| f.source == "par"
        && f.event.as_deref() == Some("done.state.par")));
    assert!(rt.check_invariants().is_empty());
}

#[test]
fn eventless_transitions_run_during_the_initial_macrostep() {
    let mut rt = crate::interpreter::Runtime::from_json_str(
        r#"{"name":"chain","initial":["a"],
            "state":[
              {"id":"a","transition":[{"target":["b"]}]},
              {"id":"b","transition":[{"target":["c"],"cond":"false"}]},
              {"id":"c"}]}"#,
        crate::reader::ExecutionMode::Strict,
    )
    .unwrap();
    let record = rt.trace_step(None).unwrap();
    assert_eq!(rt.leaf_configuration(), vec!["b".to_string()]);
    assert_eq!(record.event, serde_json::Value::Null);
    let fired = record.fired_transitions.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].event, None);
}

#[test]
fn targetless_transition_runs_actions_without_exit_or_entry() {
    let mut rt = runtime_from(
        r#"{"name":"internal","initial":["s"],
            "datamodel":[{"data":[{"id":"n","expr":"0"}]}],
            "state":[
              {"id":"s",
               "onentry":[{"assign":[{"location":"n","expr":"n + 10"}]}],
               "transition":[{"event":"bump","assign":[{"location":"n","expr":"n + 1"}]}]}]}"#,
    );
    assert_eq!(rt.datamodel.global().lookup("n"), Some(Data::Integer(10)));
    let record = step(&mut rt, "bump");
    // Actions ran, but onentry did not run again.
    assert_eq!(rt.datamodel.global().lookup("n"), Some(Data::Integer(11)));
    assert!(record.entered_states.is_empty());
    assert!(record.exited_states.is_empty());
    assert_eq!(rt.leaf_configuration(), vec!["s".to_string()]);
}

#[test]
fn wildcard_event_descriptors_use_dotted_prefix_matching() {
    let mut t = Transition::new();
    t.events = vec!["a".to_string()];
    assert!(t.nameMatch("a"));
    assert!(t.nameMatch("a.b"));
    assert!(t.nameMatch("a.b.c"));
    assert!(!t.nameMatch("ab"));
    assert!(!t.nameMatch("b.a"));

    t.events = vec!["a.b".to_string()];
    assert!(t.nameMatch("a.b"));
    assert!(t.nameMatch("a.b.c"));
    assert!(!t.nameMatch("a.bc"));

    t.events = vec!["a.b.d".to_string()];
    assert!(!t.nameMatch("a.b.c"));

    t.events = vec!["a.*".to_string()];
    assert!(t.nameMatch("a"));
    assert!(t.nameMatch("a.b.c"));
    assert!(!t.nameMatch("b"));

    t.events = vec!["*".to_string()];
    assert!(t.nameMatch("anything.at.all"));
}

#[test]
fn failing_condition_is_false_and_reports_an_error() {
    let mut rt = runtime_from(
        r#"{"name":"bad_cond","initial":["a"],
            "state":[
              {"id":"a","transition":[{"event":"go","target":["b"],"cond":"nosuch > 1"}]},
              {"id":"b"}]}"#,
    );
    let record = step(&mut rt, "go");
    assert_eq!(rt.leaf_configuration(), vec!["a".to_string()]);
    assert!(!record.errors.is_empty());
}

#[test]
fn reaching_the_root_final_halts_the_machine() {
    let mut rt = runtime_from(
        r#"{"name":"halting","initial":["a"],
            "state":[{"id":"a","transition":[{"event":"stop","target":["f"]}]}],
            "final":[{"id":"f","donedata":{"content":{"content":{"result":42}}}}]}"#,
    );
    step(&mut rt, "stop");
    assert!(!rt.is_running());
    match rt.done_data() {
        Some(Data::Map(m)) => assert_eq!(m.get("result"), Some(&Data::Integer(42))),
        other => panic!("Unexpected done data {:?}", other),
    }
    // Further events are refused.
    rt.enqueue("stop", None);
    assert!(rt.poll_record().is_none());
}

#[test]
fn internal_events_drain_before_external_ones() {
    let mut rt = runtime_from(
        r#"{"name":"prio","initial":["a"],
            "state":[
              {"id":"a","transition":[{"event":"go","target":["b"],
                  "raise":[{"event":"inner"}]}]},
              {"id":"b","transition":[
                  {"event":"inner","target":["c"]},
                  {"event":"late","target":["d"]}]},
              {"id":"c"},{"id":"d"}]}"#,
    );
    // "late" is queued behind "go", but the raised internal event is
    // processed within go's macrostep, before "late" is even considered.
    rt.enqueue("go", None);
    rt.enqueue("late", None);
    let first = rt.poll_record().unwrap();
    assert_eq!(rt.leaf_configuration(), vec!["c".to_string()]);
    let fired = first.fired_transitions.unwrap();
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[1].event.as_deref(), Some("inner"));
    // "late" finds c, which has no matching transition.
    rt.poll_record().unwrap();
    assert_eq!(rt.leaf_configuration(), vec!["c".to_string()]);
}

#[test]
fn foreach_iterates_and_binds_loop_variables() {
    let mut rt = runtime_from(
        r#"{"name":"loop","initial":["s"],
            "datamodel":[{"data":[{"id":"total","expr":"0"},{"id":"item","expr":"0"},{"id":"i","expr":"0"}]}],
            "state":[
              {"id":"s","transition":[{"event":"run",
                 "foreach":[{"array":"[3, 4, 5]","item":"item","index":"i",
                             "assign":[{"location":"total","expr":"total + item + i"}]}]}]}]}"#,
    );
    step(&mut rt, "run");
    // 3+0 + 4+1 + 5+2
    assert_eq!(rt.datamodel.global().lookup("total"), Some(Data::Integer(15)));
}

#[test]
fn if_else_chains_pick_the_first_true_branch() {
    let mut rt = runtime_from(
        r#"{"name":"branchy","initial":["s"],
            "datamodel":[{"data":[{"id":"x","expr":"2"},{"id":"hit","expr":"''"}]}],
            "state":[
              {"id":"s","transition":[{"event":"run",
                 "if":[{"cond":"x == 1","then":{"assign":[{"location":"hit","expr":"'one'"}]},
                        "elseif":[{"cond":"x == 2","then":{"assign":[{"location":"hit","expr":"'two'"}]}}],
                        "else":{"assign":[{"location":"hit","expr":"'other'"}]}}]}]}]}"#,
    );
    step(&mut rt, "run");
    assert_eq!(
        rt.datamodel.global().lookup("hit"),
        Some(Data::String("two".to_string()))
    );
}
