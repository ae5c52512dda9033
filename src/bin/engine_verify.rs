//! engine-verify: run a chart, check the structural configuration
//! invariants after every step and print W3C-style outcome lines.
//!
//! Usage:
//!   engine-verify -I chart.scjson [--xml] [-e events.jsonl]
//!                 [--advance-time N] [--lax] [--unsafe-script]
//!
//! Exit code 0 on pass, 1 on verification failure, 3 on usage/IO errors.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process;

use scjson_engine::interpreter::Runtime;
use scjson_engine::reader::ExecutionMode;
use scjson_engine::{get_arguments, init_logging, ArgOption};

fn main() {
    init_logging();
    let (named, _final_args) = get_arguments(&[
        &ArgOption::new("I").with_value().required(),
        &ArgOption::new("e").with_value(),
        &ArgOption::new("xml"),
        &ArgOption::new("advance-time").with_value(),
        &ArgOption::new("lax"),
        &ArgOption::new("unsafe-script"),
    ]);

    let chart = named.get("I").unwrap();
    let mode = if named.contains_key("lax") {
        ExecutionMode::Lax
    } else {
        ExecutionMode::Strict
    };
    let as_xml = named.contains_key("xml") || chart.ends_with(".scxml");

    let mut runtime = match load(chart, as_xml, mode) {
        Ok(rt) => rt,
        Err(msg) => {
            println!("[FAIL] {}: {}", chart, msg);
            process::exit(1);
        }
    };
    runtime.set_unsafe_script(named.contains_key("unsafe-script"));

    let mut violations: Vec<String> = Vec::new();
    let mut check = |rt: &Runtime, violations: &mut Vec<String>| {
        for v in rt.check_invariants() {
            if !violations.contains(&v) {
                violations.push(v);
            }
        }
    };

    runtime.start_machine();
    check(&runtime, &mut violations);

    if let Some(advance) = named.get("advance-time") {
        match advance.parse::<f64>() {
            Ok(seconds) => runtime.advance_time(seconds),
            Err(_) => {
                eprintln!("Invalid --advance-time value '{}'", advance);
                process::exit(3);
            }
        }
    }

    if let Some(events_path) = named.get("e") {
        let file = match File::open(events_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Can't open '{}': {}", events_path, e);
                process::exit(3);
            }
        };
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    process::exit(3);
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Bad event line '{}': {}", line, e);
                    process::exit(3);
                }
            };
            if let Some(advance) = value.get("advance").and_then(|v| v.as_f64()) {
                runtime.advance_time(advance);
            } else if let Some(name) = value.get("event").and_then(|v| v.as_str()) {
                runtime.enqueue(name, value.get("data"));
            }
            while runtime.poll_record().is_some() {
                check(&runtime, &mut violations);
            }
        }
    } else {
        while runtime.poll_record().is_some() {
            check(&runtime, &mut violations);
        }
    }

    for warning in runtime.load_warnings() {
        println!("[WARN] {}: {}", chart, warning);
    }
    if violations.is_empty() {
        println!("[PASS] {}", chart);
        process::exit(0);
    }
    for violation in &violations {
        println!("[FAIL] {}: {}", chart, violation);
    }
    process::exit(1);
}

fn load(chart: &str, as_xml: bool, mode: ExecutionMode) -> Result<Runtime, String> {
    if as_xml {
        #[cfg(feature = "xml")]
        {
            return Runtime::from_xml_file(chart, mode).map_err(|e| e.to_string());
        }
        #[cfg(not(feature = "xml"))]
        {
            return Err("XML support is not enabled".to_string());
        }
    }
    Runtime::from_json_file(chart, mode).map_err(|e| e.to_string())
}
