//! engine-trace: run a chart against an event stream and write one
//! normalized JSON record per step.
//!
//! Usage:
//!   engine-trace -I chart.scjson [-o trace.jsonl] [-e events.jsonl]
//!                [--xml] [--advance-time N] [--leaf-only|--full-states]
//!                [--omit-actions] [--omit-delta] [--omit-transitions]
//!                [--lax] [--unsafe-script]
//!
//! Each event stream line is either {"event": name, "data": any} or
//! {"advance": seconds}.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process;

use scjson_engine::interpreter::Runtime;
use scjson_engine::reader::ExecutionMode;
use scjson_engine::{get_arguments, init_logging, ArgOption};

fn main() {
    init_logging();
    let (named, _final_args) = get_arguments(&[
        &ArgOption::new("I").with_value().required(),
        &ArgOption::new("o").with_value(),
        &ArgOption::new("e").with_value(),
        &ArgOption::new("xml"),
        &ArgOption::new("advance-time").with_value(),
        &ArgOption::new("leaf-only"),
        &ArgOption::new("full-states"),
        &ArgOption::new("omit-actions"),
        &ArgOption::new("omit-delta"),
        &ArgOption::new("omit-transitions"),
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
            eprintln!("Failed to load '{}': {}", chart, msg);
            process::exit(3);
        }
    };
    runtime.options.leaf_only = !named.contains_key("full-states");
    runtime.options.omit_actions = named.contains_key("omit-actions");
    runtime.options.omit_delta = named.contains_key("omit-delta");
    runtime.options.omit_transitions = named.contains_key("omit-transitions");
    runtime.set_unsafe_script(named.contains_key("unsafe-script"));

    let mut out: Box<dyn Write> = match named.get("o") {
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(BufWriter::new(f)),
            Err(e) => {
                eprintln!("Can't create '{}': {}", path, e);
                process::exit(3);
            }
        },
        None => Box::new(std::io::stdout()),
    };

    // Initial entry record.
    if let Some(record) = runtime.trace_step(None) {
        let _ = writeln!(out, "{}", record.to_json_line());
    }
    if let Some(advance) = named.get("advance-time") {
        match advance.parse::<f64>() {
            Ok(seconds) => runtime.advance_time(seconds),
            Err(_) => {
                eprintln!("Invalid --advance-time value '{}'", advance);
                process::exit(3);
            }
        }
        drain(&mut runtime, &mut out);
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
                drain(&mut runtime, &mut out);
            } else if let Some(name) = value.get("event").and_then(|v| v.as_str()) {
                runtime.enqueue(name, value.get("data"));
                drain(&mut runtime, &mut out);
            } else {
                eprintln!("Bad event line '{}': expected 'event' or 'advance'", line);
                process::exit(3);
            }
        }
    }

    let _ = out.flush();
}

fn drain(runtime: &mut Runtime, out: &mut Box<dyn Write>) {
    while let Some(record) = runtime.poll_record() {
        let _ = writeln!(out, "{}", record.to_json_line());
    }
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
