// src/bin/stub-adapter.rs

//! Minimal message adapter speaking the `stream` protocol.
//!
//! It understands the three commands well enough for local runs and the
//! integration tests:
//!
//! - `loadAndUpdateRemoteEvent`: resolves `replace.Path` from a local file,
//!   unwraps a `cma.event` wrapper and makes sure `payload` exists.
//! - `loadNestedEvent`: `{input: payload, config: workflow_config[task]}`,
//!   plus `cumulus_config` and `messageConfig` when the message carries them.
//! - `createNextEvent`: the message with `payload` set to the handler response.
//!
//! Behaviour can be steered per message with a `stub_adapter` object on the
//! event (see [`Directives`]). It is stripped from the final message.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

const END_OF_COMMAND: &str = "<EOC>";
const EXIT_SIGNAL: &str = "<EXIT>";
const DIRECTIVES_KEY: &str = "stub_adapter";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Directives {
    /// Exit without answering when this command arrives.
    fail_on: Option<String>,
    /// Written to stderr before a `fail_on` exit.
    stderr: String,
    exit_code: Option<u8>,
    /// Canned responses by command name, sent instead of the computed one.
    respond: Map<String, Value>,
    /// Stop reading when this command arrives and never answer.
    hang_on: Option<String>,
}

fn main() -> ExitCode {
    match serve(io::stdin().lock(), io::stdout().lock()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("stub-adapter: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn serve(mut input: impl BufRead, mut output: impl Write) -> Result<ExitCode> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(ExitCode::SUCCESS);
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        match command.as_str() {
            "" => continue,
            EXIT_SIGNAL => return Ok(ExitCode::SUCCESS),
            _ => {}
        }

        let request = read_request(&mut input)?;
        let directives = directives_of(&request);

        if directives.hang_on.as_deref() == Some(command.as_str()) {
            loop {
                std::thread::park();
            }
        }

        if directives.fail_on.as_deref() == Some(command.as_str()) {
            eprint!("{}", directives.stderr);
            io::stderr().flush()?;
            return Ok(ExitCode::from(directives.exit_code.unwrap_or(1)));
        }

        let response = match directives.respond.get(&command) {
            Some(canned) => canned.clone(),
            None => dispatch(&command, request)?,
        };
        write_response(&mut output, &response)?;
    }
}

/// Collect JSON lines until the one ending with `<EOC>`.
fn read_request(input: &mut impl BufRead) -> Result<Value> {
    let mut body = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            bail!("input closed before {END_OF_COMMAND}");
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = trimmed.strip_suffix(END_OF_COMMAND) {
            body.push_str(rest);
            break;
        }
        body.push_str(trimmed);
    }
    serde_json::from_str(&body).context("request body is not JSON")
}

fn directives_of(request: &Value) -> Directives {
    request
        .pointer(&format!("/event/{DIRECTIVES_KEY}"))
        .and_then(|d| serde_json::from_value(d.clone()).ok())
        .unwrap_or_default()
}

fn dispatch(command: &str, request: Value) -> Result<Value> {
    let Value::Object(mut request) = request else {
        bail!("request for {command} is not an object");
    };
    let event = request.remove("event").unwrap_or(Value::Null);

    match command {
        "loadAndUpdateRemoteEvent" => load_remote(event),
        "loadNestedEvent" => Ok(load_nested(&event)),
        "createNextEvent" => {
            let response = request.remove("handler_response").unwrap_or(Value::Null);
            Ok(create_next(event, response))
        }
        other => Err(anyhow!("unknown command {other:?}")),
    }
}

fn load_remote(event: Value) -> Result<Value> {
    let mut message = match event {
        Value::Object(mut map) if map.contains_key("cma") => map
            .remove("cma")
            .and_then(|cma| cma.get("event").cloned())
            .unwrap_or(Value::Null),
        other => other,
    };

    if let Some(path) = message.pointer("/replace/Path").and_then(Value::as_str) {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading remote message {path}"))?;
        message = serde_json::from_str(&raw).context("remote message is not JSON")?;
    }

    let Value::Object(mut map) = message else {
        bail!("message is not an object");
    };
    map.entry("payload").or_insert(Value::Null);
    Ok(Value::Object(map))
}

fn load_nested(event: &Value) -> Value {
    let mut nested = Map::new();
    nested.insert(
        "input".into(),
        event.get("payload").cloned().unwrap_or(Value::Null),
    );

    let config = event
        .pointer("/cumulus_meta/task")
        .and_then(Value::as_str)
        .and_then(|task| event.get("workflow_config")?.get(task).cloned())
        .unwrap_or_else(|| Value::Object(Map::new()));
    if let Some(message_config) = config.get("cumulus_message") {
        nested.insert("messageConfig".into(), message_config.clone());
    }
    nested.insert("config".into(), config);

    if let Some(ctx) = event.pointer("/cumulus_meta/cumulus_context") {
        let mut cumulus_config = Map::new();
        cumulus_config.insert("cumulus_context".into(), ctx.clone());
        nested.insert("cumulus_config".into(), Value::Object(cumulus_config));
    }

    Value::Object(nested)
}

fn create_next(event: Value, response: Value) -> Value {
    let mut map = match event {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.remove(DIRECTIVES_KEY);
    map.insert("payload".into(), response);
    Value::Object(map)
}

/// Pretty JSON with `<EOC>` glued to the last line, the way the real adapter
/// answers.
fn write_response(output: &mut impl Write, response: &Value) -> Result<()> {
    let body = serde_json::to_string_pretty(response)?;
    writeln!(output, "{body}{END_OF_COMMAND}")?;
    output.flush()?;
    Ok(())
}
