//! The external-command adapter.
//!
//! Marshals a request's parameters onto a command line, runs the command
//! through the platform shell, and materializes the exit code and captured
//! output as the synthetic `retval`/`stdout`/`stderr` out-parameters.
//!
//! Grammar, token per parameter in declaration order:
//!
//! | kind | token |
//! |------|-------|
//! | bool | `--name=0` or `--name=1` |
//! | integers | `--name=<decimal>` |
//! | floats | `--name=<decimal-with-dot>` |
//! | string | `--name="<escaped>"` |
//! | raw | `--name=<base64>` |
//! | location | `--name=[<lat>,<lon>]` |
//! | null | `--name=[NULL]` |
//!
//! Absent optional parameters and pure `Out` declarations emit nothing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;
use std::process::Stdio;
use tether_types::limits::OUTPUT_MAX;
use tether_types::{
    ActionRequest, CompletionStatus, DurationMs, PARAM_RETVAL, PARAM_STDERR, PARAM_STDOUT,
    ParameterDecl, Status, Value,
};

/// Marker appended to a captured stream cut at [`OUTPUT_MAX`].
const TRUNCATION_MARK: &str = "…[truncated]";

/// Render one value as its command-line form.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "[NULL]".to_owned(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
        Value::Int8(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt8(v) => v.to_string(),
        Value::UInt16(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Float32(v) => format_float(f64::from(*v)),
        Value::Float64(v) => format_float(*v),
        Value::String(s) => format!("\"{}\"", escape_string(s)),
        Value::Raw(bytes) => BASE64.encode(bytes),
        Value::Location(loc) => format!("[{},{}]", loc.latitude(), loc.longitude()),
        _ => "[NULL]".to_owned(),
    }
}

/// Floats always carry a dot so a consuming script can tell them from
/// integers.
fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Backslash-escape `\` and `"`, and render control characters as C-style
/// escapes.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the full command line: the command path followed by one
/// `--name=value` token per bound parameter, in declaration order.
pub(crate) fn marshal(path: &Path, decls: &[ParameterDecl], request: &ActionRequest) -> String {
    let mut line = path.display().to_string();
    for decl in decls {
        if !decl.direction.accepts_input() {
            continue;
        }
        let Some(value) = request.param(&decl.name).and_then(|p| p.value.as_ref()) else {
            continue;
        };
        line.push_str(&format!(" --{}={}", decl.name, format_value(value)));
    }
    line
}

/// Cap a captured stream at [`OUTPUT_MAX`] bytes, marking the cut.
fn capped(bytes: &[u8]) -> String {
    if bytes.len() <= OUTPUT_MAX {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&bytes[..OUTPUT_MAX]).into_owned();
        s.push_str(TRUNCATION_MARK);
        s
    }
}

/// Run the marshalled command and write the synthetic out-parameters back
/// into the request. Returns the request's completion status.
///
/// `no_return` spawns without waiting and attaches nothing. A spawn
/// failure yields `retval = -1` with the OS error in `stderr`; a nonzero
/// exit completes as failed with the detail left readable in the
/// parameters; a time-limit expiry kills the child.
pub(crate) async fn run_command(
    path: &Path,
    decls: &[ParameterDecl],
    request: &mut ActionRequest,
    time_limit: Option<DurationMs>,
    no_return: bool,
) -> CompletionStatus {
    let line = marshal(path, decls, request);
    tracing::debug!(command = %line, "running external command");

    let mut command = tokio::process::Command::new("sh");
    command
        .arg("-c")
        .arg(&line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Fire-and-forget children must outlive the dropped handle; awaited
        // children die with a timed-out or cancelled wait.
        .kill_on_drop(!no_return);

    if no_return {
        return match command.spawn() {
            Ok(_child) => CompletionStatus::Success,
            Err(e) => {
                request.set_param(PARAM_RETVAL, -1i32);
                request.set_param(PARAM_STDOUT, "");
                request.set_param(PARAM_STDERR, e.to_string());
                CompletionStatus::Failed(Status::ExecutionError)
            }
        };
    }

    let output = match time_limit.filter(|t| !t.is_zero()) {
        Some(limit) => match tokio::time::timeout(limit.to_std(), command.output()).await {
            Ok(result) => result,
            Err(_elapsed) => {
                // Dropping the timed-out future kills the child.
                request.set_param(PARAM_RETVAL, -1i32);
                request.set_param(PARAM_STDOUT, "");
                request.set_param(PARAM_STDERR, "maximum time limit exceeded");
                return CompletionStatus::Failed(Status::TimedOut);
            }
        },
        None => command.output().await,
    };

    match output {
        Ok(output) => {
            let retval = output.status.code().unwrap_or(-1);
            request.set_param(PARAM_RETVAL, retval);
            request.set_param(PARAM_STDOUT, capped(&output.stdout));
            request.set_param(PARAM_STDERR, capped(&output.stderr));
            if output.status.success() {
                CompletionStatus::Success
            } else {
                CompletionStatus::Failed(Status::ExecutionError)
            }
        }
        Err(e) => {
            request.set_param(PARAM_RETVAL, -1i32);
            request.set_param(PARAM_STDOUT, "");
            request.set_param(PARAM_STDERR, e.to_string());
            CompletionStatus::Failed(Status::ExecutionError)
        }
    }
}
