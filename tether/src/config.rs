//! Configuration file loading.
//!
//! An optional JSON object loaded on initialize into the agent's top-level
//! option store. Nested objects flatten into dotted names, so
//! `{"mqtt": {"host": "..."}}` becomes the option `mqtt.host`, the same
//! shape an application would set through `option_set`.

use std::path::Path;
use tether_types::{OptionStore, Status, Value};

/// Default file name under the agent's data directory.
pub(crate) const CONFIG_FILE: &str = "tether.conf.json";

/// Load a configuration file into `store`.
///
/// A missing file is an error only when `required` (an explicitly
/// configured path must exist; the default path is optional). A present
/// but malformed file always fails: a deployment shipped a broken config
/// and silently ignoring it would hide that.
///
/// # Errors
///
/// [`Status::FileOpenFailed`] for a required-but-missing file,
/// [`Status::IoError`] for unreadable contents, [`Status::ParseError`] for
/// malformed JSON or a non-object root, [`Status::Full`] when the store
/// overflows.
pub(crate) async fn load_into(
    store: &mut OptionStore,
    path: &Path,
    required: bool,
) -> Result<(), Status> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return if required {
                Err(Status::FileOpenFailed)
            } else {
                Ok(())
            };
        }
        Err(_) => return Err(Status::IoError),
    };
    let root: serde_json::Value =
        serde_json::from_str(&contents).map_err(|_| Status::ParseError)?;
    let serde_json::Value::Object(object) = root else {
        return Err(Status::ParseError);
    };
    flatten("", &object, store)?;
    tracing::debug!(path = %path.display(), options = store.len(), "configuration loaded");
    Ok(())
}

fn flatten(
    prefix: &str,
    object: &serde_json::Map<String, serde_json::Value>,
    store: &mut OptionStore,
) -> Result<(), Status> {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            serde_json::Value::Object(nested) => flatten(&name, nested, store)?,
            serde_json::Value::Null => store.set(&name, Value::Null)?,
            serde_json::Value::Bool(b) => store.set(&name, *b)?,
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    store.set(&name, i)?;
                } else if let Some(u) = n.as_u64() {
                    store.set(&name, u)?;
                } else {
                    store.set(&name, n.as_f64().unwrap_or(f64::NAN))?;
                }
            }
            serde_json::Value::String(s) => store.set(&name, s.as_str())?,
            // No list variant in the value model; keep the JSON text.
            serde_json::Value::Array(_) => store.set(&name, value.to_string().as_str())?,
        }
    }
    Ok(())
}
