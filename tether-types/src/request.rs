//! Action parameters, requests, and completion results.

use crate::error::Status;
use crate::option::OptionStore;
use crate::value::{Convert, FromValue, Value, ValueKind};
use serde::{Deserialize, Serialize};

/// Name of the synthetic parameter carrying a diagnostic message when the
/// dispatcher fails a request before or instead of its handler.
pub const PARAM_ERROR: &str = "error";
/// Name of the synthetic parameter carrying an external command's exit code.
pub const PARAM_RETVAL: &str = "retval";
/// Name of the synthetic parameter carrying an external command's stdout.
pub const PARAM_STDOUT: &str = "stdout";
/// Name of the synthetic parameter carrying an external command's stderr.
pub const PARAM_STDERR: &str = "stderr";

/// Which way a declared parameter flows.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Caller may supply a value; the handler only reads it.
    In,
    /// Caller must supply a value; the handler only reads it.
    InRequired,
    /// The handler writes a value; the transport returns it.
    Out,
    /// Caller may supply a value and the handler may write one back.
    InOut,
}

impl Direction {
    /// Whether a request may bind a value to this parameter.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Direction::In | Direction::InRequired | Direction::InOut)
    }

    /// Whether a request must bind a value to this parameter.
    pub fn requires_input(&self) -> bool {
        matches!(self, Direction::InRequired)
    }

    /// Whether the handler's value for this parameter is returned.
    pub fn returns_output(&self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// An action's declared parameter. Declaration order is stable and visible
/// to external commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    /// Parameter name, unique within the action.
    pub name: String,
    /// Flow direction.
    pub direction: Direction,
    /// Declared value kind.
    pub kind: ValueKind,
}

impl ParameterDecl {
    /// Declare a parameter.
    pub fn new(name: impl Into<String>, direction: Direction, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
        }
    }
}

/// A value bound to a parameter name inside a request or result.
///
/// `value: None` models an absent binding: an `Out` parameter before the
/// handler runs, or an optional `In` the caller skipped. A bound
/// [`Value::Null`] is present and empty, not absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// The bound value, if any.
    pub value: Option<Value>,
}

impl Parameter {
    /// Bind `value` to `name`.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// An unbound parameter.
    pub fn unbound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// A bound invocation of an action, as delivered by the transport and
/// consumed by a dispatch worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Name of the action to invoke.
    pub action: String,
    /// Parameter bindings. Handlers append extra `Out` bindings here.
    pub params: Vec<Parameter>,
    /// Per-request metadata from the transport.
    pub options: OptionStore,
}

impl ActionRequest {
    /// A request with no bindings.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Vec::new(),
            options: OptionStore::new(),
        }
    }

    /// Add a binding while building a request.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Look up a binding by name.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Typed read of a bound value.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] when the name is absent or unbound;
    /// [`Status::BadRequest`] on a kind mismatch `convert` does not permit.
    pub fn param_value<T: FromValue>(&self, name: &str, convert: Convert) -> Result<T, Status> {
        let param = self.param(name).ok_or(Status::NotFound)?;
        let value = param.value.as_ref().ok_or(Status::NotFound)?;
        value.extract(convert)
    }

    /// Bind a value, overwriting an existing binding of the same name or
    /// appending a new one. Appending is how handlers supply `Out`
    /// parameters beyond the declaration.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(param) = self.params.iter_mut().find(|p| p.name == name) {
            param.value = Some(value);
        } else {
            self.params.push(Parameter {
                name,
                value: Some(value),
            });
        }
    }

    /// Bytes this request occupies when deep-copied into a queue slot: the
    /// parameter structures plus every name, string payload, and raw
    /// payload.
    pub fn copy_size(&self) -> usize {
        let mut size = self.action.len();
        for param in &self.params {
            size += std::mem::size_of::<Parameter>();
            size += param.name.len();
            match &param.value {
                Some(Value::String(s)) => size += s.len(),
                Some(Value::Raw(b)) => size += b.len(),
                _ => {}
            }
        }
        for entry in self.options.iter() {
            size += std::mem::size_of::<Value>();
            size += entry.name.len();
            match &entry.value {
                Value::String(s) => size += s.len(),
                Value::Raw(b) => size += b.len(),
                _ => {}
            }
        }
        size
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The handler ran and reported success.
    Success,
    /// Dispatch failed, carrying the semantic kind of the failure.
    Failed(Status),
}

impl CompletionStatus {
    /// Whether the request completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionStatus::Success)
    }
}

/// The completed form of a request, handed to the transport's `transmit`
/// hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Name of the invoked action.
    pub action: String,
    /// Completion status.
    pub status: CompletionStatus,
    /// Final parameter bindings, including handler-written `Out` values
    /// and any synthetic diagnostics.
    pub params: Vec<Parameter>,
}

impl ActionResult {
    /// Consume a dispatched request into its completed form.
    pub fn from_request(request: ActionRequest, status: CompletionStatus) -> Self {
        Self {
            action: request.action,
            status,
            params: request.params,
        }
    }

    /// A failed result carrying a diagnostic in the [`PARAM_ERROR`]
    /// parameter.
    pub fn failed(action: impl Into<String>, status: Status, message: &str) -> Self {
        Self {
            action: action.into(),
            status: CompletionStatus::Failed(status),
            params: vec![Parameter::new(PARAM_ERROR, message)],
        }
    }

    /// Look up a result parameter by name.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Typed read of a result parameter.
    ///
    /// # Errors
    ///
    /// As [`ActionRequest::param_value`].
    pub fn param_value<T: FromValue>(&self, name: &str, convert: Convert) -> Result<T, Status> {
        let param = self.param(name).ok_or(Status::NotFound)?;
        let value = param.value.as_ref().ok_or(Status::NotFound)?;
        value.extract(convert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_validation_matrix() {
        assert!(Direction::In.accepts_input());
        assert!(!Direction::In.requires_input());
        assert!(Direction::InRequired.requires_input());
        assert!(!Direction::Out.accepts_input());
        assert!(Direction::Out.returns_output());
        assert!(Direction::InOut.accepts_input());
        assert!(Direction::InOut.returns_output());
    }

    #[test]
    fn set_param_overwrites_then_appends() {
        let mut request = ActionRequest::new("echo").with_param("in", "hello");
        request.set_param("in", "world");
        assert_eq!(request.params.len(), 1);
        assert_eq!(request.param_value::<String>("in", Convert::Exact).unwrap(), "world");

        request.set_param("out", "extra");
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.params[1].name, "out");
    }

    #[test]
    fn unbound_parameter_reads_as_not_found() {
        let mut request = ActionRequest::new("echo");
        request.params.push(Parameter::unbound("out"));
        assert_eq!(
            request.param_value::<String>("out", Convert::Exact),
            Err(Status::NotFound)
        );
    }

    #[test]
    fn copy_size_counts_names_and_payloads() {
        let empty = ActionRequest::new("a");
        assert_eq!(empty.copy_size(), 1);

        let with_string = ActionRequest::new("a").with_param("p", "xyz");
        let expected = 1 + std::mem::size_of::<Parameter>() + 1 + 3;
        assert_eq!(with_string.copy_size(), expected);

        let with_raw = ActionRequest::new("a").with_param("p", vec![0u8; 10]);
        let expected = 1 + std::mem::size_of::<Parameter>() + 1 + 10;
        assert_eq!(with_raw.copy_size(), expected);
    }

    #[test]
    fn failed_result_carries_the_diagnostic() {
        let result = ActionResult::failed("missing", Status::NotFound, "action not registered");
        assert!(!result.status.is_success());
        assert_eq!(
            result.param_value::<String>(PARAM_ERROR, Convert::Exact).unwrap(),
            "action not registered"
        );
    }
}
