#![deny(missing_docs)]
//! # tether-types — protocol types for the tether device agent
//!
//! This crate defines everything that crosses the seams of the agent: the
//! tagged [`Value`] container, the ordered [`OptionStore`], the action
//! parameter/request/result model, the [`Plugin`] trait a transport
//! implements, and the shared [`Status`] error kinds and capacity
//! [`limits`].
//!
//! The engine that moves these types (pools, the request queue, dispatch
//! workers) lives in the `tether` crate. Keeping the protocol layer
//! separate means a transport crate depends only on the types it mirrors,
//! never on the engine.
//!
//! ## Design notes
//!
//! - Absence is `Option<Value>`; [`Value::Null`] is a *present* empty
//!   value. The two are never interchangeable.
//! - Numeric coercion ([`Value::convert`]) is lossless-only: a read either
//!   returns exactly the stored number in the requested width or fails
//!   with [`Status::BadRequest`].
//! - The [`Plugin`] trait is operation-defined, not mechanism-defined:
//!   `register` means "make the cloud aware of this item", whatever the
//!   wire looks like. Any transport satisfying the trait is acceptable.

pub mod duration;
pub mod error;
pub mod limits;
pub mod location;
pub mod log;
pub mod name;
pub mod option;
pub mod plugin;
pub mod request;
pub mod value;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use duration::DurationMs;
pub use error::Status;
pub use location::{Location, LocationSource};
pub use log::{LogCallback, LogLevel};
pub use name::{FORBIDDEN_NAME_CHARS, validate_name};
pub use option::{OptionEntry, OptionStore};
pub use plugin::{AlarmEvent, FileTransfer, ItemInfo, ItemKind, Plugin, Sample, TransferKind};
pub use request::{
    ActionRequest, ActionResult, CompletionStatus, Direction, PARAM_ERROR, PARAM_RETVAL,
    PARAM_STDERR, PARAM_STDOUT, Parameter, ParameterDecl,
};
pub use value::{Convert, FromValue, Value, ValueKind};
