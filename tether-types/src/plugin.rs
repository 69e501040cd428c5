//! The transport-plugin seam.
//!
//! A plugin carries agent events to a cloud service. The shipped
//! transports speak MQTT or loop back in-process, but nothing here assumes
//! a protocol. The trait is operation-defined: `register` means "make the
//! cloud aware of this item", not "send this packet". The engine calls
//! every hook from whichever worker is handling the event; a plugin must
//! tolerate that and nothing more.

use crate::duration::DurationMs;
use crate::error::Status;
use crate::option::OptionStore;
use crate::request::{ActionResult, ParameterDecl};
use crate::value::{Value, ValueKind};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which pool an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A telemetry channel.
    Telemetry,
    /// A remotely invokable action.
    Action,
    /// A severity-bearing alarm.
    Alarm,
}

/// Description of an item crossing the plugin seam.
///
/// Carries what a transport needs to mirror the item remotely without
/// exposing the engine's pool internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// The owning pool.
    pub kind: ItemKind,
    /// Item name.
    pub name: String,
    /// Declared sample kind, for telemetry.
    pub value_kind: Option<ValueKind>,
    /// Declared parameters, for actions, in declaration order.
    pub params: Vec<ParameterDecl>,
}

impl ItemInfo {
    /// Describe a telemetry channel.
    pub fn telemetry(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            kind: ItemKind::Telemetry,
            name: name.into(),
            value_kind: Some(value_kind),
            params: Vec::new(),
        }
    }

    /// Describe an action and its declaration.
    pub fn action(name: impl Into<String>, params: Vec<ParameterDecl>) -> Self {
        Self {
            kind: ItemKind::Action,
            name: name.into(),
            value_kind: None,
            params,
        }
    }

    /// Describe an alarm.
    pub fn alarm(name: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Alarm,
            name: name.into(),
            value_kind: None,
            params: Vec::new(),
        }
    }
}

/// One telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The sampled value, already checked against the channel's declared
    /// kind.
    pub value: Value,
    /// When the sample was taken. `None` lets the transport stamp it on
    /// send.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sample {
    /// A sample stamped by the transport.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            timestamp: None,
        }
    }

    /// A sample taken at the given instant.
    pub fn at(value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            timestamp: Some(timestamp),
        }
    }

    /// A sample taken at the given Unix timestamp in seconds.
    pub fn at_epoch(value: impl Into<Value>, secs: i64) -> Self {
        Self {
            value: value.into(),
            timestamp: Utc.timestamp_opt(secs, 0).single(),
        }
    }
}

/// One raised alarm occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Application-defined severity; larger is more severe.
    pub severity: u32,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// When the alarm was raised.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Device-to-cloud.
    Upload,
    /// Cloud-to-device.
    Download,
}

/// A file transfer handed to the transport.
///
/// The engine validates the local path before forwarding; delivery,
/// retries, and progress reporting belong to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTransfer {
    /// Transfer direction.
    pub kind: TransferKind,
    /// Cloud-side file name.
    pub name: String,
    /// Local path: the source of an upload, the destination of a download.
    pub path: PathBuf,
    /// Transport-specific options.
    pub options: OptionStore,
}

/// A pluggable transport.
///
/// The engine informs the plugin of events and runs its non-blocking
/// iterations; everything else (wire protocol, sessions, retry policy)
/// is the plugin's business. Hooks return [`Status`] kinds the engine
/// folds into item state (`register` failure leaves an item
/// register-pending) or completion payloads (`transmit` failure is
/// logged).
///
/// `notify` and `transfer` default to accepting silently so a minimal
/// transport only implements the five core hooks.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short transport name, for logs.
    fn name(&self) -> &str;

    /// Establish the cloud session. A zero `timeout` means no bound.
    async fn connect(&self, timeout: DurationMs) -> Result<(), Status>;

    /// Tear the cloud session down.
    async fn disconnect(&self, timeout: DurationMs) -> Result<(), Status>;

    /// An item left the unregistered state, or a registered action's
    /// declaration changed (an update).
    async fn register(&self, item: &ItemInfo) -> Result<(), Status>;

    /// An item left the registered state.
    async fn deregister(&self, item: &ItemInfo) -> Result<(), Status>;

    /// A sample was published on a registered telemetry channel.
    async fn publish(&self, telemetry: &str, sample: &Sample) -> Result<(), Status>;

    /// An alarm was raised.
    async fn notify(&self, alarm: &str, event: &AlarmEvent) -> Result<(), Status> {
        let _ = (alarm, event);
        Ok(())
    }

    /// A worker finished a request; send the result to the cloud.
    async fn transmit(&self, result: &ActionResult) -> Result<(), Status>;

    /// A file transfer was requested.
    async fn transfer(&self, transfer: &FileTransfer) -> Result<(), Status> {
        let _ = transfer;
        Ok(())
    }

    /// One non-blocking main-loop tick, for single-thread mode.
    async fn iterate(&self, timeout: DurationMs) -> Result<(), Status>;
}
