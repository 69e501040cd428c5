//! RecordingPlugin — remembers every hook call, fails on request.

use crate::duration::DurationMs;
use crate::error::Status;
use crate::plugin::{AlarmEvent, FileTransfer, ItemInfo, Plugin, Sample};
use crate::request::ActionResult;
use async_trait::async_trait;
use std::sync::Mutex;

/// One observed plugin invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginCall {
    /// `connect` was called.
    Connect,
    /// `disconnect` was called.
    Disconnect,
    /// `register` was called with this item.
    Register(ItemInfo),
    /// `deregister` was called with this item.
    Deregister(ItemInfo),
    /// `publish` was called.
    Publish {
        /// Channel name.
        telemetry: String,
        /// The published sample.
        sample: Sample,
    },
    /// `notify` was called.
    Notify {
        /// Alarm name.
        alarm: String,
        /// The raised event.
        event: AlarmEvent,
    },
    /// `transmit` was called with this result.
    Transmit(ActionResult),
    /// `transfer` was called.
    Transfer(FileTransfer),
    /// `iterate` was called.
    Iterate,
}

#[derive(Default)]
struct FailFlags {
    connect: bool,
    register: bool,
    deregister: bool,
    publish: bool,
    notify: bool,
    transmit: bool,
    transfer: bool,
}

/// A [`Plugin`] that records every hook invocation and can be told to fail
/// specific hooks with [`Status::Failure`].
///
/// Locks are held only to copy data in or out, so the double is safe to
/// share across workers.
#[derive(Default)]
pub struct RecordingPlugin {
    calls: Mutex<Vec<PluginCall>>,
    fail: Mutex<FailFlags>,
}

impl RecordingPlugin {
    /// A fresh recorder that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: PluginCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn should_fail(&self, pick: impl Fn(&FailFlags) -> bool) -> bool {
        pick(&self.fail.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn set_fail(&self, set: impl Fn(&mut FailFlags)) {
        set(&mut self.fail.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// Snapshot of every recorded call, in order.
    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&PluginCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    /// Every transmitted result, in order.
    pub fn transmitted(&self) -> Vec<ActionResult> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|c| match c {
                PluginCall::Transmit(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fail subsequent `connect` calls.
    pub fn fail_connect(&self, fail: bool) {
        self.set_fail(|f| f.connect = fail);
    }

    /// Fail subsequent `register` calls.
    pub fn fail_register(&self, fail: bool) {
        self.set_fail(|f| f.register = fail);
    }

    /// Fail subsequent `deregister` calls.
    pub fn fail_deregister(&self, fail: bool) {
        self.set_fail(|f| f.deregister = fail);
    }

    /// Fail subsequent `publish` calls.
    pub fn fail_publish(&self, fail: bool) {
        self.set_fail(|f| f.publish = fail);
    }

    /// Fail subsequent `notify` calls.
    pub fn fail_notify(&self, fail: bool) {
        self.set_fail(|f| f.notify = fail);
    }

    /// Fail subsequent `transmit` calls.
    pub fn fail_transmit(&self, fail: bool) {
        self.set_fail(|f| f.transmit = fail);
    }

    /// Fail subsequent `transfer` calls.
    pub fn fail_transfer(&self, fail: bool) {
        self.set_fail(|f| f.transfer = fail);
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.record(PluginCall::Connect);
        if self.should_fail(|f| f.connect) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn disconnect(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.record(PluginCall::Disconnect);
        Ok(())
    }

    async fn register(&self, item: &ItemInfo) -> Result<(), Status> {
        self.record(PluginCall::Register(item.clone()));
        if self.should_fail(|f| f.register) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn deregister(&self, item: &ItemInfo) -> Result<(), Status> {
        self.record(PluginCall::Deregister(item.clone()));
        if self.should_fail(|f| f.deregister) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn publish(&self, telemetry: &str, sample: &Sample) -> Result<(), Status> {
        self.record(PluginCall::Publish {
            telemetry: telemetry.to_owned(),
            sample: sample.clone(),
        });
        if self.should_fail(|f| f.publish) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn notify(&self, alarm: &str, event: &AlarmEvent) -> Result<(), Status> {
        self.record(PluginCall::Notify {
            alarm: alarm.to_owned(),
            event: event.clone(),
        });
        if self.should_fail(|f| f.notify) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn transmit(&self, result: &ActionResult) -> Result<(), Status> {
        self.record(PluginCall::Transmit(result.clone()));
        if self.should_fail(|f| f.transmit) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn transfer(&self, transfer: &FileTransfer) -> Result<(), Status> {
        self.record(PluginCall::Transfer(transfer.clone()));
        if self.should_fail(|f| f.transfer) {
            return Err(Status::Failure);
        }
        Ok(())
    }

    async fn iterate(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.record(PluginCall::Iterate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[tokio::test]
    async fn records_calls_in_order() {
        let plugin = RecordingPlugin::new();
        let item = ItemInfo::telemetry("temp", ValueKind::Float32);
        plugin.register(&item).await.unwrap();
        plugin
            .publish("temp", &Sample::at_epoch(23.5f32, 1_700_000_000))
            .await
            .unwrap();
        plugin.deregister(&item).await.unwrap();

        let calls = plugin.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], PluginCall::Register(_)));
        assert!(matches!(calls[1], PluginCall::Publish { .. }));
        assert!(matches!(calls[2], PluginCall::Deregister(_)));
    }

    #[tokio::test]
    async fn scripted_failures_apply() {
        let plugin = RecordingPlugin::new();
        plugin.fail_register(true);
        let item = ItemInfo::alarm("overheat");
        assert_eq!(plugin.register(&item).await, Err(Status::Failure));
        plugin.fail_register(false);
        assert_eq!(plugin.register(&item).await, Ok(()));
        assert_eq!(plugin.count(|c| matches!(c, PluginCall::Register(_))), 2);
    }
}
