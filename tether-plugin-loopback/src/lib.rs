#![deny(missing_docs)]
//! In-process loopback implementation of the tether `Plugin` trait.
//!
//! Accepts every operation, counts hook invocations, keeps the most recent
//! transmitted results in a bounded ring, and emits `tracing` debug
//! events. No wire, no sessions: `connect` and `disconnect` only flip a
//! flag. Suitable for demos, smoke tests, and as the reference when
//! writing a real transport.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tether_types::{
    ActionResult, AlarmEvent, DurationMs, FileTransfer, ItemInfo, Plugin, Sample, Status,
};

/// How many transmitted results the ring keeps by default.
const DEFAULT_RESULT_CAPACITY: usize = 32;

/// Hook invocation counters, readable at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackCounts {
    /// `register` invocations.
    pub registered: u64,
    /// `deregister` invocations.
    pub deregistered: u64,
    /// `publish` invocations.
    pub published: u64,
    /// `notify` invocations.
    pub notified: u64,
    /// `transmit` invocations.
    pub transmitted: u64,
    /// `transfer` invocations.
    pub transferred: u64,
    /// `iterate` invocations.
    pub iterated: u64,
}

/// A transport that accepts everything and remembers what it saw.
pub struct LoopbackPlugin {
    connected: AtomicBool,
    registered: AtomicU64,
    deregistered: AtomicU64,
    published: AtomicU64,
    notified: AtomicU64,
    transmitted: AtomicU64,
    transferred: AtomicU64,
    iterated: AtomicU64,
    results: Mutex<VecDeque<ActionResult>>,
    result_capacity: usize,
}

impl LoopbackPlugin {
    /// A loopback transport keeping the default number of recent results.
    pub fn new() -> Self {
        Self::with_result_capacity(DEFAULT_RESULT_CAPACITY)
    }

    /// A loopback transport keeping up to `capacity` recent results.
    pub fn with_result_capacity(capacity: usize) -> Self {
        Self {
            connected: AtomicBool::new(false),
            registered: AtomicU64::new(0),
            deregistered: AtomicU64::new(0),
            published: AtomicU64::new(0),
            notified: AtomicU64::new(0),
            transmitted: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            iterated: AtomicU64::new(0),
            results: Mutex::new(VecDeque::with_capacity(capacity)),
            result_capacity: capacity.max(1),
        }
    }

    /// Whether `connect` has been called more recently than `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Snapshot of the hook counters.
    pub fn counts(&self) -> LoopbackCounts {
        LoopbackCounts {
            registered: self.registered.load(Ordering::Relaxed),
            deregistered: self.deregistered.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            notified: self.notified.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
            iterated: self.iterated.load(Ordering::Relaxed),
        }
    }

    /// The most recently transmitted results, oldest first.
    pub fn recent_results(&self) -> Vec<ActionResult> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for LoopbackPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for LoopbackPlugin {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn connect(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.connected.store(true, Ordering::Relaxed);
        tracing::debug!("tether.loopback.connect");
        Ok(())
    }

    async fn disconnect(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.connected.store(false, Ordering::Relaxed);
        tracing::debug!("tether.loopback.disconnect");
        Ok(())
    }

    async fn register(&self, item: &ItemInfo) -> Result<(), Status> {
        self.registered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = ?item.kind, item = %item.name, "tether.loopback.register");
        Ok(())
    }

    async fn deregister(&self, item: &ItemInfo) -> Result<(), Status> {
        self.deregistered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = ?item.kind, item = %item.name, "tether.loopback.deregister");
        Ok(())
    }

    async fn publish(&self, telemetry: &str, sample: &Sample) -> Result<(), Status> {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            telemetry,
            kind = %sample.value.kind(),
            "tether.loopback.publish"
        );
        Ok(())
    }

    async fn notify(&self, alarm: &str, event: &AlarmEvent) -> Result<(), Status> {
        self.notified.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(alarm, severity = event.severity, "tether.loopback.notify");
        Ok(())
    }

    async fn transmit(&self, result: &ActionResult) -> Result<(), Status> {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            action = %result.action,
            success = result.status.is_success(),
            "tether.loopback.transmit"
        );
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if results.len() == self.result_capacity {
            results.pop_front();
        }
        results.push_back(result.clone());
        Ok(())
    }

    async fn transfer(&self, transfer: &FileTransfer) -> Result<(), Status> {
        self.transferred.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            kind = ?transfer.kind,
            file = %transfer.name,
            "tether.loopback.transfer"
        );
        Ok(())
    }

    async fn iterate(&self, _timeout: DurationMs) -> Result<(), Status> {
        self.iterated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{CompletionStatus, ValueKind};

    #[tokio::test]
    async fn counts_every_hook() {
        let plugin = LoopbackPlugin::new();
        let item = ItemInfo::telemetry("temp", ValueKind::Float32);

        plugin.connect(DurationMs::ZERO).await.unwrap();
        assert!(plugin.is_connected());
        plugin.register(&item).await.unwrap();
        plugin.publish("temp", &Sample::new(1.0f32)).await.unwrap();
        plugin.iterate(DurationMs::ZERO).await.unwrap();
        plugin.deregister(&item).await.unwrap();
        plugin.disconnect(DurationMs::ZERO).await.unwrap();
        assert!(!plugin.is_connected());

        let counts = plugin.counts();
        assert_eq!(counts.registered, 1);
        assert_eq!(counts.published, 1);
        assert_eq!(counts.iterated, 1);
        assert_eq!(counts.deregistered, 1);
    }

    #[tokio::test]
    async fn result_ring_is_bounded() {
        let plugin = LoopbackPlugin::with_result_capacity(2);
        for i in 0..3 {
            let result = ActionResult {
                action: format!("action-{i}"),
                status: CompletionStatus::Success,
                params: vec![],
            };
            plugin.transmit(&result).await.unwrap();
        }
        let recent = plugin.recent_results();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "action-1");
        assert_eq!(recent[1].action, "action-2");
        assert_eq!(plugin.counts().transmitted, 3);
    }
}
