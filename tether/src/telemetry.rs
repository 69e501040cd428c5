//! Telemetry channels: typed, named sample streams.

use crate::agent::Agent;
use crate::pool::{Named, Registration};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tether_types::{
    Convert, FromValue, ItemInfo, OptionStore, Sample, Status, Value, ValueKind, validate_name,
};

/// A pooled telemetry channel.
pub(crate) struct TelemetryItem {
    name: String,
    pub(crate) kind: ValueKind,
    pub(crate) registration: Registration,
    pub(crate) options: OptionStore,
}

impl TelemetryItem {
    pub(crate) fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            registration: Registration::new(),
            options: OptionStore::new(),
        }
    }

    pub(crate) fn info(&self) -> ItemInfo {
        ItemInfo::telemetry(self.name.clone(), self.kind)
    }
}

impl Named for TelemetryItem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque reference to a pooled telemetry channel, addressed by name.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    name: Arc<str>,
}

impl TelemetryHandle {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Agent {
    /// Allocate a telemetry channel with a declared sample kind, or return
    /// a handle to the existing channel on a name collision.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid name, [`Status::Full`] at the
    /// pool ceiling.
    pub fn telemetry_create(&self, name: &str, kind: ValueKind) -> Result<TelemetryHandle, Status> {
        validate_name(name)?;
        let mut pool = crate::lock(&self.inner.telemetry);
        pool.allocate(name, || TelemetryItem::new(name, kind))?;
        Ok(TelemetryHandle::new(name))
    }

    /// Register the channel with the cloud. A no-op when already
    /// registered.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle; the plugin's error when it
    /// declines (the channel is left register-pending).
    pub async fn telemetry_register(&self, handle: &TelemetryHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.telemetry);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            if !item.registration.register_needs_plugin() {
                return Ok(());
            }
            item.info()
        };
        let outcome = self.inner.plugin.register(&info).await;
        {
            let mut pool = crate::lock(&self.inner.telemetry);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_register(outcome.is_ok());
            }
        }
        outcome
    }

    /// Publish one sample on a registered channel.
    ///
    /// The value must be of the channel's declared kind or losslessly
    /// coercible to it; the coerced value is what the transport sees.
    /// `timestamp: None` lets the transport stamp the sample on send.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle, [`Status::NotInitialized`]
    /// on an unregistered channel, [`Status::BadRequest`] on a kind
    /// mismatch; the plugin's error when delivery fails.
    pub async fn telemetry_publish(
        &self,
        handle: &TelemetryHandle,
        value: impl Into<Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), Status> {
        let value = value.into();
        let sample = {
            let pool = crate::lock(&self.inner.telemetry);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            if !item.registration.is_registered() {
                return Err(Status::NotInitialized);
            }
            let value = if value.kind() == item.kind {
                value
            } else {
                value.convert(item.kind)?
            };
            Sample { value, timestamp }
        };
        tracing::trace!(telemetry = handle.name(), "publishing sample");
        self.inner.plugin.publish(handle.name(), &sample).await
    }

    /// The channel's registration state. A reconnect handler can sweep
    /// channels left pending by a plugin failure and retry them.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub fn telemetry_state(
        &self,
        handle: &TelemetryHandle,
    ) -> Result<crate::RegistrationState, Status> {
        let pool = crate::lock(&self.inner.telemetry);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        Ok(pool.item(index).registration.state())
    }

    /// Set a metadata option on the channel (units, thresholds, ...).
    ///
    /// # Errors
    ///
    /// As [`OptionStore::set`], plus [`Status::NotFound`] for a stale
    /// handle.
    pub fn telemetry_option_set(
        &self,
        handle: &TelemetryHandle,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), Status> {
        let mut pool = crate::lock(&self.inner.telemetry);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        pool.item_mut(index).options.set(name, value)
    }

    /// Typed read of a channel metadata option.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::get`], plus [`Status::NotFound`] for a stale
    /// handle.
    pub fn telemetry_option_get<T: FromValue>(
        &self,
        handle: &TelemetryHandle,
        name: &str,
        convert: Convert,
    ) -> Result<T, Status> {
        let pool = crate::lock(&self.inner.telemetry);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        pool.item(index).options.get(name, convert)
    }

    /// Deregister the channel from the cloud.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle, [`Status::NotInitialized`]
    /// when not registered; the plugin's error when it declines (the
    /// channel is left deregister-pending).
    pub async fn telemetry_deregister(&self, handle: &TelemetryHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.telemetry);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.begin_deregister()?;
            item.info()
        };
        let outcome = self.inner.plugin.deregister(&info).await;
        {
            let mut pool = crate::lock(&self.inner.telemetry);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_deregister(outcome.is_ok());
            }
        }
        outcome
    }

    /// Release the channel's pool slot, deregistering first (best-effort)
    /// when it is registered.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub async fn telemetry_free(&self, handle: &TelemetryHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.telemetry);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.is_registered().then(|| item.info())
        };
        if let Some(info) = info {
            if let Err(e) = self.inner.plugin.deregister(&info).await {
                tracing::warn!(telemetry = handle.name(), error = %e, "deregister on free failed");
            }
        }
        let mut pool = crate::lock(&self.inner.telemetry);
        if let Some(index) = pool.find(handle.name()) {
            pool.free(index);
        }
        Ok(())
    }
}
