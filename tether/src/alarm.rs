//! Alarms: severity-bearing events with no return value.

use crate::agent::Agent;
use crate::pool::{Named, Registration};
use chrono::Utc;
use std::sync::Arc;
use tether_types::{AlarmEvent, ItemInfo, Status, validate_name};

/// A pooled alarm.
pub(crate) struct AlarmItem {
    name: String,
    pub(crate) registration: Registration,
}

impl AlarmItem {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            registration: Registration::new(),
        }
    }

    pub(crate) fn info(&self) -> ItemInfo {
        ItemInfo::alarm(self.name.clone())
    }
}

impl Named for AlarmItem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque reference to a pooled alarm, addressed by name.
#[derive(Debug, Clone)]
pub struct AlarmHandle {
    name: Arc<str>,
}

impl AlarmHandle {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// The alarm's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Agent {
    /// Allocate an alarm, or return a handle to the existing one on a
    /// name collision.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid name, [`Status::Full`] at the
    /// pool ceiling.
    pub fn alarm_create(&self, name: &str) -> Result<AlarmHandle, Status> {
        validate_name(name)?;
        let mut pool = crate::lock(&self.inner.alarms);
        pool.allocate(name, || AlarmItem::new(name))?;
        Ok(AlarmHandle::new(name))
    }

    /// Register the alarm with the cloud. A no-op when already registered.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle; the plugin's error when it
    /// declines (the alarm is left register-pending).
    pub async fn alarm_register(&self, handle: &AlarmHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.alarms);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            if !item.registration.register_needs_plugin() {
                return Ok(());
            }
            item.info()
        };
        let outcome = self.inner.plugin.register(&info).await;
        {
            let mut pool = crate::lock(&self.inner.alarms);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_register(outcome.is_ok());
            }
        }
        outcome
    }

    /// The alarm's registration state. A reconnect handler can sweep
    /// alarms left pending by a plugin failure and retry them.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub fn alarm_state(&self, handle: &AlarmHandle) -> Result<crate::RegistrationState, Status> {
        let pool = crate::lock(&self.inner.alarms);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        Ok(pool.item(index).registration.state())
    }

    /// Raise the alarm at the given severity, stamped with the current
    /// time. Larger severities are more severe.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle, [`Status::NotInitialized`]
    /// on an unregistered alarm; the plugin's error when delivery fails.
    pub async fn alarm_raise(
        &self,
        handle: &AlarmHandle,
        severity: u32,
        message: Option<&str>,
    ) -> Result<(), Status> {
        {
            let pool = crate::lock(&self.inner.alarms);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            if !pool.item(index).registration.is_registered() {
                return Err(Status::NotInitialized);
            }
        }
        let event = AlarmEvent {
            severity,
            message: message.map(str::to_owned),
            timestamp: Some(Utc::now()),
        };
        tracing::debug!(alarm = handle.name(), severity, "raising alarm");
        self.inner.plugin.notify(handle.name(), &event).await
    }

    /// Deregister the alarm from the cloud.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle, [`Status::NotInitialized`]
    /// when not registered; the plugin's error when it declines (the alarm
    /// is left deregister-pending).
    pub async fn alarm_deregister(&self, handle: &AlarmHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.alarms);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.begin_deregister()?;
            item.info()
        };
        let outcome = self.inner.plugin.deregister(&info).await;
        {
            let mut pool = crate::lock(&self.inner.alarms);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_deregister(outcome.is_ok());
            }
        }
        outcome
    }

    /// Release the alarm's pool slot, deregistering first (best-effort)
    /// when it is registered.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub async fn alarm_free(&self, handle: &AlarmHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.alarms);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.is_registered().then(|| item.info())
        };
        if let Some(info) = info {
            if let Err(e) = self.inner.plugin.deregister(&info).await {
                tracing::warn!(alarm = handle.name(), error = %e, "deregister on free failed");
            }
        }
        let mut pool = crate::lock(&self.inner.alarms);
        if let Some(index) = pool.find(handle.name()) {
            pool.free(index);
        }
        Ok(())
    }
}
