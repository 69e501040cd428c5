#![deny(missing_docs)]
//! # tether — the device-side agent engine
//!
//! A long-running component embedded in a device application. The
//! application publishes telemetry samples, raises alarms, exposes
//! remotely invokable actions, and moves files; a pluggable transport
//! (the [`Plugin`](tether_types::Plugin) trait from `tether-types`)
//! carries everything to and from a cloud service.
//!
//! The engine is built from bounded parts: three fixed-capacity item
//! pools, a preallocated request queue drained by dispatch workers, and an
//! external-command adapter for actions backed by scripts. Delivery is
//! asynchronous: callers enqueue and return; workers do the waiting.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! # async fn demo(plugin: Arc<dyn tether_types::Plugin>) -> Result<(), Status> {
//! let agent = Agent::builder(plugin)
//!     .data_dir("/var/lib/tether")
//!     .workers(4)
//!     .initialize()
//!     .await?;
//!
//! let temp = agent.telemetry_create("temp", ValueKind::Float32)?;
//! agent.telemetry_register(&temp).await?;
//! agent.telemetry_publish(&temp, 23.5f32, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod agent;
pub mod alarm;
mod config;
mod dispatch;
mod exec;
mod file;
mod identity;
mod pool;
mod queue;
pub mod telemetry;

pub use action::{ActionFlags, ActionHandle, ActionHandler, FnHandler};
pub use agent::{Agent, AgentBuilder};
pub use alarm::AlarmHandle;
pub use pool::RegistrationState;
pub use queue::QueueCounts;
pub use telemetry::TelemetryHandle;

/// Happy-path imports for embedding the agent.
pub mod prelude {
    pub use crate::{
        ActionFlags, ActionHandle, ActionHandler, Agent, AgentBuilder, AlarmHandle, FnHandler,
        TelemetryHandle,
    };
    pub use tether_types::{
        ActionRequest, ActionResult, Convert, Direction, DurationMs, LogLevel, OptionStore,
        Status, Value, ValueKind,
    };
}

/// Lock a mutex, recovering the guard from a poisoned lock.
///
/// No engine lock is held while user code runs, so a poisoned lock means a
/// panic inside short engine-only critical sections; the data is still
/// consistent and continuing beats wedging the agent.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
