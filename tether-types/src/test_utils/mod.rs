//! Test doubles for the plugin seam.
//!
//! Enabled with the `test-utils` feature. Engine unit tests and workspace
//! integration tests drive a [`RecordingPlugin`] instead of a live
//! transport.

mod recording_plugin;

pub use recording_plugin::{PluginCall, RecordingPlugin};
