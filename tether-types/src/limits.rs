//! Capacity limits shared by the agent engine and its transports.
//!
//! Everything the engine allocates is bounded: pools have a fixed inline
//! partition and a hard ceiling, the request queue holds a fixed number of
//! slots, and captured command output is capped. The agent builder can
//! shrink these per deployment; it cannot exceed them implicitly.

/// Maximum length of an item, option, or parameter name in bytes.
pub const NAME_MAX: usize = 255;

/// Maximum length of the device identifier in bytes.
pub const ID_MAX: usize = 255;

/// Maximum number of entries in one option store.
pub const OPTION_MAX: usize = 64;

/// Maximum number of declared parameters per action.
pub const PARAMETER_MAX: usize = 32;

/// Inline (preallocated) entries per telemetry pool.
pub const TELEMETRY_STACK_MAX: usize = 10;
/// Hard ceiling of the telemetry pool.
pub const TELEMETRY_MAX: usize = 255;

/// Inline (preallocated) entries per action pool.
pub const ACTION_STACK_MAX: usize = 10;
/// Hard ceiling of the action pool.
pub const ACTION_MAX: usize = 255;

/// Inline (preallocated) entries per alarm pool.
pub const ALARM_STACK_MAX: usize = 10;
/// Hard ceiling of the alarm pool.
pub const ALARM_MAX: usize = 255;

/// Number of preallocated request-queue slots.
pub const QUEUE_MAX: usize = 10;

/// Bytes a queue slot holds before its request is counted as spilled to a
/// heap buffer.
pub const SLOT_ARENA_SIZE: usize = 4096;

/// Cap on captured stdout and stderr, per stream, from external commands.
pub const OUTPUT_MAX: usize = 64 * 1024;
