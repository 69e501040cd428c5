//! Name validation for items, options, and parameters.

use crate::error::Status;
use crate::limits::NAME_MAX;

/// Characters that may never appear in a name.
///
/// The external-command adapter places names on a shell command line, so
/// the shell metacharacters among these are rejected at creation time, not
/// escaped at marshalling time.
pub const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '|', '&', ';', '='];

/// Check that `name` is usable as an item, option, or parameter name.
///
/// A valid name is nonempty, at most [`NAME_MAX`] bytes, contains none of
/// [`FORBIDDEN_NAME_CHARS`], and contains no ASCII control characters.
///
/// # Errors
///
/// Returns [`Status::BadRequest`] for any violation.
pub fn validate_name(name: &str) -> Result<(), Status> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(Status::BadRequest);
    }
    if name
        .chars()
        .any(|c| c.is_ascii_control() || FORBIDDEN_NAME_CHARS.contains(&c))
    {
        return Err(Status::BadRequest);
    }
    Ok(())
}
