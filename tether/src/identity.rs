//! The device-identity file.
//!
//! A plain-text file whose first line is the device identifier. Created on
//! first run with a freshly generated value, so the same device keeps the
//! same identity across restarts.

use std::path::Path;
use tether_types::Status;
use tether_types::limits::ID_MAX;

/// File name under the agent's data directory.
pub(crate) const DEVICE_ID_FILE: &str = "device_id";

/// A usable identifier: nonempty printable ASCII, at most [`ID_MAX`]
/// bytes.
fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= ID_MAX
        && id.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
}

/// Read the persisted identifier, or generate and persist a fresh one.
///
/// An unreadable or invalid file is replaced rather than trusted: a device
/// that lost its identity file gets a new identity, which the cloud treats
/// as a new device.
///
/// # Errors
///
/// [`Status::FileOpenFailed`] when the file exists but cannot be read;
/// [`Status::IoError`] when the replacement cannot be written.
pub(crate) async fn load_or_create(data_dir: &Path) -> Result<String, Status> {
    let path = data_dir.join(DEVICE_ID_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let first_line = contents.lines().next().unwrap_or("").trim();
            if valid_id(first_line) {
                return Ok(first_line.to_owned());
            }
            tracing::warn!(path = %path.display(), "device identity file invalid, regenerating");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot read device identity");
            return Err(Status::FileOpenFailed);
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|_| Status::IoError)?;
    tokio::fs::write(&path, format!("{id}\n"))
        .await
        .map_err(|_| Status::IoError)?;
    tracing::info!(device_id = %id, "generated new device identity");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_and_persists_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path()).await.unwrap();
        assert!(valid_id(&first));
        let second = load_or_create(dir.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reads_only_the_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEVICE_ID_FILE);
        tokio::fs::write(&path, "device-007\nleftover junk\n")
            .await
            .unwrap();
        let id = load_or_create(dir.path()).await.unwrap();
        assert_eq!(id, "device-007");
    }

    #[tokio::test]
    async fn invalid_contents_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEVICE_ID_FILE);
        tokio::fs::write(&path, "\n").await.unwrap();
        let id = load_or_create(dir.path()).await.unwrap();
        assert!(valid_id(&id));
        let persisted = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(persisted.lines().next(), Some(id.as_str()));
    }

    #[test]
    fn id_validation() {
        assert!(valid_id("device-007"));
        assert!(valid_id("serial 12345"));
        assert!(!valid_id(""));
        assert!(!valid_id("tab\tseparated"));
        assert!(!valid_id(&"x".repeat(ID_MAX + 1)));
    }
}
