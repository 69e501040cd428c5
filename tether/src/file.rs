//! File transfer: validate locally, deliver through the transport.

use crate::agent::Agent;
use std::path::{Path, PathBuf};
use tether_types::{FileTransfer, OptionStore, Status, TransferKind, validate_name};

async fn check_upload_source(path: &Path) -> Result<(), Status> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(Status::FileOpenFailed),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Status::FileOpenFailed),
        Err(_) => Err(Status::IoError),
    }
}

async fn check_download_destination(path: &Path) -> Result<(), Status> {
    let parent = path.parent().ok_or(Status::BadParameter)?;
    match tokio::fs::metadata(parent).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Status::NotFound),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Status::NotFound),
        Err(_) => Err(Status::IoError),
    }
}

impl Agent {
    /// Send a local file to the cloud under `name`.
    ///
    /// The local file must exist and be a regular file; delivery, retries,
    /// and progress belong to the transport.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid cloud-side name,
    /// [`Status::FileOpenFailed`] when the source is missing or not a
    /// regular file; the plugin's error when it refuses the transfer.
    pub async fn file_upload(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        options: OptionStore,
    ) -> Result<(), Status> {
        validate_name(name)?;
        let path = path.into();
        check_upload_source(&path).await?;
        let transfer = FileTransfer {
            kind: TransferKind::Upload,
            name: name.to_owned(),
            path,
            options,
        };
        tracing::debug!(file = name, "forwarding upload to transport");
        self.inner.plugin.transfer(&transfer).await
    }

    /// Fetch the cloud file `name` into a local path.
    ///
    /// The destination's parent directory must already exist.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid cloud-side name,
    /// [`Status::NotFound`] when the destination directory is missing; the
    /// plugin's error when it refuses the transfer.
    pub async fn file_download(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        options: OptionStore,
    ) -> Result<(), Status> {
        validate_name(name)?;
        let path = path.into();
        check_download_destination(&path).await?;
        let transfer = FileTransfer {
            kind: TransferKind::Download,
            name: name.to_owned(),
            path,
            options,
        };
        tracing::debug!(file = name, "forwarding download to transport");
        self.inner.plugin.transfer(&transfer).await
    }
}
