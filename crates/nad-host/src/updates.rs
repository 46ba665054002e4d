use nad_core::bridge::{DownloadProgress, UpdateInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("no update has been found")]
    NothingToDownload,
    #[error("no update has been downloaded")]
    NothingToInstall,
    #[error("update feed failed: {0}")]
    Feed(String),
}

/// Blocking update backend. Progress is reported through the callback while
/// a download runs.
pub trait UpdateService: Send + Sync {
    fn check(&self) -> Result<Option<UpdateInfo>, UpdateError>;

    fn download(
        &self,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<UpdateInfo, UpdateError>;

    fn install(&self) -> Result<(), UpdateError>;
}

/// Builds without an update feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUpdates;

impl UpdateService for DisabledUpdates {
    fn check(&self) -> Result<Option<UpdateInfo>, UpdateError> {
        Ok(None)
    }

    fn download(
        &self,
        _progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<UpdateInfo, UpdateError> {
        Err(UpdateError::NothingToDownload)
    }

    fn install(&self) -> Result<(), UpdateError> {
        Err(UpdateError::NothingToInstall)
    }
}
