use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("directory alias {0:?} is already registered")]
    AliasInUse(String),
    #[error("directory alias {0:?} is not registered")]
    UnknownAlias(String),
    #[error("path {0:?} escapes its parent directory or is absolute")]
    InvalidPath(String),
    #[error("{0:?} is not a directory")]
    NotADirectory(String),
    #[error("directory alias {0:?} still has live watches")]
    AliasInUseByWatch(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("the scheduler has been shut down")]
    SchedulerClosed,
    #[error("the watch backend's I/O thread is not responding")]
    BackendUnavailable,
}

impl From<asset_scheduler::SchedulerError> for FsError {
    fn from(_: asset_scheduler::SchedulerError) -> Self {
        FsError::SchedulerClosed
    }
}
