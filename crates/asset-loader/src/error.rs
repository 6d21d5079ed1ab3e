use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("file is not known to the loader")]
    UnknownFile,
    #[error("filetype is not registered")]
    UnknownFiletype,
    #[error("file is already loading or loaded under a different filetype")]
    FiletypeMismatch,
    #[error("file reference resolves to an ambiguous stem")]
    AmbiguousStem,
    #[error("file reference resolves to a directory, not a file")]
    IsDirectory,
    #[error("load_dependency/load_local may only attach to a file that is loading or loaded")]
    NotInLoadCallback,
    #[error(transparent)]
    Fs(#[from] asset_fs::FsError),
    #[error(transparent)]
    Scheduler(#[from] asset_scheduler::SchedulerError),
}
