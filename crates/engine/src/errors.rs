use std::io;

use datafile::DataFileError;
use thiserror::Error;

/// Everything a public engine call can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("key is not found in database")]
    KeyNotFound,

    #[error("data file is not found")]
    DataFileNotFound,

    #[error("data already deleted")]
    DataAlreadyDeleted,

    #[error("failed to update index")]
    IndexUpdateFailed,

    #[error("invalid crc value, log record maybe corrupted")]
    InvalidRecordCrc,

    #[error("the database directory maybe corrupted")]
    DataDirectoryCorrupted,

    #[error("the database directory is used by another process")]
    DatabaseIsUsing,

    #[error("merge is in progress, try again later")]
    MergeInProgress,

    #[error("exceed the max batch num")]
    ExceedMaxBatchNum,

    #[error("the merge ratio do not reach option ratio")]
    MergeRatioUnreached,

    #[error("no enough disk space for merge")]
    NotEnoughSpaceForMerge,

    #[error("cannot use write batch, seq no file not exists")]
    SeqNoFileNotFound,

    #[error("invalid engine options: {0}")]
    InvalidOptions(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<DataFileError> for Error {
    fn from(err: DataFileError) -> Self {
        match err {
            DataFileError::Io(e) => Error::Io(e),
            DataFileError::Corrupt => Error::InvalidRecordCrc,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
