use thiserror::Error;
use xlconv_parser::{DecodeError, EncodeError};

use crate::upload::{ItemId, ItemStatus};

/// Failures that end a single item in the `Error` state.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to read file {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("transform task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{name} is not an Excel file (declared type '{media_type}')")]
    UnsupportedType { name: String, media_type: String },

    #[error("no upload with id {0}")]
    NotFound(ItemId),

    #[error("upload {id} is {status}, only completed uploads can be downloaded")]
    NotReady { id: ItemId, status: ItemStatus },

    #[error("upload orchestrator has shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, UploadError>;
