pub mod error;
pub mod orchestrator;
pub mod rules;
pub mod source;
pub mod transform;
pub mod upload;
mod worker;

pub use error::{TransformError, UploadError};
pub use orchestrator::{Orchestrator, OrchestratorHandle, Snapshot};
pub use rules::{FieldRule, FIELD_RULES};
pub use source::{DiskFile, FileSource, MemoryFile, ACCEPTED_MEDIA_TYPES};
pub use transform::{transform, TransformEngine};
pub use upload::{Download, ItemId, ItemState, ItemStatus, ItemSummary, UploadItem};
