use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use xlconv_parser::XLSX_MEDIA_TYPE;

use crate::source::FileSource;

/// Suffix appended to the stem of every converted file name.
pub const CONVERTED_SUFFIX: &str = "_converted";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Identity derived from the file name and the moment it arrived.
    pub fn derive(name: &str, arrived_at: DateTime<Utc>) -> Self {
        Self(format!("{name}-{}", arrived_at.timestamp_millis()))
    }

    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one file. The result only exists once completed and the
/// message only once failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Pending,
    Processing,
    Completed { result: Bytes },
    Error { message: String },
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Pending => ItemStatus::Pending,
            ItemState::Processing => ItemStatus::Processing,
            ItemState::Completed { .. } => ItemStatus::Completed,
            ItemState::Error { .. } => ItemStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub id: ItemId,
    pub name: String,
    pub media_type: String,
    pub size: u64,
    pub progress: u8,
    pub state: ItemState,
}

impl UploadItem {
    pub fn pending(id: ItemId, source: &dyn FileSource) -> Self {
        Self {
            id,
            name: source.name().to_string(),
            media_type: source.media_type().to_string(),
            size: source.size(),
            progress: 0,
            state: ItemState::Pending,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn result(&self) -> Option<&Bytes> {
        match &self.state {
            ItemState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ItemState::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            size: self.size,
            progress: self.progress,
            status: self.status(),
            error: self.error().map(str::to_string),
        }
    }
}

/// Serializable view of an item for presentation layers; never carries the
/// result bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    pub progress: u8,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Bytes,
}

impl Download {
    pub fn from_completed(name: &str, bytes: Bytes) -> Self {
        Self {
            file_name: converted_file_name(name),
            media_type: XLSX_MEDIA_TYPE,
            bytes,
        }
    }
}

/// Strips the last extension (if any) and appends `_converted.xlsx`. Control
/// characters become `_` so the name always fits in a header value.
pub fn converted_file_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, extension)) if !extension.is_empty() && !extension.contains('/') => stem,
        _ => name,
    };
    let stem: String = stem
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    format!("{stem}{CONVERTED_SUFFIX}.xlsx")
}
