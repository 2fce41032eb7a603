//! Files handed to the orchestrator and the media types it accepts.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use xlconv_parser::{SpreadsheetFormat, XLSX_MEDIA_TYPE, XLS_MEDIA_TYPE};

use crate::error::UploadError;

pub const ACCEPTED_MEDIA_TYPES: [&str; 2] = [XLS_MEDIA_TYPE, XLSX_MEDIA_TYPE];

/// Media type used for files whose extension says nothing useful.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

#[async_trait]
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;
    /// The media type the file was declared with; never sniffed.
    fn media_type(&self) -> &str;
    fn size(&self) -> u64;
    async fn read_bytes(&self) -> io::Result<Vec<u8>>;
}

pub fn check_media_type(source: &dyn FileSource) -> Result<(), UploadError> {
    let media_type = source.media_type();
    if ACCEPTED_MEDIA_TYPES
        .iter()
        .any(|accepted| *accepted == media_type)
    {
        Ok(())
    } else {
        Err(UploadError::UnsupportedType {
            name: source.name().to_string(),
            media_type: media_type.to_string(),
        })
    }
}

/// A file already held in memory, such as a multipart upload part.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    media_type: String,
    bytes: Bytes,
}

impl MemoryFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

/// A file on local disk. Its media type comes from the extension.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
    media_type: &'static str,
    size: u64,
}

impl DiskFile {
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            media_type: media_type_for_path(&path),
            name,
            size: metadata.len(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> &str {
        self.media_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

pub fn media_type_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|extension| extension.to_str())
        .and_then(SpreadsheetFormat::from_extension)
        .map(|format| format.media_type())
        .unwrap_or(UNKNOWN_MEDIA_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_extension() {
        assert_eq!(media_type_for_path(Path::new("a/b/ledger.XLSX")), XLSX_MEDIA_TYPE);
        assert_eq!(media_type_for_path(Path::new("ledger.xls")), XLS_MEDIA_TYPE);
        assert_eq!(media_type_for_path(Path::new("ledger.csv")), UNKNOWN_MEDIA_TYPE);
        assert_eq!(media_type_for_path(Path::new("ledger")), UNKNOWN_MEDIA_TYPE);
    }

    #[test]
    fn only_excel_types_pass() {
        let sheet = MemoryFile::new("a.xlsx", XLSX_MEDIA_TYPE, Bytes::new());
        assert!(check_media_type(&sheet).is_ok());

        let text = MemoryFile::new("a.txt", "text/plain", Bytes::new());
        let err = check_media_type(&text).expect_err("text/plain is rejected");
        assert!(matches!(err, UploadError::UnsupportedType { .. }));
    }
}
