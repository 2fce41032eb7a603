use std::io::Cursor;

use calamine::{Reader, Xlsx};

use crate::errors::DecodeError;
use crate::model::{SpreadsheetFormat, Workbook};
use crate::registry::SpreadsheetReader;

use super::read_workbook;

/// Office Open XML workbooks (`.xlsx`), which are ZIP containers.
pub struct XlsxReader;

impl Default for XlsxReader {
    fn default() -> Self {
        Self
    }
}

impl XlsxReader {
    const NAME: &'static str = "XLSX";
    const SIGNATURE: &'static [u8] = b"PK\x03\x04";
}

impl SpreadsheetReader for XlsxReader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Xlsx
    }

    fn signature(&self) -> &'static [u8] {
        Self::SIGNATURE
    }

    fn decode(&self, bytes: &[u8]) -> Result<Workbook, DecodeError> {
        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes)).map_err(|err| DecodeError::Open {
                reader: Self::NAME,
                message: err.to_string(),
            })?;
        read_workbook(Self::NAME, &mut workbook)
    }
}
