use std::io::Cursor;

use calamine::{Reader, Xls};

use crate::errors::DecodeError;
use crate::model::{SpreadsheetFormat, Workbook};
use crate::registry::SpreadsheetReader;

use super::read_workbook;

/// Legacy BIFF workbooks (`.xls`) stored in an OLE compound file.
pub struct XlsReader;

impl Default for XlsReader {
    fn default() -> Self {
        Self
    }
}

impl XlsReader {
    const NAME: &'static str = "XLS";
    const SIGNATURE: &'static [u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
}

impl SpreadsheetReader for XlsReader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Xls
    }

    fn signature(&self) -> &'static [u8] {
        Self::SIGNATURE
    }

    fn decode(&self, bytes: &[u8]) -> Result<Workbook, DecodeError> {
        let mut workbook: Xls<_> =
            Xls::new(Cursor::new(bytes)).map_err(|err| DecodeError::Open {
                reader: Self::NAME,
                message: err.to_string(),
            })?;
        read_workbook(Self::NAME, &mut workbook)
    }
}
