use crate::errors::DecodeError;
use crate::formats::{XlsReader, XlsxReader};
use crate::model::{SpreadsheetFormat, Workbook};

/// How many leading bytes a failed sniff reports.
const LEADING_BYTES: usize = 8;

pub trait SpreadsheetReader {
    fn name(&self) -> &'static str;
    fn format(&self) -> SpreadsheetFormat;
    /// Magic bytes every file of this format starts with.
    fn signature(&self) -> &'static [u8];
    fn decode(&self, bytes: &[u8]) -> Result<Workbook, DecodeError>;
}

pub fn decode_workbook(bytes: &[u8]) -> Result<Workbook, DecodeError> {
    let xlsx = XlsxReader;
    let xls = XlsReader;
    let readers: [&dyn SpreadsheetReader; 2] = [&xlsx, &xls];
    decode_with_readers(bytes, &readers)
}

/// Hands the bytes to the first reader whose signature they carry. Declared
/// media types and extensions are not consulted.
pub fn decode_with_readers(
    bytes: &[u8],
    readers: &[&dyn SpreadsheetReader],
) -> Result<Workbook, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    match readers
        .iter()
        .find(|reader| bytes.starts_with(reader.signature()))
    {
        Some(reader) => reader.decode(bytes),
        None => Err(DecodeError::NoMatchingReader {
            readers: readers.iter().map(|reader| reader.name()).collect(),
            leading: leading_hex(bytes),
        }),
    }
}

fn leading_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(LEADING_BYTES)
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
