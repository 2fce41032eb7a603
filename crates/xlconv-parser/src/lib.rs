pub mod errors;
pub mod formats;
pub mod model;
mod registry;
mod writer;

pub use errors::{DecodeError, EncodeError};
pub use model::{
    CellValue, Row, Sheet, SpreadsheetFormat, Workbook, XLSX_MEDIA_TYPE, XLS_MEDIA_TYPE,
};
pub use registry::{decode_with_readers, decode_workbook, SpreadsheetReader};
pub use writer::encode_workbook;
