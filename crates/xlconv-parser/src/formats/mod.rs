mod common;
mod xls;
mod xlsx;

pub use xls::XlsReader;
pub use xlsx::XlsxReader;

pub(crate) use common::{read_workbook, EMPTY_HEADER};
