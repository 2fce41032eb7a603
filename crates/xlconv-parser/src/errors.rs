use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("file is empty")]
    Empty,

    #[error("{reader} could not open workbook: {message}")]
    Open {
        reader: &'static str,
        message: String,
    },

    #[error("{reader} could not read sheet '{sheet}': {message}")]
    Sheet {
        reader: &'static str,
        sheet: String,
        message: String,
    },

    /// No reader recognised the leading bytes.
    #[error("not a spreadsheet file (starts with {leading}); tried {}", .readers.join(", "))]
    NoMatchingReader {
        readers: Vec<&'static str>,
        leading: String,
    },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("sheet name '{name}' rejected: {source}")]
    SheetName {
        name: String,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("sheet '{sheet}' has {rows} rows and {columns} columns, beyond the xlsx grid")]
    TooLarge {
        sheet: String,
        rows: usize,
        columns: usize,
    },

    #[error("sheet '{sheet}' cell ({row}, {column}) could not be written: {source}")]
    Cell {
        sheet: String,
        row: u32,
        column: u16,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("failed to serialize workbook: {0}")]
    Serialize(#[source] rust_xlsxwriter::XlsxError),
}
