use std::collections::{BTreeMap, HashSet};
use std::fmt;

pub const XLS_MEDIA_TYPE: &str = "application/vnd.ms-excel";
pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpreadsheetFormat {
    Xls,
    Xlsx,
}

impl SpreadsheetFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Xls => XLS_MEDIA_TYPE,
            SpreadsheetFormat::Xlsx => XLSX_MEDIA_TYPE,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Xls => "xls",
            SpreadsheetFormat::Xlsx => "xlsx",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.trim() {
            XLS_MEDIA_TYPE => Some(SpreadsheetFormat::Xls),
            XLSX_MEDIA_TYPE => Some(SpreadsheetFormat::Xlsx),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xls" => Some(SpreadsheetFormat::Xls),
            "xlsx" => Some(SpreadsheetFormat::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A single non-empty cell. Empty cells are never materialized; they are
/// simply absent from their [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(number) => Some(*number),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(number) => f.write_str(&format_number(*number)),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
        }
    }
}

/// Renders a number the way spreadsheet headers show it: integral values
/// without a trailing `.0`, everything else in shortest round-trip form.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number == f64::INFINITY {
        "Infinity".to_string()
    } else if number == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

/// One data row keyed by header name. Column order lives on the [`Sheet`].
pub type Row = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, K, V>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        let row = cells
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|existing| existing == column)
    }

    /// Renames a header column in place. When `to` already exists the `from`
    /// column is dropped instead so the header never holds duplicates.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        let Some(index) = self.columns.iter().position(|column| column == from) else {
            return;
        };
        if self.has_column(to) {
            self.columns.remove(index);
        } else {
            self.columns[index] = to.to_string();
        }
    }

    /// Header columns followed by any row keys the header does not list, in
    /// first-seen order.
    pub fn output_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = columns.iter().copied().collect();
        for row in &self.rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key);
                }
            }
        }
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.rows.len()).sum()
    }
}
