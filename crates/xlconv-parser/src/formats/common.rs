use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek};

use calamine::{Data, Range, Reader};

use crate::errors::DecodeError;
use crate::model::{CellValue, Row, Sheet, Workbook};

/// Header name given to columns whose header cell is blank.
pub(crate) const EMPTY_HEADER: &str = "__EMPTY";

pub(crate) fn read_workbook<RS, R>(
    reader_name: &'static str,
    workbook: &mut R,
) -> Result<Workbook, DecodeError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: fmt::Display,
{
    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|err| DecodeError::Sheet {
                reader: reader_name,
                sheet: sheet_name.clone(),
                message: err.to_string(),
            })?;
        sheets.push(sheet_from_range(sheet_name, &range));
    }
    Ok(Workbook::new(sheets))
}

/// The first row of the used range is the header; every later row with at
/// least one non-empty cell becomes a [`Row`].
fn sheet_from_range(name: String, range: &Range<Data>) -> Sheet {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Sheet::new(name);
    };

    let columns = header_columns(header);
    let mut sheet = Sheet::with_columns(name, columns);

    for cells in rows {
        let row: Row = sheet
            .columns
            .iter()
            .zip(cells)
            .filter_map(|(column, cell)| cell_value(cell).map(|value| (column.clone(), value)))
            .collect();
        if !row.is_empty() {
            sheet.rows.push(row);
        }
    }

    sheet
}

fn header_columns(header: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .map(|cell| {
            let base = cell_value(cell)
                .map(|value| value.to_string())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| EMPTY_HEADER.to_string());
            unique_header(base, &mut seen)
        })
        .collect()
}

/// Repeated names get `_1`, `_2`, ... suffixes, skipping any suffixed name a
/// real header already took.
fn unique_header(base: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.get(&base).copied().unwrap_or(0);
    if count == 0 {
        seen.insert(base.clone(), 1);
        return base;
    }

    let mut counter = count;
    let mut candidate = format!("{base}_{counter}");
    while seen.contains_key(&candidate) {
        counter += 1;
        candidate = format!("{base}_{counter}");
    }
    seen.insert(base, counter + 1);
    seen.insert(candidate.clone(), 1);
    candidate
}

fn cell_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::String(text) => Some(CellValue::Text(text.clone())),
        Data::Int(value) => Some(CellValue::Number(*value as f64)),
        Data::Float(value) => Some(CellValue::Number(*value)),
        Data::Bool(value) => Some(CellValue::Bool(*value)),
        // Date cells surface as their serial number, matching raw cell values.
        Data::DateTime(value) => Some(CellValue::Number(value.as_f64())),
        Data::DateTimeIso(text) | Data::DurationIso(text) => Some(CellValue::Text(text.clone())),
        Data::Error(err) => Some(CellValue::Text(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_headers_are_suffixed() {
        let header = vec![
            Data::String("A".into()),
            Data::String("A".into()),
            Data::Empty,
            Data::String("A".into()),
            Data::Empty,
        ];
        assert_eq!(
            header_columns(&header),
            vec!["A", "A_1", "__EMPTY", "A_2", "__EMPTY_1"]
        );
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let header = vec![
            Data::String("A_1".into()),
            Data::String("A".into()),
            Data::String("A".into()),
        ];
        assert_eq!(header_columns(&header), vec!["A_1", "A", "A_2"]);
    }

    #[test]
    fn numeric_headers_render_without_fraction() {
        let header = vec![Data::Float(2024.0), Data::Int(7), Data::Bool(true)];
        assert_eq!(header_columns(&header), vec!["2024", "7", "TRUE"]);
    }

    #[test]
    fn error_cells_become_their_code() {
        let value = cell_value(&Data::Error(calamine::CellErrorType::Div0));
        assert_eq!(value, Some(CellValue::Text("#DIV/0!".into())));
    }
}
