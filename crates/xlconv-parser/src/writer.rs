use rust_xlsxwriter::{Workbook as XlsxWorkbook, Worksheet, XlsxError};

use crate::errors::EncodeError;
use crate::model::{format_number, CellValue, Sheet, Workbook};

const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// Serializes the workbook as `.xlsx`. The header occupies row 0 and every
/// [`Sheet::rows`] entry follows in order.
pub fn encode_workbook(workbook: &Workbook) -> Result<Vec<u8>, EncodeError> {
    let mut output = XlsxWorkbook::new();

    for sheet in &workbook.sheets {
        let worksheet = output.add_worksheet();
        worksheet
            .set_name(sheet.name.as_str())
            .map_err(|source| EncodeError::SheetName {
                name: sheet.name.clone(),
                source,
            })?;
        write_sheet(worksheet, sheet)?;
    }

    output.save_to_buffer().map_err(EncodeError::Serialize)
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet) -> Result<(), EncodeError> {
    let columns = sheet.output_columns();
    if sheet.rows.len() + 1 > MAX_ROWS || columns.len() > MAX_COLUMNS {
        return Err(EncodeError::TooLarge {
            sheet: sheet.name.clone(),
            rows: sheet.rows.len() + 1,
            columns: columns.len(),
        });
    }

    for (col_index, column) in columns.iter().enumerate() {
        let col = col_index as u16;
        worksheet
            .write_string(0, col, *column)
            .map_err(|source| cell_error(sheet, 0, col, source))?;
    }

    for (row_index, row) in sheet.rows.iter().enumerate() {
        let row_number = (row_index + 1) as u32;
        for (col_index, column) in columns.iter().enumerate() {
            let Some(value) = row.get(*column) else {
                continue;
            };
            let col = col_index as u16;
            write_cell(worksheet, row_number, col, value)
                .map_err(|source| cell_error(sheet, row_number, col, source))?;
        }
    }

    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
) -> Result<(), XlsxError> {
    match value {
        CellValue::Text(text) => worksheet.write_string(row, col, text.as_str())?,
        // Excel has no NaN or infinity; keep them readable as text.
        CellValue::Number(number) if !number.is_finite() => {
            worksheet.write_string(row, col, format_number(*number))?
        }
        CellValue::Number(number) => worksheet.write_number(row, col, *number)?,
        CellValue::Bool(flag) => worksheet.write_boolean(row, col, *flag)?,
    };
    Ok(())
}

fn cell_error(sheet: &Sheet, row: u32, column: u16, source: XlsxError) -> EncodeError {
    EncodeError::Cell {
        sheet: sheet.name.clone(),
        row,
        column,
        source,
    }
}
