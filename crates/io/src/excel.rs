//! Excel bank exports (xls, xlsx, xlsb, ods) via calamine.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use ledgersync_recon::cells::{excel_serial_to_date, parse_date_str, Cell};
use ledgersync_recon::SourceGrid;

/// Load the first worksheet as a grid anchored at A1.
pub fn load_grid(path: &Path) -> Result<SourceGrid, String> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "Excel file contains no sheets".to_string())?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| format!("Failed to read sheet '{}': {}", first, e))?;

    // calamine trims leading empty rows/columns; put them back so configured
    // column letters keep their meaning
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
    for data_row in range.rows() {
        let mut row = vec![Cell::Empty; start_col as usize];
        row.extend(data_row.iter().map(to_cell));
        rows.push(row);
    }
    Ok(SourceGrid::new(rows))
}

fn to_cell(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.as_str()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            excel_serial_to_date(serial)
                .map(Cell::Date)
                .unwrap_or(Cell::Number(serial))
        }
        Data::DateTimeIso(s) => parse_date_str(s)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::text(s.as_str())),
        Data::DurationIso(s) => Cell::text(s.as_str()),
        Data::Error(e) => Cell::text(format!("#{:?}", e)),
    }
}
