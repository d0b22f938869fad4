//! In-memory ledger backend.

use std::collections::BTreeMap;

use crate::cells::Cell;
use crate::error::ReconError;
use crate::ledger::{LedgerDocument, LedgerSheet};

#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    name: String,
    rows: BTreeMap<u32, BTreeMap<u16, Cell>>,
    /// Opaque style id per row, copied on append.
    styles: BTreeMap<u32, u32>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn set_row(&mut self, row: u32, cells: Vec<Cell>) {
        let entry = self.rows.entry(row).or_default();
        for (col, cell) in cells.into_iter().enumerate() {
            if cell != Cell::Empty {
                entry.insert(col as u16, cell);
            }
        }
    }

    pub fn set_row_style(&mut self, row: u32, style: u32) {
        self.styles.insert(row, style);
    }

    pub fn row_style(&self, row: u32) -> Option<u32> {
        self.styles.get(&row).copied()
    }
}

impl LedgerSheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> u32 {
        self.rows.keys().next_back().map(|r| r + 1).unwrap_or(0)
    }

    fn cell(&self, row: u32, col: u16) -> Cell {
        self.rows
            .get(&row)
            .and_then(|r| r.get(&col))
            .cloned()
            .unwrap_or(Cell::Empty)
    }

    fn append_row(
        &mut self,
        row: u32,
        cells: &[(u16, Cell)],
        style_from: Option<u32>,
    ) -> Result<(), ReconError> {
        let entry = self.rows.entry(row).or_default();
        for (col, cell) in cells {
            entry.entry(*col).or_insert_with(|| cell.clone());
        }
        if let Some(style) = style_from.and_then(|r| self.styles.get(&r).copied()) {
            self.styles.insert(row, style);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    sheets: Vec<MemorySheet>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: MemorySheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

impl LedgerDocument for MemoryLedger {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut dyn LedgerSheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .map(|s| s as &mut dyn LedgerSheet)
    }
}
