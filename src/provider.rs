//! Sheet provider: the workbook-reading boundary.
//!
//! Everything above this module sees sheets as rows of already-rendered cell
//! strings. Row 0 holds column descriptions, row 1 the type annotations,
//! row 2 the field names; data rows start at row 3, and column 0 is the
//! primary key by convention.

use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};

use crate::errors::{CompileError, Result};

/// First data row; rows 0..3 are the description/type/field-name headers.
pub const DATA_ROW_START: usize = 3;

/// Column index of the primary key. Documented convention, not checked.
pub const MAIN_KEY_COL: usize = 0;

/// One sheet, fully rendered to cell strings.
#[derive(Debug, Clone, Default)]
pub struct SheetGrid {
    pub rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Iterator over data-row indices (source order).
    pub fn data_rows(&self) -> impl Iterator<Item = usize> + '_ {
        DATA_ROW_START..self.rows.len()
    }
}

/// Read-only access to the sheets of one workbook. `Sync` because emission
/// tasks for different output files share one source.
pub trait SheetSource: Sync {
    fn sheet(&self, name: &str) -> Result<&SheetGrid>;
}

// ————————————————————————————————————————————————————————————————————————————
// XLSX-BACKED SOURCE
// ————————————————————————————————————————————————————————————————————————————

/// A workbook loaded eagerly from an `.xlsx` file via calamine. All sheets
/// are rendered up front so later access is allocation-free and lock-free.
pub struct XlsxWorkbook {
    sheets: HashMap<String, SheetGrid>,
}

impl XlsxWorkbook {
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook: Xlsx<_> = open_workbook(path)
            .map_err(|e| CompileError::Io(std::io::Error::other(format!("{}: {e}", path.display()))))?;
        let names = workbook.sheet_names().to_vec();
        let mut sheets = HashMap::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| CompileError::Io(std::io::Error::other(format!("{name}: {e}"))))?;
            let rows = range
                .rows()
                .map(|row| row.iter().map(render_cell).collect())
                .collect();
            sheets.insert(name, SheetGrid { rows });
        }
        Ok(Self { sheets })
    }
}

impl SheetSource for XlsxWorkbook {
    fn sheet(&self, name: &str) -> Result<&SheetGrid> {
        self.sheets
            .get(name)
            .ok_or_else(|| CompileError::MissingSheet { name: name.to_string() })
    }
}

/// Render one cell the way the legacy formatter did: empty for empty,
/// minimal decimal text for numbers (`3.0` renders as `3`), `true`/`false`
/// for booleans.
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Bool(b) => b.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IN-MEMORY SOURCE (fixtures)
// ————————————————————————————————————————————————————————————————————————————

/// In-memory workbook used by tests and usable as a fixture source.
#[derive(Debug, Default)]
pub struct MemoryWorkbook {
    sheets: HashMap<String, SheetGrid>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.sheets.insert(name.to_string(), SheetGrid { rows });
        self
    }
}

impl SheetSource for MemoryWorkbook {
    fn sheet(&self, name: &str) -> Result<&SheetGrid> {
        self.sheets
            .get(name)
            .ok_or_else(|| CompileError::MissingSheet { name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sheet_is_an_error() {
        let wb = MemoryWorkbook::new().with_sheet("A", &[&["desc"], &["int"], &["id"]]);
        assert!(wb.sheet("A").is_ok());
        assert!(matches!(wb.sheet("B"), Err(CompileError::MissingSheet { .. })));
    }

    #[test]
    fn ragged_rows_read_as_empty_cells() {
        let wb = MemoryWorkbook::new().with_sheet("A", &[&["a"], &["int", "int"]]);
        let grid = wb.sheet("A").unwrap();
        assert_eq!(grid.cell(0, 1), "");
        assert_eq!(grid.cell(1, 1), "int");
        assert_eq!(grid.cell(9, 9), "");
    }
}
