// File-backed cell grid over every sheet of an xlsx workbook
//
// Reading goes through calamine, writing through rust_xlsxwriter. The whole
// workbook is held in memory between `open` and `save`; nothing keeps the
// file open in between. Formulas and date cells are carried through a
// load/save cycle so sheets nobody edits come back as they were read.

use crate::error::{Result, StoreError};
use crate::record::Value;
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Format, Formula};
use std::path::Path;
use tracing::{debug, info};

/// Largest 1-based row number an xlsx sheet can hold
pub const MAX_ROWS: u32 = 1_048_576;
/// Largest 1-based column number an xlsx sheet can hold
pub const MAX_COLS: u32 = 16_384;

const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const DURATION_FORMAT: &str = "[h]:mm:ss";

/// Raw rows of a sheet: row-major, 0-based, `None` for an empty cell
pub type Grid = Vec<Vec<Option<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DateKind {
    Date,
    DateTime,
    Duration,
}

/// Stored cell: a plain value, a date serial, or a formula with its last result
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Value(Value),
    Date { serial: f64, kind: DateKind },
    Formula { formula: String, cached: Option<Value> },
}

impl Cell {
    /// What a reader of the grid sees: dates as their serial, formulas as their result
    fn value(&self) -> Option<Value> {
        match self {
            Cell::Value(value) => Some(value.clone()),
            Cell::Date { serial, .. } => Some(Value::Number(*serial)),
            Cell::Formula { cached, .. } => cached.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    grid: Vec<Vec<Option<Cell>>>,
}

impl Sheet {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            grid: Vec::new(),
        }
    }

    fn put(&mut self, row: usize, col: usize, cell: Cell) {
        if self.grid.len() <= row {
            self.grid.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.grid[row];
        if cells.len() <= col {
            cells.resize(col + 1, None);
        }
        cells[col] = Some(cell);
    }

    fn set_formula(&mut self, row: usize, col: usize, formula: &str) {
        let cached = self
            .grid
            .get(row)
            .and_then(|cells| cells.get(col))
            .and_then(|cell| cell.as_ref())
            .and_then(Cell::value);
        let formula = formula.strip_prefix('=').unwrap_or(formula).to_string();
        self.put(row, col, Cell::Formula { formula, cached });
    }
}

/// In-memory copy of an xlsx workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Empty workbook with no sheets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new file at `path` holding one empty sheet
    pub fn create<P: AsRef<Path>>(path: P, sheet: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut workbook = Self::new();
        workbook.new_sheet(sheet)?;
        workbook.save(path)?;
        info!(file = ?path, sheet, "Created new workbook");
        Ok(workbook)
    }

    /// Read every sheet of the file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut xlsx: Xlsx<_> = open_workbook(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut workbook = Self::new();
        for name in xlsx.sheet_names().to_owned() {
            let range = xlsx.worksheet_range(&name).map_err(|source| StoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;

            let mut sheet = Sheet::new(&name);
            if let Some((start_row, start_col)) = range.start() {
                for (r, cells) in range.rows().enumerate() {
                    for (c, cell) in cells.iter().enumerate() {
                        if let Some(cell) = read_cell(cell) {
                            sheet.put(start_row as usize + r, start_col as usize + c, cell);
                        }
                    }
                }
            }

            let formulas = xlsx.worksheet_formula(&name).map_err(|source| StoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if let Some((start_row, start_col)) = formulas.start() {
                for (r, c, formula) in formulas.cells() {
                    if !formula.trim().is_empty() {
                        sheet.set_formula(start_row as usize + r, start_col as usize + c, formula);
                    }
                }
            }
            workbook.sheets.push(sheet);
        }

        debug!(file = ?path, sheets = workbook.sheets.len(), "Opened workbook");
        Ok(workbook)
    }

    /// Sheet names in workbook order
    pub fn sheet_list(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// All rows of a sheet starting from row 1
    ///
    /// Trailing empty cells of each row and trailing empty rows are trimmed,
    /// so a sheet without data yields no rows. Leading gaps stay as `None`.
    pub fn rows(&self, sheet: &str) -> Result<Grid> {
        let sheet = self
            .sheets
            .iter()
            .find(|s| s.name == sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))?;

        let mut rows: Grid = sheet
            .grid
            .iter()
            .map(|cells| cells.iter().map(|cell| cell.as_ref().and_then(Cell::value)).collect())
            .collect();
        for cells in rows.iter_mut() {
            while cells.last().is_some_and(is_empty_cell) {
                cells.pop();
            }
        }
        while rows.last().is_some_and(|cells| cells.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    /// Set a cell by 1-based column and row
    pub fn set_cell(&mut self, sheet: &str, col: u32, row: u32, value: Value) -> Result<()> {
        check_coordinate(col, row)?;
        let pos = self
            .position(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))?;
        self.sheets[pos].put(row as usize - 1, col as usize - 1, Cell::Value(value));
        Ok(())
    }

    /// Put a formula in a cell by 1-based column and row; a leading `=` is optional
    pub fn set_formula(&mut self, sheet: &str, col: u32, row: u32, formula: &str) -> Result<()> {
        check_coordinate(col, row)?;
        let pos = self
            .position(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))?;
        self.sheets[pos].set_formula(row as usize - 1, col as usize - 1, formula);
        Ok(())
    }

    /// Formula of a cell by 1-based column and row, without the leading `=`
    pub fn formula(&self, sheet: &str, col: u32, row: u32) -> Option<&str> {
        let sheet = self.sheets.iter().find(|s| s.name == sheet)?;
        let cell = sheet
            .grid
            .get((row as usize).checked_sub(1)?)?
            .get((col as usize).checked_sub(1)?)?;
        match cell {
            Some(Cell::Formula { formula, .. }) => Some(formula.as_str()),
            _ => None,
        }
    }

    /// Remove a sheet and return the position it occupied
    pub fn delete_sheet(&mut self, name: &str) -> Result<usize> {
        let pos = self
            .position(name)
            .ok_or_else(|| StoreError::SheetNotFound(name.to_string()))?;
        self.sheets.remove(pos);
        debug!(sheet = name, pos, "Deleted sheet");
        Ok(pos)
    }

    /// Append a new empty sheet
    pub fn new_sheet(&mut self, name: &str) -> Result<()> {
        self.insert_sheet(self.sheets.len(), name)
    }

    /// Insert a new empty sheet at `index` (clamped to the sheet count)
    pub fn insert_sheet(&mut self, index: usize, name: &str) -> Result<()> {
        validate_sheet_name(name)?;
        // Excel compares sheet names case-insensitively
        let lowered = name.to_lowercase();
        if self.sheets.iter().any(|s| s.name.to_lowercase() == lowered) {
            return Err(StoreError::SheetExists(name.to_string()));
        }

        let index = index.min(self.sheets.len());
        self.sheets.insert(index, Sheet::new(name));
        debug!(sheet = name, index, "Created sheet");
        Ok(())
    }

    /// Write the whole workbook to `path`, replacing any existing file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut out = rust_xlsxwriter::Workbook::new();
        let date = Format::new().set_num_format(DATE_FORMAT);
        let datetime = Format::new().set_num_format(DATETIME_FORMAT);
        let duration = Format::new().set_num_format(DURATION_FORMAT);

        for sheet in &self.sheets {
            let worksheet = out.add_worksheet();
            worksheet.set_name(&sheet.name).map_err(write_error(path))?;

            for (r, cells) in sheet.grid.iter().enumerate() {
                for (c, cell) in cells.iter().enumerate() {
                    let (row, col) = (r as u32, c as u16);
                    match cell {
                        None => {}
                        Some(Cell::Value(Value::Text(s))) if s.is_empty() => {}
                        Some(Cell::Value(Value::Text(s))) => {
                            worksheet.write_string(row, col, s).map_err(write_error(path))?;
                        }
                        Some(Cell::Value(Value::Number(n))) => {
                            worksheet.write_number(row, col, *n).map_err(write_error(path))?;
                        }
                        Some(Cell::Value(Value::Bool(b))) => {
                            worksheet.write_boolean(row, col, *b).map_err(write_error(path))?;
                        }
                        Some(Cell::Date { serial, kind }) => {
                            let format = match kind {
                                DateKind::Date => &date,
                                DateKind::DateTime => &datetime,
                                DateKind::Duration => &duration,
                            };
                            worksheet
                                .write_number_with_format(row, col, *serial, format)
                                .map_err(write_error(path))?;
                        }
                        Some(Cell::Formula { formula, cached }) => {
                            let mut formula = Formula::new(formula.as_str());
                            if let Some(result) = cached {
                                formula = formula.set_result(formula_result(result));
                            }
                            worksheet.write_formula(row, col, formula).map_err(write_error(path))?;
                        }
                    }
                }
            }
        }

        out.save(path).map_err(write_error(path))?;
        debug!(file = ?path, sheets = self.sheets.len(), "Saved workbook");
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }
}

fn write_error(path: &Path) -> impl Fn(rust_xlsxwriter::XlsxError) -> StoreError + '_ {
    move |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn read_cell(cell: &Data) -> Option<Cell> {
    let value = match cell {
        Data::Empty => return None,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            let kind = if dt.is_duration() {
                DateKind::Duration
            } else if serial.fract() == 0.0 {
                DateKind::Date
            } else {
                DateKind::DateTime
            };
            return Some(Cell::Date { serial, kind });
        }
        other => Value::Text(other.to_string()),
    };
    Some(Cell::Value(value))
}

/// Cached formula result as the xlsx writer expects it
fn formula_result(value: &Value) -> String {
    match value {
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

fn is_empty_cell(cell: &Option<Value>) -> bool {
    cell.as_ref().is_none_or(Value::is_blank)
}

fn check_coordinate(col: u32, row: u32) -> Result<()> {
    if col == 0 || col > MAX_COLS || row == 0 || row > MAX_ROWS {
        return Err(StoreError::InvalidCoordinate { col, row });
    }
    Ok(())
}

/// Check a sheet name against the xlsx naming rules
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.chars().count() > MAX_SHEET_NAME_LEN {
        "must be at most 31 characters"
    } else if name.contains(INVALID_SHEET_CHARS) {
        "must not contain any of [ ] : * ? / \\"
    } else if name.starts_with('\'') || name.ends_with('\'') {
        "must not start or end with an apostrophe"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidSheetName {
        name: name.to_string(),
        reason,
    })
}

/// Column letters for a 1-based column number (1 -> "A", 27 -> "AA")
pub fn column_name(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1-style name for a 1-based column and row
pub fn cell_name(col: u32, row: u32) -> Result<String> {
    check_coordinate(col, row)?;
    Ok(format!("{}{}", column_name(col), row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cell_name() {
        assert_eq!(cell_name(1, 1).unwrap(), "A1");
        assert_eq!(cell_name(26, 10).unwrap(), "Z10");
        assert_eq!(cell_name(27, 3).unwrap(), "AA3");
        assert_eq!(cell_name(702, 1).unwrap(), "ZZ1");
        assert_eq!(cell_name(703, 1).unwrap(), "AAA1");
        assert_eq!(cell_name(MAX_COLS, MAX_ROWS).unwrap(), "XFD1048576");

        assert!(cell_name(0, 1).is_err());
        assert!(cell_name(1, 0).is_err());
        assert!(cell_name(MAX_COLS + 1, 1).is_err());
    }

    #[test]
    fn test_validate_sheet_name() {
        assert!(validate_sheet_name("Sheet1").is_ok());
        assert!(validate_sheet_name("Q1 results").is_ok());

        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"a".repeat(32)).is_err());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("what?").is_err());
        assert!(validate_sheet_name("'quoted").is_err());
    }

    #[test]
    fn test_create_writes_single_empty_sheet() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("new.xlsx");

        Workbook::create(&path, "People").unwrap();
        assert!(path.exists());

        let workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.sheet_list(), vec!["People"]);
        assert!(workbook.rows("People").unwrap().is_empty());
    }

    #[test]
    fn test_save_and_open_keeps_values_and_types() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("typed.xlsx");

        let mut workbook = Workbook::new();
        workbook.new_sheet("Data").unwrap();
        workbook.set_cell("Data", 1, 1, Value::from("Name")).unwrap();
        workbook.set_cell("Data", 2, 1, Value::from("Age")).unwrap();
        workbook.set_cell("Data", 3, 1, Value::from("Active")).unwrap();
        workbook.set_cell("Data", 1, 2, Value::from("Alice")).unwrap();
        workbook.set_cell("Data", 2, 2, Value::Number(25.0)).unwrap();
        workbook.set_cell("Data", 3, 2, Value::Bool(true)).unwrap();
        workbook.save(&path).unwrap();

        let reopened = Workbook::open(&path).unwrap();
        let rows = reopened.rows("Data").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], Some(Value::from("Alice")));
        assert_eq!(rows[1][1], Some(Value::Number(25.0)));
        assert_eq!(rows[1][2], Some(Value::Bool(true)));
    }

    #[test]
    fn test_rows_keep_leading_gaps_and_trim_trailing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("offset.xlsx");

        let mut workbook = Workbook::new();
        workbook.new_sheet("Data").unwrap();
        workbook.set_cell("Data", 2, 2, Value::from("B2")).unwrap();
        workbook.set_cell("Data", 4, 3, Value::from("D3")).unwrap();
        workbook.set_cell("Data", 5, 3, Value::from("")).unwrap();
        workbook.save(&path).unwrap();

        let rows = Workbook::open(&path).unwrap().rows("Data").unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_empty());
        assert_eq!(rows[1], vec![None, Some(Value::from("B2"))]);
        assert_eq!(rows[2], vec![None, None, None, Some(Value::from("D3"))]);
    }

    #[test]
    fn test_rows_missing_sheet() {
        let workbook = Workbook::new();
        let err = workbook.rows("Nope").unwrap_err();
        assert!(matches!(err, StoreError::SheetNotFound(name) if name == "Nope"));
    }

    #[test]
    fn test_set_cell_rejects_bad_coordinates() {
        let mut workbook = Workbook::new();
        workbook.new_sheet("Data").unwrap();

        assert!(matches!(
            workbook.set_cell("Data", 0, 1, Value::from("x")),
            Err(StoreError::InvalidCoordinate { col: 0, row: 1 })
        ));
        assert!(matches!(
            workbook.set_cell("Other", 1, 1, Value::from("x")),
            Err(StoreError::SheetNotFound(_))
        ));
    }

    #[test]
    fn test_sheet_management() {
        let mut workbook = Workbook::new();
        workbook.new_sheet("First").unwrap();
        workbook.new_sheet("Second").unwrap();
        workbook.new_sheet("Third").unwrap();

        assert!(matches!(workbook.new_sheet("second"), Err(StoreError::SheetExists(_))));
        assert!(matches!(
            workbook.new_sheet("bad:name"),
            Err(StoreError::InvalidSheetName { .. })
        ));

        let pos = workbook.delete_sheet("Second").unwrap();
        assert_eq!(pos, 1);
        assert!(!workbook.has_sheet("Second"));
        assert!(matches!(workbook.delete_sheet("Second"), Err(StoreError::SheetNotFound(_))));

        workbook.insert_sheet(pos, "Second").unwrap();
        assert_eq!(workbook.sheet_list(), vec!["First", "Second", "Third"]);

        workbook.insert_sheet(99, "Last").unwrap();
        assert_eq!(workbook.sheet_list().last().map(String::as_str), Some("Last"));
    }

    #[test]
    fn test_save_keeps_every_sheet() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("multi.xlsx");

        let mut workbook = Workbook::new();
        workbook.new_sheet("A").unwrap();
        workbook.new_sheet("B").unwrap();
        workbook.set_cell("B", 1, 1, Value::from("kept")).unwrap();
        workbook.save(&path).unwrap();

        let reopened = Workbook::open(&path).unwrap();
        assert_eq!(reopened.sheet_list(), vec!["A", "B"]);
        assert_eq!(reopened.rows("B").unwrap(), vec![vec![Some(Value::from("kept"))]]);
    }

    #[test]
    fn test_save_keeps_formulas_and_dates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("calc.xlsx");

        let mut source = rust_xlsxwriter::Workbook::new();
        let worksheet = source.add_worksheet();
        worksheet.set_name("Calc").unwrap();
        worksheet.write_number(0, 0, 4).unwrap();
        worksheet.write_formula(0, 1, Formula::new("=A1*10").set_result("40")).unwrap();
        let date = Format::new().set_num_format(DATE_FORMAT);
        worksheet.write_number_with_format(1, 0, 45306, &date).unwrap();
        source.save(&path).unwrap();

        let workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.formula("Calc", 2, 1), Some("A1*10"));
        assert_eq!(workbook.rows("Calc").unwrap()[0][1], Some(Value::Number(40.0)));
        workbook.save(&path).unwrap();

        let mut xlsx: Xlsx<_> = open_workbook(&path).unwrap();
        let formulas = xlsx.worksheet_formula("Calc").unwrap();
        assert_eq!(formulas.get_value((0, 1)).map(String::as_str), Some("A1*10"));

        let range = xlsx.worksheet_range("Calc").unwrap();
        match range.get_value((1, 0)) {
            Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 45306.0),
            other => panic!("expected a date cell, got {:?}", other),
        }
        assert_eq!(range.get_value((0, 1)), Some(&Data::Float(40.0)));
    }

    #[test]
    fn test_set_formula() {
        let mut workbook = Workbook::new();
        workbook.new_sheet("Calc").unwrap();
        workbook.set_cell("Calc", 1, 1, Value::Number(2.0)).unwrap();
        workbook.set_formula("Calc", 1, 1, "=1+1").unwrap();

        assert_eq!(workbook.formula("Calc", 1, 1), Some("1+1"));
        assert_eq!(workbook.rows("Calc").unwrap(), vec![vec![Some(Value::Number(2.0))]]);
        assert_eq!(workbook.formula("Calc", 2, 1), None);
        assert_eq!(workbook.formula("Calc", 0, 1), None);
    }

    #[test]
    fn test_open_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Workbook::open(temp.path().join("missing.xlsx")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
