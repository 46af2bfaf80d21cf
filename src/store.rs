// Row store over a single sheet of an xlsx workbook

use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::record::{Row, Value};
use crate::workbook::Workbook;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How the header row is derived when the sheet is written back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Columns of the first row only; columns that appear only in later rows are dropped
    FirstRow,
    /// Every column of every row, in first-seen order
    #[default]
    Union,
}

/// Behavior switches for a [`RowStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub header: HeaderPolicy,
    /// Make `update` and `delete` fail with `NotFound` when nothing matches
    pub require_match_on_write: bool,
}

/// Table view of one sheet: the first row names the columns, every later row is a record
///
/// All rows are held in memory. Every mutation rewrites the whole sheet, and
/// the file is opened fresh for each read or write. There is no locking, so
/// use a single writer in a single process.
pub struct RowStore {
    path: PathBuf,
    sheet: String,
    /// Header row as last loaded, adjusted by column adds and removes
    columns: Vec<String>,
    rows: Vec<Row>,
    options: StoreOptions,
}

impl RowStore {
    /// Sheet used when an empty sheet name is given
    pub const DEFAULT_SHEET: &'static str = "Sheet1";

    /// Open the store with default options
    ///
    /// A missing file is created with a single empty sheet. An existing file
    /// is never modified here; if it lacks the sheet, loading fails with
    /// `SheetNotFound`.
    pub fn open<P: AsRef<Path>>(path: P, sheet: &str) -> Result<Self> {
        Self::open_with(path, sheet, StoreOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, sheet: &str, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sheet = if sheet.is_empty() { Self::DEFAULT_SHEET } else { sheet }.to_string();

        if !path.exists() {
            Workbook::create(&path, &sheet)?;
        }

        let mut store = Self {
            path,
            sheet,
            columns: Vec::new(),
            rows: Vec::new(),
            options,
        };
        store.load()?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Rows currently held in memory, in sheet order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reload every row from the sheet, replacing what is in memory
    ///
    /// Cells past the end of the header are dropped. Trailing empty cells
    /// leave their columns out of the row; empty cells before the last
    /// filled one load as empty text.
    pub fn load(&mut self) -> Result<()> {
        let workbook = Workbook::open(&self.path)?;
        let raw = workbook.rows(&self.sheet)?;

        let mut rows = Vec::new();
        let mut columns: Vec<String> = Vec::new();
        if let Some((header, records)) = raw.split_first() {
            columns = header
                .iter()
                .map(|cell| cell.as_ref().map(Value::to_string).unwrap_or_default())
                .collect();
            let header = &columns;

            for (i, cells) in records.iter().enumerate() {
                if cells.len() > header.len() {
                    warn!(
                        sheet = %self.sheet,
                        row = i + 2,
                        dropped = cells.len() - header.len(),
                        "Row has more cells than the header, extra cells dropped"
                    );
                }

                let row: Row = header
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| (column.clone(), cell.clone().unwrap_or_else(|| Value::from(""))))
                    .collect();
                rows.push(row);
            }
        }

        debug!(file = ?self.path, sheet = %self.sheet, count = rows.len(), "Loaded rows");
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }

    /// Rows matching every column of `query`, in sheet order
    ///
    /// Returns `NotFound` when nothing matches.
    pub fn select(&self, query: &Row) -> Result<Vec<Row>> {
        let filter = Filter::new(query);
        let found: Vec<Row> = self.rows.iter().filter(|row| filter.matches(row)).cloned().collect();

        if found.is_empty() {
            return Err(self.not_found(&filter));
        }
        Ok(found)
    }

    /// Append a row and persist
    pub fn insert(&mut self, row: Row) -> Result<()> {
        self.rows.push(row);
        self.save()
    }

    /// Merge `patch` into every row matching `query` and persist
    ///
    /// Returns the number of rows updated.
    pub fn update(&mut self, query: &Row, patch: &Row) -> Result<usize> {
        let filter = Filter::new(query);
        let count = self.rows.iter().filter(|row| filter.matches(row)).count();
        if count == 0 && self.options.require_match_on_write {
            return Err(self.not_found(&filter));
        }

        for row in self.rows.iter_mut().filter(|row| filter.matches(row)) {
            row.merge(patch);
        }

        debug!(sheet = %self.sheet, filter = %filter, count, "Updated rows");
        self.save()?;
        Ok(count)
    }

    /// Remove every row matching `query` and persist
    ///
    /// Returns the number of rows removed.
    pub fn delete(&mut self, query: &Row) -> Result<usize> {
        let filter = Filter::new(query);
        let before = self.rows.len();
        let count = self.rows.iter().filter(|row| filter.matches(row)).count();
        if count == 0 && self.options.require_match_on_write {
            return Err(self.not_found(&filter));
        }

        self.rows.retain(|row| !filter.matches(row));

        debug!(sheet = %self.sheet, filter = %filter, count = before - self.rows.len(), "Deleted rows");
        self.save()?;
        Ok(count)
    }

    /// Set `name` to `default` on every row and persist
    pub fn add_column(&mut self, name: &str, default: impl Into<Value>) -> Result<()> {
        let default = default.into();
        let mut columns = self.header();
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
        self.columns = columns;
        for row in &mut self.rows {
            row.set(name, default.clone());
        }
        self.save()
    }

    /// Remove `name` from every row and persist
    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        self.columns.retain(|c| c != name);
        for row in &mut self.rows {
            row.remove(name);
        }
        self.save()
    }

    /// Sheet names of the backing file, in workbook order
    pub fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(Workbook::open(&self.path)?.sheet_list())
    }

    pub fn sheet_exists(&self, name: &str) -> Result<bool> {
        Ok(self.sheet_names()?.iter().any(|s| s == name))
    }

    /// Column names written as the header row, per the header policy
    pub fn header(&self) -> Vec<String> {
        match self.options.header {
            HeaderPolicy::FirstRow => self
                .rows
                .first()
                .map(|row| row.keys().map(str::to_string).collect())
                .unwrap_or_default(),
            HeaderPolicy::Union => {
                // Loaded header first, so columns with only blank values keep their header cell
                let mut header = self.columns.clone();
                for row in &self.rows {
                    for key in row.keys() {
                        if !header.iter().any(|h| h == key) {
                            header.push(key.to_string());
                        }
                    }
                }
                header
            }
        }
    }

    /// Rewrite the target sheet from the in-memory rows
    ///
    /// The sheet is dropped and recreated at the same position; other sheets
    /// are written back as they were read, formulas and dates included.
    fn save(&self) -> Result<()> {
        let header = self.header();
        if self.options.header == HeaderPolicy::FirstRow {
            let dropped = self
                .rows
                .iter()
                .flat_map(|row| row.keys())
                .filter(|key| !header.iter().any(|h| h == key))
                .count();
            if dropped > 0 {
                warn!(sheet = %self.sheet, dropped, "Values in columns missing from the first row are not saved");
            }
        }

        let mut workbook = Workbook::open(&self.path)?;
        let pos = match workbook.delete_sheet(&self.sheet) {
            Ok(pos) => pos,
            Err(StoreError::SheetNotFound(_)) => workbook.sheet_list().len(),
            Err(e) => return Err(e),
        };
        workbook.insert_sheet(pos, &self.sheet)?;

        for (c, column) in header.iter().enumerate() {
            workbook.set_cell(&self.sheet, c as u32 + 1, 1, Value::Text(column.clone()))?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            for (c, column) in header.iter().enumerate() {
                if let Some(value) = row.get(column) {
                    workbook.set_cell(&self.sheet, c as u32 + 1, r as u32 + 2, value.clone())?;
                }
            }
        }

        workbook.save(&self.path)?;
        debug!(
            file = ?self.path,
            sheet = %self.sheet,
            columns = header.len(),
            rows = self.rows.len(),
            "Saved sheet"
        );
        Ok(())
    }

    fn not_found(&self, filter: &Filter<'_>) -> StoreError {
        StoreError::NotFound {
            sheet: self.sheet.clone(),
            filter: filter.to_string(),
        }
    }
}
