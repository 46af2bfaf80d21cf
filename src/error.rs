// Error types for the row store and its workbook backend

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Coarse classification of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backing file could not be created, opened, read or saved
    Io,
    /// A query matched no rows
    NotFound,
    /// Creating, deleting or naming a sheet failed
    SheetOperation,
    /// A caller-supplied argument was out of range
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read workbook {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },

    #[error("failed to write workbook {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("no matching rows found in sheet {sheet} for {filter}")]
    NotFound { sheet: String, filter: String },

    #[error("sheet {0:?} does not exist")]
    SheetNotFound(String),

    #[error("sheet {0:?} already exists")]
    SheetExists(String),

    #[error("invalid sheet name {name:?}: {reason}")]
    InvalidSheetName { name: String, reason: &'static str },

    #[error("cell coordinate out of range: column {col}, row {row}")]
    InvalidCoordinate { col: u32, row: u32 },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // A sheet that cannot be found in the file cannot be read either
            StoreError::Io(_) | StoreError::Read { .. } | StoreError::Write { .. } | StoreError::SheetNotFound(_) => {
                ErrorKind::Io
            }
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::SheetExists(_) | StoreError::InvalidSheetName { .. } => ErrorKind::SheetOperation,
            StoreError::InvalidCoordinate { .. } => ErrorKind::InvalidInput,
        }
    }

    /// True when a query matched zero rows
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = StoreError::NotFound {
            sheet: "Sheet1".to_string(),
            filter: "Name = Bob".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());

        let err = StoreError::SheetExists("Data".to_string());
        assert_eq!(err.kind(), ErrorKind::SheetOperation);
        assert!(!err.is_not_found());

        let err = StoreError::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = StoreError::SheetNotFound("Typo".to_string());
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = StoreError::InvalidCoordinate { col: 0, row: 1 };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound {
            sheet: "Sheet1".to_string(),
            filter: "Name = Bob".to_string(),
        };
        assert_eq!(err.to_string(), "no matching rows found in sheet Sheet1 for Name = Bob");
    }
}
