// SheetStore - Row-oriented CRUD over one sheet of an xlsx workbook

pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod store;
pub mod workbook;

// Re-export main types for convenience
pub use config::Config;
pub use error::{ErrorKind, Result, StoreError};
pub use filter::Filter;
pub use record::{Row, Value};
pub use store::{HeaderPolicy, RowStore, StoreOptions};
pub use workbook::Workbook;
