//! Spreadsheet import: one-off loaders run from the command line at setup
//! time, never from a request handler.

pub mod loaders;
pub mod workbook;

pub use loaders::{run_all, run_loader, ImportReport, SheetReport, DEFAULT_WORKBOOKS};
