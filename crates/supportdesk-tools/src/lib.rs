pub mod builtin;
pub mod catalog;
pub mod import;
pub mod registry;

pub use catalog::SqliteCatalog;
pub use import::{import_csv, ImportReport};
pub use registry::ToolRegistry;
