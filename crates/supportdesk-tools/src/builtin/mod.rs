pub mod catalog;

pub use catalog::{GetSchemaTool, ListDatabasesTool, RunSqlTool, ValidateSqlTool};
