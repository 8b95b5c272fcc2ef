//! MCP client adapter for the catalog tool gateway.

mod client;
mod handler;
pub mod payload;

pub use client::McpCatalogGateway;
pub use handler::CatalogClientHandler;
