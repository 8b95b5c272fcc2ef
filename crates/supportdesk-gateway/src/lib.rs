mod routes;
mod server;
mod state;

pub use routes::{QueryRequest, QueryResponse};
pub use server::GatewayServer;
