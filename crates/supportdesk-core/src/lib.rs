pub mod config;
pub mod error;
pub mod event;
pub mod sql_policy;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SupportError};
pub use event::EventBus;
pub use sql_policy::{SqlPolicy, Verdict};
pub use types::*;
