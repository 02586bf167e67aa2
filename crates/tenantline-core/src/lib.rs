pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::TenantlineConfig;
pub use error::{Result, TenantlineError};
pub use events::CallEvent;
pub use types::*;
