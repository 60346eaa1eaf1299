pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod placement;
pub mod types;

pub use config::AppConfig;
pub use error::{EngineError, EngineResult};
