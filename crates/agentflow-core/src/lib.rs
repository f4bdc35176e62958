pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, FlowError, Result};
pub use event::EventBus;
pub use traits::{Agent, InterventionHook, Transport};
pub use types::*;
