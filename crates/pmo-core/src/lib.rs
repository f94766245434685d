pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use access::{can, Actor, Permission, Role};
pub use config::PmoConfig;
pub use error::{PmoError, Result};
pub use events::DomainEvent;
pub use types::*;
