pub mod config;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod materials;
pub mod slots;

pub use error::{PortalError, Result};
