pub mod config;
pub mod constants;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod logging;
pub mod release;
pub mod ring;
pub mod server;
pub mod status;
pub mod supervisor;

pub use error::{BuildcastError, Result};
