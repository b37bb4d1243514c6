pub mod config;
pub mod dashboard;
pub mod error;
pub mod layout;
pub mod log_sanitize;
pub mod logging;
pub mod registry;
pub mod render;
pub mod ring;
pub mod runner;
pub mod state;
pub mod summary;
pub mod terminal;

pub use dashboard::Dashboard;
pub use error::{Error, Result};
