pub mod config;
pub mod display;
pub mod logging;
pub mod sanitize;

pub use config::Config;
pub use logging::init_logging;
