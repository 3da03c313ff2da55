pub mod config;
pub mod env;
pub mod error;
pub mod invocation;
pub mod io;
pub mod json_output;
pub mod logs;
pub mod paths;
pub mod platform;
pub mod review;
pub mod staleness;
pub mod types;
pub mod validation;

pub use error::{PlatformError, Result, ReviewError};
