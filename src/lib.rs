pub mod cli;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod records;
pub mod series;
pub mod utils;

pub use error::{AppError, Result};
