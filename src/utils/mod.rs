pub mod error;
pub mod text;
pub mod urls;

pub use error::{AppError, Result};
