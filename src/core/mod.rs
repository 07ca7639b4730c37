pub mod cache;
pub mod config;
pub mod cursor;
pub mod errors;
pub mod kernel;
pub mod precision;
pub mod traits;
pub mod types;
