pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod runtime;
pub mod storage;

pub use storage::Storage;
