pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod route;
pub mod sink;
pub mod source;
pub mod strategy;
pub mod summary;
pub mod transform;
