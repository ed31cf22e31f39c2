pub mod api;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod negotiate;
pub mod server;
mod signal;
