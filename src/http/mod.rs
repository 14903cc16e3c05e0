//! HTTP front end for the rate limit service.

mod guard;
mod server;
mod service;

pub use guard::{client_identifier, enforce, UNKNOWN_CLIENT};
pub use server::HttpServer;
pub use service::{router, CheckRequest};
