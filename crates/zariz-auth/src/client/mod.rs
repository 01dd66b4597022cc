//! Clients for the external auth collaborator.

pub mod http;

pub use http::HttpAuthService;
