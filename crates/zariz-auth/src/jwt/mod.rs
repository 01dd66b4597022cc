//! Bearer credential decoding and claims.

pub mod claims;
pub mod decoder;

pub use claims::{Claims, Credential};
pub use decoder::ClaimsCodec;
