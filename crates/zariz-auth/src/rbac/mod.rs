//! Authorization policy applied to every credential entering the store.

pub mod policy;

pub use policy::{PolicyViolation, RolePolicy};
