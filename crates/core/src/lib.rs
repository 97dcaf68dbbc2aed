//! Domain primitives shared by every archibus crate.
//!
//! This crate has zero internal dependencies so the repository layer, the
//! event bus and the HTTP surface can all use the same validation rules,
//! error type and retry arithmetic.

pub mod audit;
pub mod delivery;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod retry;
pub mod types;
pub mod validation;
