//! Row structs and create DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity matching the
//! database row and, where rows are inserted, a create DTO.

pub mod audit;
pub mod delivery;
pub mod event;
pub mod subscription;
