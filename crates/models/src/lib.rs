//! Typed shapes of the workshop REST API, after envelope normalization.
//!
//! Field names follow the backend's camelCase JSON. Enum variants the client
//! does not know yet decode to `Unknown` instead of failing the whole payload.

pub mod dashboard;
pub mod inventory;
pub mod invoice;
pub mod order;
pub mod review;
pub mod time_slot;
pub mod user;
