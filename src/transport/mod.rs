//! External-facing surfaces layered on top of the alarm engine.

pub mod admin;

pub use admin::{router, AdminState};
