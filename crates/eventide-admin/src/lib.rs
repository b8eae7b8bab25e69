//! Eventide admin: prepares and checks the storage backends.

pub mod error;
pub mod setup;
