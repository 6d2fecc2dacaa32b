//! Adapters implementing the domain ports.

pub mod cleanup;
pub mod sqlite;
