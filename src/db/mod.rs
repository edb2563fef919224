//! Database module.
//!
//! This module provides:
//! - Connection coordinates and the shared `Database` handle
//! - Versioned migrations with a ledger table
//! - The book repository

pub mod connection;
pub mod migrations;
pub mod repo;

pub use connection::{Backend, ConnectionInfo, Database, SslMode};
pub use migrations::{applied_migrations, apply_migrations};
pub use repo::{BookRepository, IdStrategy};
