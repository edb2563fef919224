pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod harness;
pub mod provision;

pub use db::{BookRepository, Database};
pub use domain::{Book, BookId, Decimal};
pub use error::{Error, MigrationError, PersistenceError, ProvisionError};
pub use provision::{ProvisionedDatabase, Provisioner, TestEnvironment};
