//! One full run: provision, migrate, insert, dispose.

use crate::config::ProvisionConfig;
use crate::db::{apply_migrations, BookRepository};
use crate::domain::Book;
use crate::error::Error;
use crate::provision::{ProvisionedDatabase, Provisioner};
use std::path::Path;
use tracing::{info, warn};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Migrations applied to the fresh database.
    pub migrations_applied: usize,
    /// The inserted book, with its generated id.
    pub book: Book,
}

/// Provision a database, migrate it, insert `book`, and tear it down.
///
/// The database is disposed on every path out of this function; a failure
/// to dispose is only reported when the run itself succeeded.
///
/// # Errors
/// Returns the first stage that failed.
pub async fn run(config: &ProvisionConfig, book: &Book) -> Result<RunReport, Error> {
    let provisioner = Provisioner::new(config.clone());
    let provisioned = provisioner.provision().await?;

    let outcome = migrate_and_insert(&provisioned, &config.backend_migrations_dir(), book).await;
    let disposed = provisioned.dispose().await;

    match (outcome, disposed) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), disposed) => {
            if let Err(dispose_err) = disposed {
                warn!(error = %dispose_err, "Failed to dispose database after error");
            }
            Err(err)
        }
    }
}

async fn migrate_and_insert(
    provisioned: &ProvisionedDatabase,
    migrations_dir: &Path,
    book: &Book,
) -> Result<RunReport, Error> {
    let db = provisioned.database();

    let migrations_applied = apply_migrations(db, migrations_dir).await?;
    info!(migrations_applied, "Applied migrations");

    let repo = BookRepository::new(db.clone());
    let book = repo.insert_book(book).await?;

    Ok(RunReport {
        migrations_applied,
        book,
    })
}
