//! Repository layer for book persistence.

use super::{Backend, Database};
use crate::domain::{Book, BookId, Decimal};
use crate::error::PersistenceError;
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;

/// Who produces the identifier of a newly inserted book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// The column default in the schema generates the id.
    #[default]
    StoreGenerated,
    /// A random v4 UUID is generated in-process and submitted with the row.
    ClientGenerated,
}

impl IdStrategy {
    fn client_id(&self) -> Option<BookId> {
        match self {
            IdStrategy::StoreGenerated => None,
            IdStrategy::ClientGenerated => Some(BookId::generate()),
        }
    }
}

/// Repository for `books` rows.
///
/// Holds no state besides the connection; every call stands alone.
#[derive(Debug, Clone)]
pub struct BookRepository {
    db: Database,
    id_strategy: IdStrategy,
}

impl BookRepository {
    /// Create a repository over the given connection.
    pub fn new(db: Database) -> Self {
        BookRepository {
            db,
            id_strategy: IdStrategy::default(),
        }
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Insert a book and return it with its new identifier.
    ///
    /// Any id already present on `book` is ignored; identity always comes
    /// from the configured [`IdStrategy`].
    ///
    /// # Errors
    /// Returns an error if the store rejects the row (constraint violation,
    /// closed pool, lost connection). Nothing is retried.
    pub async fn insert_book(&self, book: &Book) -> Result<Book, PersistenceError> {
        let backend = self.db.backend();
        let client_id = self.id_strategy.client_id();

        let sql = match (backend, client_id.is_some()) {
            (Backend::Postgres, false) => {
                r#"
                INSERT INTO books (title, author, price)
                VALUES ($1, $2, CAST($3 AS NUMERIC))
                RETURNING CAST(id AS TEXT) AS id
                "#
            }
            (Backend::Postgres, true) => {
                r#"
                INSERT INTO books (title, author, price, id)
                VALUES ($1, $2, CAST($3 AS NUMERIC), CAST($4 AS UUID))
                RETURNING CAST(id AS TEXT) AS id
                "#
            }
            (Backend::Sqlite, false) => {
                r#"
                INSERT INTO books (title, author, price)
                VALUES ($1, $2, $3)
                RETURNING id
                "#
            }
            (Backend::Sqlite, true) => {
                r#"
                INSERT INTO books (title, author, price, id)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#
            }
        };

        let mut query = sqlx::query(sql)
            .bind(book.title.clone())
            .bind(book.author.clone())
            .bind(book.price.to_canonical_string());
        if let Some(id) = client_id {
            query = query.bind(id.to_string());
        }

        let row = query.fetch_one(self.db.pool()).await?;
        let id = parse_id(row.try_get::<String, _>("id")?)?;

        debug!(%id, title = %book.title, "Inserted book");
        Ok(book.with_id(id))
    }

    /// Fetch a stored book by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored row cannot be decoded.
    pub async fn get_book(&self, id: BookId) -> Result<Option<Book>, PersistenceError> {
        let sql = match self.db.backend() {
            Backend::Postgres => {
                r#"
                SELECT CAST(id AS TEXT) AS id, title, author, CAST(price AS TEXT) AS price
                FROM books
                WHERE id = CAST($1 AS UUID)
                "#
            }
            Backend::Sqlite => {
                r#"
                SELECT id, title, author, price
                FROM books
                WHERE id = $1
                "#
            }
        };

        let row = sqlx::query(sql)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(book_from_row).transpose()
    }
}

fn parse_id(value: String) -> Result<BookId, PersistenceError> {
    match value.parse::<BookId>() {
        Ok(id) => Ok(id),
        Err(source) => Err(PersistenceError::InvalidId { value, source }),
    }
}

fn book_from_row(row: &AnyRow) -> Result<Book, PersistenceError> {
    let id = parse_id(row.try_get("id")?)?;
    let title: String = row.try_get("title")?;
    let author: String = row.try_get("author")?;
    let price_str: String = row.try_get("price")?;

    let price = Decimal::from_str_canonical(&price_str).map_err(|source| {
        PersistenceError::InvalidPrice {
            value: price_str.clone(),
            source,
        }
    })?;

    Ok(Book {
        id: Some(id),
        title,
        author,
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{apply_migrations, ConnectionInfo};
    use std::path::Path;
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_repo() -> (BookRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let info = ConnectionInfo::sqlite(temp_dir.path().join("books.db"));
        let db = Database::connect(&info).await.expect("connect failed");
        let scripts = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations/sqlite");
        apply_migrations(&db, &scripts)
            .await
            .expect("migrations failed");
        (BookRepository::new(db), temp_dir)
    }

    fn book(title: &str, author: &str, price: &str) -> Book {
        Book::new(title, author, Decimal::from_str(price).unwrap())
    }

    #[tokio::test]
    async fn test_insert_returns_generated_id() {
        let (repo, _temp) = setup_repo().await;
        let input = book("gtc", "Osagie", "20.29");

        let stored = repo.insert_book(&input).await.unwrap();

        let id = stored.id.expect("id should be set");
        assert!(!id.is_nil());
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_eq!(stored.title, "gtc");
        assert_eq!(stored.author, "Osagie");
        assert_eq!(stored.price, input.price);
        assert_eq!(input.id, None, "input must not be mutated");
    }

    #[tokio::test]
    async fn test_identical_inserts_get_distinct_ids() {
        let (repo, _temp) = setup_repo().await;
        let input = book("gtc", "Osagie", "20.29");

        let first = repo.insert_book(&input).await.unwrap();
        let second = repo.insert_book(&input).await.unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_get_book_reads_back_submitted_values() {
        let (repo, _temp) = setup_repo().await;
        let stored = repo
            .insert_book(&book("Dune", "Frank Herbert", "9.50"))
            .await
            .unwrap();

        let fetched = repo
            .get_book(stored.id.unwrap())
            .await
            .unwrap()
            .expect("book should exist");
        assert_eq!(fetched, stored);

        let missing = repo.get_book(BookId::generate()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_client_generated_ids() {
        let (repo, _temp) = setup_repo().await;
        let repo = repo.with_id_strategy(IdStrategy::ClientGenerated);
        assert_eq!(repo.id_strategy(), IdStrategy::ClientGenerated);

        let stored = repo.insert_book(&book("gtc", "Osagie", "1")).await.unwrap();
        let id = stored.id.unwrap();

        let fetched = repo.get_book(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, Some(id));
    }

    #[tokio::test]
    async fn test_negative_price_rejected_by_store() {
        let (repo, _temp) = setup_repo().await;

        let result = repo.insert_book(&book("gtc", "Osagie", "-1.00")).await;
        assert!(matches!(result, Err(PersistenceError::Database(_))));
    }

    #[tokio::test]
    async fn test_empty_title_rejected_by_store() {
        let (repo, _temp) = setup_repo().await;

        let result = repo.insert_book(&book("", "Osagie", "3")).await;
        assert!(matches!(result, Err(PersistenceError::Database(_))));
    }

    #[tokio::test]
    async fn test_closed_pool_fails_without_partial_book() {
        let (repo, _temp) = setup_repo().await;
        repo.db.close().await;

        let result = repo.insert_book(&book("gtc", "Osagie", "20.29")).await;
        assert!(matches!(
            result,
            Err(PersistenceError::Database(sqlx::Error::PoolClosed))
        ));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        match parse_id("not-a-uuid".to_string()) {
            Err(PersistenceError::InvalidId { value, .. }) => assert_eq!(value, "not-a-uuid"),
            other => panic!("Expected InvalidId, got {:?}", other),
        }
    }
}
