//! Discovery and application of versioned SQL migration scripts.
//!
//! Scripts live in one directory per backend and are applied in filename
//! order. Each applied script is recorded in the `schema_migrations` ledger
//! so that re-running the set only applies what is new.
//!
//! Scripts use the sql-migrate layout:
//!
//! ```sql
//! -- +migrate Up
//! CREATE TABLE ...;
//!
//! -- +migrate Down
//! DROP TABLE ...;
//! ```
//!
//! A statement ends at the first line whose code, ignoring a trailing `--`
//! comment, ends in `;`. Semicolons inside string literals or comments do not
//! split. A statement with line-final semicolons of its own (e.g. a function
//! body) is wrapped in `-- +migrate StatementBegin` /
//! `-- +migrate StatementEnd`. A file without any markers is all "up".
//!
//! `-- +migrate Up notransaction` runs the up statements outside a
//! transaction, for statements such as `CREATE INDEX CONCURRENTLY` or
//! `VACUUM` that refuse to run inside one.

use super::Database;
use crate::error::MigrationError;
use sqlx::Row;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LEDGER_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (\
     id TEXT PRIMARY KEY, \
     seq BIGINT NOT NULL, \
     applied_at BIGINT NOT NULL)";

/// `seq` numbers ledger rows in the order they were applied.
const RECORD_SQL: &str = "INSERT INTO schema_migrations (id, seq, applied_at) \
     SELECT $1, COALESCE(MAX(seq), 0) + 1, $2 FROM schema_migrations";

const NO_TRANSACTION: &str = "notransaction";

/// One migration script loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// File name; also the ledger key.
    pub id: String,
    /// Leading numeric prefix of the file name, if any.
    pub version: Option<u64>,
    /// Statements of the up section, in order.
    pub up: Vec<String>,
    /// Up statements run one by one on the pool instead of in a transaction.
    pub no_transaction: bool,
}

impl Migration {
    /// Parse a script's contents.
    ///
    /// # Errors
    /// Returns `MigrationError::Malformed` for an unterminated statement block,
    /// an unknown `+migrate` directive or an unknown directive option.
    pub fn parse(id: &str, contents: &str) -> Result<Self, MigrationError> {
        let up = parse_up_section(id, contents)?;
        Ok(Migration {
            id: id.to_string(),
            version: version_prefix(id),
            up: up.statements,
            no_transaction: up.no_transaction,
        })
    }

    /// Versioned scripts first, numerically; unversioned ones after, by name.
    fn cmp_order(&self, other: &Self) -> Ordering {
        match (self.version, other.version) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.id.cmp(&other.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.id.cmp(&other.id),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

#[derive(Default)]
struct UpSection {
    statements: Vec<String>,
    no_transaction: bool,
}

/// A `-- +migrate <name> [options...]` line.
struct Directive<'a> {
    name: &'a str,
    options: Vec<&'a str>,
}

fn version_prefix(id: &str) -> Option<u64> {
    let digits: String = id.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn parse_up_section(id: &str, contents: &str) -> Result<UpSection, MigrationError> {
    let malformed = |reason: String| MigrationError::Malformed {
        id: id.to_string(),
        reason,
    };

    let has_markers = contents
        .lines()
        .any(|line| directive(line).is_some_and(|d| d.name == "Up" || d.name == "Down"));
    let mut section = if has_markers {
        Section::Preamble
    } else {
        Section::Up
    };

    let mut up = UpSection::default();
    let mut buffer = String::new();
    let mut in_block = false;

    for (line_no, line) in contents.lines().enumerate() {
        if let Some(d) = directive(line) {
            match d.name {
                "Up" | "Down" => {
                    if in_block {
                        return Err(malformed(format!(
                            "line {}: section marker inside StatementBegin block",
                            line_no + 1
                        )));
                    }
                    if let Some(option) = d.options.iter().find(|o| **o != NO_TRANSACTION) {
                        return Err(malformed(format!(
                            "line {}: unknown option {:?}",
                            line_no + 1,
                            option
                        )));
                    }
                    if section == Section::Up {
                        push_statement(&mut up.statements, &buffer);
                    }
                    buffer.clear();
                    section = if d.name == "Up" {
                        up.no_transaction |= d.options.contains(&NO_TRANSACTION);
                        Section::Up
                    } else {
                        Section::Down
                    };
                }
                "StatementBegin" => {
                    if in_block {
                        return Err(malformed(format!(
                            "line {}: nested StatementBegin",
                            line_no + 1
                        )));
                    }
                    if section == Section::Up {
                        push_statement(&mut up.statements, &buffer);
                    }
                    buffer.clear();
                    in_block = true;
                }
                "StatementEnd" => {
                    if !in_block {
                        return Err(malformed(format!(
                            "line {}: StatementEnd without StatementBegin",
                            line_no + 1
                        )));
                    }
                    in_block = false;
                    if section == Section::Up {
                        push_statement(&mut up.statements, &buffer);
                    }
                    buffer.clear();
                }
                other => {
                    return Err(malformed(format!(
                        "line {}: unknown directive {:?}",
                        line_no + 1,
                        other
                    )));
                }
            }
            continue;
        }

        if section != Section::Up {
            continue;
        }

        if !in_block {
            if let Some(body) = strip_line_comment(line).trim_end().strip_suffix(';') {
                buffer.push_str(body);
                push_statement(&mut up.statements, &buffer);
                buffer.clear();
                continue;
            }
        }
        buffer.push_str(line);
        buffer.push('\n');
    }

    if in_block {
        return Err(malformed("StatementBegin without StatementEnd".to_string()));
    }
    if section == Section::Up {
        push_statement(&mut up.statements, &buffer);
    }

    Ok(up)
}

fn directive(line: &str) -> Option<Directive<'_>> {
    let rest = line.trim().strip_prefix("--")?.trim_start();
    let mut words = rest.strip_prefix("+migrate")?.split_whitespace();
    let name = words.next()?;
    Some(Directive {
        name,
        options: words.collect(),
    })
}

/// `line` up to a `--` comment that starts outside a string literal.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_literal = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_literal = !in_literal,
            b'-' if !in_literal && bytes.get(i + 1) == Some(&b'-') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn push_statement(statements: &mut Vec<String>, buffer: &str) {
    let has_sql = buffer.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    });
    if has_sql {
        statements.push(buffer.trim().to_string());
    }
}

/// Load every `*.sql` script in `dir`, sorted into apply order.
///
/// # Errors
/// Returns an error if the directory or a script cannot be read or parsed.
pub fn discover(dir: &Path) -> Result<Vec<Migration>, MigrationError> {
    let entries = std::fs::read_dir(dir).map_err(|source| MigrationError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MigrationError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            paths.push(path);
        }
    }

    let mut migrations = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = std::fs::read_to_string(&path).map_err(|source| {
            MigrationError::ReadFile {
                path: path.clone(),
                source,
            }
        })?;
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        migrations.push(Migration::parse(&id, &contents)?);
    }

    migrations.sort_by(Migration::cmp_order);
    Ok(migrations)
}

/// Ids recorded in the ledger, oldest first. Creates the ledger if missing.
///
/// # Errors
/// Returns `MigrationError::Ledger` if the ledger cannot be read.
pub async fn applied_migrations(db: &Database) -> Result<Vec<String>, MigrationError> {
    sqlx::query(LEDGER_TABLE_SQL)
        .execute(db.pool())
        .await
        .map_err(MigrationError::Ledger)?;

    let rows = sqlx::query("SELECT id FROM schema_migrations ORDER BY seq ASC")
        .fetch_all(db.pool())
        .await
        .map_err(MigrationError::Ledger)?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("id"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(MigrationError::Ledger)
}

/// Apply every migration in `dir` not yet recorded in the ledger.
///
/// Returns the number of migrations newly applied; `0` when the database is
/// already up to date.
///
/// # Errors
/// Returns an error if discovery fails, the ledger names a script that no
/// longer exists, or a script fails to execute. Each script commits together
/// with its ledger row, so a failing script leaves no ledger entry behind.
/// A `notransaction` script is recorded only after all its statements
/// succeed, but statements that ran before a failure stay applied.
pub async fn apply_migrations(db: &Database, dir: &Path) -> Result<usize, MigrationError> {
    let migrations = discover(dir)?;
    let applied: HashSet<String> = applied_migrations(db).await?.into_iter().collect();

    let known: HashSet<&str> = migrations.iter().map(|m| m.id.as_str()).collect();
    if let Some(unknown) = applied.iter().find(|id| !known.contains(id.as_str())) {
        return Err(MigrationError::UnknownApplied(unknown.clone()));
    }

    info!(
        dir = %dir.display(),
        total = migrations.len(),
        already_applied = applied.len(),
        "Running database migrations..."
    );

    let mut count = 0;
    for migration in migrations.iter().filter(|m| !applied.contains(&m.id)) {
        apply_one(db, migration).await?;
        count += 1;
    }

    info!(applied = count, "Migrations completed successfully");
    Ok(count)
}

async fn apply_one(db: &Database, migration: &Migration) -> Result<(), MigrationError> {
    let apply_err = |source| MigrationError::Apply {
        id: migration.id.clone(),
        source,
    };

    debug!(
        id = %migration.id,
        statements = migration.up.len(),
        no_transaction = migration.no_transaction,
        "Applying migration"
    );

    if migration.no_transaction {
        for statement in &migration.up {
            sqlx::query(statement)
                .execute(db.pool())
                .await
                .map_err(apply_err)?;
        }
        sqlx::query(RECORD_SQL)
            .bind(migration.id.clone())
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(db.pool())
            .await
            .map_err(apply_err)?;
        return Ok(());
    }

    let mut tx = db.pool().begin().await.map_err(apply_err)?;

    for statement in &migration.up {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(apply_err)?;
    }

    sqlx::query(RECORD_SQL)
        .bind(migration.id.clone())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(apply_err)?;

    tx.commit().await.map_err(apply_err)?;
    Ok(())
}
