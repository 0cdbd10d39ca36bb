//! Job row access for the `jobs` table.
//!
//! Functions take a `&Connection` so callers can compose them inside
//! [`Database::with_transaction`](super::Database::with_transaction).

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: String,
    pub key_size: u32,
    pub status: i64,
    pub error_message: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            key_size: row.get("key_size")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
        })
    }
}

/// Inserts a new job row. A primary key conflict is reported as
/// [`DatabaseError::DuplicateId`].
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO jobs (id, key_size, status, error_message) VALUES (?1, ?2, ?3, ?4)",
        params![job.id, job.key_size, job.status, job.error_message],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::DuplicateId(job.id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, key_size, status, error_message FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Returns whether a row with this ID exists.
pub fn exists(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM jobs WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Lists every job row in insertion order.
pub fn list_rows(conn: &Connection) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, key_size, status, error_message FROM jobs ORDER BY rowid")?;
    let rows = stmt
        .query_map([], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lists every job id in insertion order.
pub fn list_ids(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM jobs ORDER BY rowid")?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Updates only the status. Returns the number of rows touched (0 when the
/// id does not exist).
pub fn update_status(conn: &Connection, id: &str, status: i64) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE jobs SET status = ?2 WHERE id = ?1",
        params![id, status],
    )?)
}

/// Stores or clears (`None` sets NULL) the error message.
pub fn update_error_message(
    conn: &Connection,
    id: &str,
    error_message: Option<&str>,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "UPDATE jobs SET error_message = ?2 WHERE id = ?1",
        params![id, error_message],
    )?)
}

/// Deletes a job row. Returns whether a row was removed.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}
