//! Durable FIFO queue backed by the `queue` table.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

/// A pending queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// SQLite rowid; identifies this entry among others for the same job.
    pub rowid: i64,
    pub job_id: String,
    /// Unix timestamp (seconds) at which the job was enqueued.
    pub timestamp: i64,
}

/// Appends an entry to the queue.
pub fn push(conn: &Connection, job_id: &str, timestamp: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO queue (job_id, timestamp) VALUES (?1, ?2)",
        params![job_id, timestamp],
    )?;
    Ok(())
}

/// Returns the oldest entry without removing it. Entries sharing a
/// timestamp come out in insertion order.
pub fn peek_oldest(conn: &Connection) -> Result<Option<QueueEntry>, DatabaseError> {
    let entry = conn
        .query_row(
            "SELECT rowid, job_id, timestamp FROM queue ORDER BY timestamp, rowid LIMIT 1",
            [],
            |r| {
                Ok(QueueEntry {
                    rowid: r.get(0)?,
                    job_id: r.get(1)?,
                    timestamp: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Removes a single entry. Returns the number removed (0 or 1).
pub fn remove_entry(conn: &Connection, rowid: i64) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM queue WHERE rowid = ?1", params![rowid])?)
}

/// Removes every entry for a job. Returns the number removed.
pub fn remove_job(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM queue WHERE job_id = ?1", params![job_id])?)
}

/// Number of pending entries.
pub fn len(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |r| r.get(0))?;
    Ok(count as u64)
}

pub fn contains(conn: &Connection, job_id: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM queue WHERE job_id = ?1",
        params![job_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}
