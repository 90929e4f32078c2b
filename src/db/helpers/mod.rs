use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

pub fn read_raw(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("failed to read key {key}"))
}

pub fn write_raw(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("failed to write key {key}"))?;
    Ok(())
}

pub fn remove_key(conn: &Connection, key: &str) -> Result<bool> {
    let removed = conn
        .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
        .with_context(|| format!("failed to remove key {key}"))?;
    Ok(removed > 0)
}

/// Reads and decodes a JSON value. A value that no longer parses is treated
/// as absent so the next write replaces it.
pub fn read_json<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
    let Some(raw) = read_raw(conn, key)? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!("Discarding unparseable value under {key}: {err}");
            Ok(None)
        }
    }
}

pub fn read_json_or_default<T: DeserializeOwned + Default>(conn: &Connection, key: &str) -> Result<T> {
    Ok(read_json(conn, key)?.unwrap_or_default())
}

pub fn write_json<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> Result<()> {
    let serialized =
        serde_json::to_string(value).with_context(|| format!("failed to serialize {key}"))?;
    write_raw(conn, key, &serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn write_then_overwrite_keeps_single_row() {
        let conn = conn();
        write_json(&conn, "numbers", &vec![1, 2, 3]).unwrap();
        write_json(&conn, "numbers", &vec![4]).unwrap();

        let stored: Vec<i32> = read_json_or_default(&conn, "numbers").unwrap();
        assert_eq!(stored, vec![4]);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn corrupt_value_reads_as_absent() {
        let conn = conn();
        write_raw(&conn, "numbers", "{not json").unwrap();

        let stored: Option<Vec<i32>> = read_json(&conn, "numbers").unwrap();
        assert!(stored.is_none());

        let fallback: Vec<i32> = read_json_or_default(&conn, "numbers").unwrap();
        assert!(fallback.is_empty());
    }

    #[test]
    fn remove_reports_whether_key_existed() {
        let conn = conn();
        write_raw(&conn, "k", "1").unwrap();
        assert!(remove_key(&conn, "k").unwrap());
        assert!(!remove_key(&conn, "k").unwrap());
    }
}
