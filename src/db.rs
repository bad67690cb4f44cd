use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::output::{OutputRow, RowSink};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS researchers (
            id                INTEGER PRIMARY KEY,
            institution       TEXT NOT NULL,
            name              TEXT NOT NULL,
            email             TEXT NOT NULL,
            research_field    TEXT NOT NULL,
            paper_title       TEXT NOT NULL,
            paper_link        TEXT NOT NULL,
            paper_description TEXT NOT NULL,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_researchers_institution ON researchers(institution);
        ",
    )?;
    Ok(())
}

/// Appends rows in one transaction. Existing rows are never touched, so
/// repeated runs accumulate duplicates.
pub fn insert_rows(conn: &Connection, institution: &str, rows: &[OutputRow]) -> Result<usize> {
    let created_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO researchers
             (institution, name, email, research_field, paper_title, paper_link, paper_description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                institution, r.name, r.email, r.research_field,
                r.paper_title, r.paper_link, r.paper_description, created_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[cfg(test)]
pub fn fetch_rows(conn: &Connection, institution: &str) -> Result<Vec<OutputRow>> {
    let mut stmt = conn.prepare(
        "SELECT name, email, research_field, paper_title, paper_link, paper_description
         FROM researchers WHERE institution = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([institution], |row| {
            Ok(OutputRow {
                name: row.get(0)?,
                email: row.get(1)?,
                research_field: row.get(2)?,
                paper_title: row.get(3)?,
                paper_link: row.get(4)?,
                paper_description: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// SQLite table shared by all institutions; the `institution` column is the key.
pub struct SqliteSink {
    conn: Connection,
    label: String,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = connect(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            label: path.display().to_string(),
        })
    }

    #[cfg(test)]
    pub fn from_connection(conn: Connection, label: &str) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn,
            label: label.to_string(),
        })
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RowSink for SqliteSink {
    fn append(&mut self, institution: &str, rows: &[OutputRow]) -> Result<usize> {
        insert_rows(&self.conn, institution, rows)
    }

    fn location(&self, institution: &str) -> String {
        format!("{} (researchers, institution = {:?})", self.label, institution)
    }
}
