use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::listing::CanonicalRecord;

const RECORD_COLUMNS: &str = "id, source, url, title, price_eur, address, arrondissement,
    size_m2, price_per_m2, rooms, floor, rental_type, furnished, latitude, longitude";

pub struct StoreContext {
    pub connection: Connection,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failures: Vec<SkippedRecord>,
}

pub fn open_store<P: AsRef<Path>>(db_path: P) -> AppResult<StoreContext> {
    let db_path = db_path.as_ref();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    connection.execute_batch("PRAGMA journal_mode = WAL;")?;
    run_migrations(&connection)?;
    info!(
        target: "store",
        path = %db_path.display(),
        "rentals store ready"
    );

    Ok(StoreContext {
        connection,
        path: db_path.to_path_buf(),
    })
}

pub fn open_in_memory() -> AppResult<Connection> {
    let connection = Connection::open_in_memory()?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS rentals (
            id TEXT PRIMARY KEY NOT NULL CHECK (length(id) > 0),
            source TEXT,
            url TEXT,
            title TEXT,
            price_eur REAL CHECK (price_eur IS NULL OR price_eur >= 0),
            address TEXT,
            arrondissement TEXT CHECK (arrondissement IS NULL OR length(arrondissement) = 2),
            size_m2 REAL CHECK (size_m2 IS NULL OR size_m2 >= 0),
            price_per_m2 REAL,
            rooms INTEGER,
            floor TEXT,
            rental_type TEXT,
            furnished TEXT,
            latitude REAL,
            longitude REAL
        );
        "#,
    )?;

    ensure_column(
        connection,
        "rentals",
        "arrondissement TEXT CHECK (arrondissement IS NULL OR length(arrondissement) = 2)",
    )?;
    ensure_column(connection, "rentals", "price_per_m2 REAL")?;

    connection.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_arrondissement ON rentals(arrondissement);
        CREATE INDEX IF NOT EXISTS idx_price ON rentals(price_eur);
        CREATE INDEX IF NOT EXISTS idx_source ON rentals(source);
        CREATE INDEX IF NOT EXISTS idx_rental_type ON rentals(rental_type);
        "#,
    )?;
    Ok(())
}

fn ensure_column(connection: &Connection, table: &str, definition: &str) -> AppResult<()> {
    let column_name = definition
        .split_whitespace()
        .next()
        .ok_or_else(|| AppError::Config(format!("invalid column definition: {definition}")))?;
    if column_exists(connection, table, column_name)? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN {definition}");
    connection.execute(&sql, [])?;
    Ok(())
}

fn column_exists(connection: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Insert-or-replace every record by id inside one transaction. A failing
/// row is logged and counted as skipped; the rest of the batch still lands.
pub fn write_records(
    connection: &mut Connection,
    records: &[CanonicalRecord],
) -> AppResult<WriteSummary> {
    let tx = connection.transaction()?;
    let mut summary = WriteSummary::default();
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO rentals ({RECORD_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))?;
        for record in records {
            let result = stmt.execute(params![
                record.id,
                record.source,
                record.url,
                record.title,
                record.price_eur,
                record.address,
                record.arrondissement,
                record.size_m2,
                record.price_per_m2,
                record.rooms,
                record.floor,
                record.rental_type,
                record.furnished,
                record.latitude,
                record.longitude,
            ]);
            match result {
                Ok(_) => summary.inserted += 1,
                Err(err) => {
                    warn!(
                        target: "store",
                        id = %record.id,
                        error = %err,
                        "failed to write rental; skipping"
                    );
                    summary.skipped += 1;
                    summary.failures.push(SkippedRecord {
                        id: record.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
    tx.commit()?;
    Ok(summary)
}

pub fn fetch_record(connection: &Connection, id: &str) -> AppResult<Option<CanonicalRecord>> {
    connection
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM rentals WHERE id = ?1"),
            [id],
            parse_record,
        )
        .optional()
        .map_err(AppError::from)
}

pub fn count_records(connection: &Connection) -> AppResult<usize> {
    let count: i64 = connection.query_row("SELECT COUNT(*) FROM rentals", [], |row| row.get(0))?;
    Ok(count as usize)
}

fn parse_record(row: &Row<'_>) -> rusqlite::Result<CanonicalRecord> {
    Ok(CanonicalRecord {
        id: row.get(0)?,
        source: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        url: row.get(2)?,
        title: row.get(3)?,
        price_eur: row.get(4)?,
        address: row.get(5)?,
        arrondissement: row.get(6)?,
        size_m2: row.get(7)?,
        price_per_m2: row.get(8)?,
        rooms: row.get(9)?,
        floor: row.get(10)?,
        rental_type: row.get(11)?,
        furnished: row.get(12)?,
        latitude: row.get(13)?,
        longitude: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, price: Option<f64>) -> CanonicalRecord {
        CanonicalRecord {
            id: id.into(),
            source: "studapart".into(),
            url: Some(format!("https://example.com/{id}")),
            title: Some("Studio".into()),
            price_eur: price,
            address: Some("75011 Paris".into()),
            size_m2: Some(20.0),
            rooms: Some(1),
            floor: None,
            rental_type: Some("Studio".into()),
            furnished: Some("Meublé".into()),
            latitude: None,
            longitude: None,
            arrondissement: Some("11".into()),
            price_per_m2: None,
        }
    }

    #[test]
    fn creates_table_and_indexes() {
        let dir = tempdir().unwrap();
        let ctx = open_store(dir.path().join("nested").join("rentals.db")).unwrap();

        let mut stmt = ctx
            .connection
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='index' AND name IN
                ('idx_arrondissement','idx_price','idx_source','idx_rental_type')",
            )
            .unwrap();
        let indexes = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .count();
        assert_eq!(indexes, 4);
        assert!(ctx.path.ends_with("rentals.db"));
        assert_eq!(count_records(&ctx.connection).unwrap(), 0);
    }

    #[test]
    fn reopening_an_existing_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rentals.db");
        {
            let mut ctx = open_store(&path).unwrap();
            write_records(&mut ctx.connection, &[record("a1", Some(500.0))]).unwrap();
        }
        let ctx = open_store(&path).unwrap();
        assert_eq!(count_records(&ctx.connection).unwrap(), 1);
    }

    #[test]
    fn second_write_with_same_id_replaces_the_row() {
        let mut conn = open_in_memory().unwrap();
        write_records(&mut conn, &[record("x", Some(700.0))]).unwrap();
        let summary = write_records(&mut conn, &[record("x", Some(820.0))]).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(count_records(&conn).unwrap(), 1);
        let stored = fetch_record(&conn, "x").unwrap().unwrap();
        assert_eq!(stored.price_eur, Some(820.0));
        assert_eq!(stored.arrondissement.as_deref(), Some("11"));
    }

    #[test]
    fn constraint_violation_is_skipped_without_aborting() {
        let mut conn = open_in_memory().unwrap();
        let mut bad = record("bad", Some(-10.0));
        bad.arrondissement = None;
        let summary = write_records(
            &mut conn,
            &[record("ok-1", Some(600.0)), bad, record("ok-2", None)],
        )
        .unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures[0].id, "bad");
        assert_eq!(count_records(&conn).unwrap(), 2);
        assert!(fetch_record(&conn, "bad").unwrap().is_none());
    }

    #[test]
    fn adds_derived_columns_to_older_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE rentals (
                id TEXT PRIMARY KEY, source TEXT, url TEXT, title TEXT, price_eur REAL,
                address TEXT, size_m2 REAL, rooms INTEGER, floor TEXT, rental_type TEXT,
                furnished TEXT, latitude REAL, longitude REAL
            );",
        )
        .unwrap();
        assert!(!column_exists(&conn, "rentals", "arrondissement").unwrap());

        run_migrations(&conn).unwrap();
        assert!(column_exists(&conn, "rentals", "arrondissement").unwrap());
        assert!(column_exists(&conn, "rentals", "price_per_m2").unwrap());
    }
}
