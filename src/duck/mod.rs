pub mod ident;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use duckdb::Connection;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use ident::{quote_ident, quote_literal, validate_table_name};

/// Extension of the single-file DuckDB store.
pub const DB_EXTENSION: &str = "db";

/// What `load_table` did to get the table in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Table was freshly created from the CSV.
    Created { rows: u64 },
    /// Table was already present; the CSV was not read.
    Reused { rows: u64 },
}

impl LoadOutcome {
    pub fn rows(&self) -> u64 {
        match *self {
            LoadOutcome::Created { rows } | LoadOutcome::Reused { rows } => rows,
        }
    }
}

/// `<database_dir>/<table_name>.db`
pub fn database_file(database_dir: &Path, table_name: &str) -> PathBuf {
    database_dir.join(format!("{}.{}", table_name, DB_EXTENSION))
}

/// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
pub fn open_disk_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening duckdb file {}", path.display()))?;
    Ok(conn)
}

/// Open a DuckDB in-memory database
pub fn open_mem_db() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("opening in-memory duckdb")?;
    Ok(conn)
}

/// All table names visible in the connected database.
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT table_name FROM information_schema.tables ORDER BY table_name;")
        .context("preparing table listing")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()
        .context("listing tables")?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    Ok(table_names(conn)?.iter().any(|t| t == table_name))
}

pub fn row_count(conn: &Connection, table_name: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {};", quote_ident(table_name));
    let n: i64 = conn
        .query_row(&sql, [], |r| r.get(0))
        .with_context(|| format!("counting rows in {}", table_name))?;
    Ok(n as u64)
}

/// Create `table_name` from the CSV, letting DuckDB sniff delimiter and types.
/// Returns the number of rows loaded.
pub fn create_table_from_csv(conn: &Connection, table_name: &str, csv_path: &Path) -> Result<u64> {
    let sql = format!(
        "CREATE TABLE {table} AS SELECT * FROM read_csv_auto({path}, header = true);",
        table = quote_ident(table_name),
        path = quote_literal(&csv_path.to_string_lossy()),
    );
    debug!(%sql, "creating table");
    conn.execute_batch(&sql)
        .with_context(|| format!("loading {} into table {}", csv_path.display(), table_name))?;

    row_count(conn, table_name)
}

/// Make sure `<database_dir>/<table_name>.db` holds a table named `table_name`.
///
/// - no database file: create the directory tree and the file, then load the CSV
/// - file present, table missing: load the CSV into the existing file
/// - file present, table present: reuse it untouched
///
/// Reuse is decided purely on the table name. The CSV is never compared against
/// what was loaded before.
pub fn load_table(
    csv_path: &Path,
    table_name: &str,
    database_dir: &Path,
) -> Result<(Connection, LoadOutcome)> {
    validate_table_name(table_name)?;
    let db_file = database_file(database_dir, table_name);

    let existing = if db_file.exists() {
        if let Some((csv_mtime, db_mtime)) = stale_csv(csv_path, &db_file) {
            warn!(
                csv = %csv_path.display(),
                csv_modified = %csv_mtime,
                db_modified = %db_mtime,
                "CSV is newer than the database; existing table is kept"
            );
        }
        let conn = open_disk_db(&db_file)?;
        if table_exists(&conn, table_name)? {
            let rows = row_count(&conn, table_name)?;
            info!(
                table = table_name,
                path = %db_file.display(),
                rows,
                "table already exists; skipping load"
            );
            return Ok((conn, LoadOutcome::Reused { rows }));
        }
        info!(table = table_name, path = %db_file.display(), "table missing from database");
        Some(conn)
    } else {
        None
    };

    // missing/unreadable CSV surfaces as an io error, ahead of creating a new database file
    fs::File::open(csv_path).with_context(|| format!("reading CSV {}", csv_path.display()))?;

    let conn = match existing {
        Some(conn) => conn,
        None => {
            fs::create_dir_all(database_dir).with_context(|| {
                format!("creating database directory {}", database_dir.display())
            })?;
            info!(path = %db_file.display(), "creating database");
            open_disk_db(&db_file)?
        }
    };
    let rows = create_table_from_csv(&conn, table_name, csv_path)?;
    info!(table = table_name, rows, "loaded table");
    Ok((conn, LoadOutcome::Created { rows }))
}

/// Load-or-reuse, returning only the handle.
pub fn load_data(csv_path: &Path, table_name: &str, database_dir: &Path) -> Result<Connection> {
    let (conn, _) = load_table(csv_path, table_name, database_dir)?;
    Ok(conn)
}

/// Modification times of the CSV and database file when the CSV is the newer one.
/// `None` if it isn't, or if either time can't be read.
pub fn stale_csv(csv_path: &Path, db_file: &Path) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    let (csv_mtime, db_mtime) = (modified(csv_path)?, modified(db_file)?);
    (csv_mtime > db_mtime).then(|| (csv_mtime.into(), db_mtime.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::{
        io,
        time::{Duration, SystemTime},
    };
    use tempfile::tempdir;

    const CSV: &str = "\
CAMIS,BORO,CUISINE DESCRIPTION,VIOLATION DESCRIPTION
1,BRONX,Pizza,Dirty
2,BRONX,Pizza,Dirty
3,QUEENS,Chinese,Mice
4,QUEENS,Chinese,
5,MANHATTAN,Thai,Flies
";

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn database_file_is_derived_from_dir_and_table() {
        assert_eq!(
            database_file(Path::new("out/dbs"), "restaurant_data"),
            PathBuf::from("out/dbs/restaurant_data.db")
        );
    }

    #[test]
    fn fresh_load_creates_nested_dirs_and_all_rows() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("a").join("b");

        let (conn, outcome) = load_table(&csv, "restaurant_data", &db_dir)?;

        assert_eq!(outcome, LoadOutcome::Created { rows: 5 });
        assert!(database_file(&db_dir, "restaurant_data").is_file());
        assert!(table_exists(&conn, "restaurant_data")?);
        assert_eq!(row_count(&conn, "restaurant_data")?, 5);
        Ok(())
    }

    #[test]
    fn second_load_reuses_table_without_duplicating() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("db");

        {
            let (_conn, first) = load_table(&csv, "restaurant_data", &db_dir)?;
            assert!(matches!(first, LoadOutcome::Created { rows: 5 }));
        }

        // change the CSV; the cached table must not notice
        write_csv(tmp.path(), "in.csv", "CAMIS,BORO\n9,BRONX\n");
        let (conn, second) = load_table(&csv, "restaurant_data", &db_dir)?;
        assert_eq!(second, LoadOutcome::Reused { rows: 5 });
        assert_eq!(row_count(&conn, "restaurant_data")?, 5);
        assert_eq!(table_names(&conn)?, vec!["restaurant_data".to_string()]);
        Ok(())
    }

    #[test]
    fn load_data_twice_keeps_row_count() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("db");

        let first = row_count(&load_data(&csv, "restaurant_data", &db_dir)?, "restaurant_data")?;
        let second = row_count(&load_data(&csv, "restaurant_data", &db_dir)?, "restaurant_data")?;
        assert_eq!(first, 5);
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn existing_file_without_table_gets_loaded() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("db");
        fs::create_dir_all(&db_dir)?;

        {
            let conn = open_disk_db(&database_file(&db_dir, "restaurant_data"))?;
            conn.execute_batch("CREATE TABLE other (x INTEGER);")?;
        }

        let (conn, outcome) = load_table(&csv, "restaurant_data", &db_dir)?;
        assert_eq!(outcome, LoadOutcome::Created { rows: 5 });
        assert!(table_exists(&conn, "other")?);
        assert!(table_exists(&conn, "restaurant_data")?);
        Ok(())
    }

    #[test]
    fn malformed_csv_fails_and_a_fixed_csv_loads_into_the_same_file() -> Result<()> {
        let tmp = tempdir()?;
        let mut ragged = String::from("CAMIS,BORO,CUISINE DESCRIPTION,VIOLATION DESCRIPTION\n");
        for i in 0..50 {
            ragged.push_str(&format!("{i},BRONX,Pizza,Dirty\n"));
        }
        ragged.push_str("51,BRONX,Pizza,Dirty,extra,extra\n");
        let csv = write_csv(tmp.path(), "in.csv", &ragged);
        let db_dir = tmp.path().join("db");
        let db_file = database_file(&db_dir, "restaurant_data");

        assert!(load_table(&csv, "restaurant_data", &db_dir).is_err());

        // the file outlives the failed load, without the table
        assert!(db_file.is_file());
        {
            let conn = open_disk_db(&db_file)?;
            assert!(!table_exists(&conn, "restaurant_data")?);
        }

        write_csv(tmp.path(), "in.csv", CSV);
        let (conn, outcome) = load_table(&csv, "restaurant_data", &db_dir)?;
        assert_eq!(outcome, LoadOutcome::Created { rows: 5 });
        assert_eq!(row_count(&conn, "restaurant_data")?, 5);
        Ok(())
    }

    #[test]
    fn newer_csv_is_flagged_but_table_is_kept() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("db");
        let db_file = database_file(&db_dir, "restaurant_data");

        drop(load_table(&csv, "restaurant_data", &db_dir)?);
        assert!(stale_csv(&csv, &db_file).is_none());

        write_csv(tmp.path(), "in.csv", "CAMIS,BORO\n9,BRONX\n");
        let later = SystemTime::now() + Duration::from_secs(3600);
        fs::File::options().write(true).open(&csv)?.set_modified(later)?;
        let (csv_mtime, db_mtime) = stale_csv(&csv, &db_file).expect("CSV should be newer");
        assert!(csv_mtime > db_mtime);

        let (conn, outcome) = load_table(&csv, "restaurant_data", &db_dir)?;
        assert_eq!(outcome, LoadOutcome::Reused { rows: 5 });
        assert_eq!(row_count(&conn, "restaurant_data")?, 5);
        Ok(())
    }

    #[test]
    fn missing_csv_is_an_io_error_and_leaves_no_database() {
        let tmp = tempdir().unwrap();
        let db_dir = tmp.path().join("db");

        let err = load_table(&tmp.path().join("nope.csv"), "restaurant_data", &db_dir)
            .err()
            .expect("missing CSV must fail");

        assert!(err.chain().any(|e| e.downcast_ref::<io::Error>().is_some()));
        assert!(!database_file(&db_dir, "restaurant_data").exists());
    }

    #[test]
    fn invalid_table_name_is_rejected_before_touching_disk() {
        let tmp = tempdir().unwrap();
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let db_dir = tmp.path().join("db");

        assert!(load_table(&csv, "x; DROP TABLE y", &db_dir).is_err());
        assert!(!db_dir.exists());
    }

    #[test]
    fn in_memory_create_from_csv() -> Result<()> {
        let tmp = tempdir()?;
        let csv = write_csv(tmp.path(), "in.csv", CSV);
        let conn = open_mem_db()?;

        assert_eq!(create_table_from_csv(&conn, "t", &csv)?, 5);
        assert!(create_table_from_csv(&conn, "t", &csv).is_err());
        Ok(())
    }
}
